//! Name quoting for IR keywords and signature string helpers.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::{Result, SceneError};

pub const RESERVED_NAMES: [&str; 63] = [
    "newarray",
    "newmultiarray",
    "nop",
    "ret",
    "specialinvoke",
    "staticinvoke",
    "tableswitch",
    "virtualinvoke",
    "null_type",
    "unknown",
    "cmp",
    "cmpg",
    "cmpl",
    "entermonitor",
    "exitmonitor",
    "interfaceinvoke",
    "lengthof",
    "lookupswitch",
    "neg",
    "if",
    "abstract",
    "annotation",
    "boolean",
    "break",
    "byte",
    "case",
    "catch",
    "char",
    "class",
    "enum",
    "final",
    "native",
    "public",
    "protected",
    "private",
    "static",
    "synchronized",
    "transient",
    "volatile",
    "interface",
    "void",
    "short",
    "int",
    "long",
    "float",
    "double",
    "extends",
    "implements",
    "breakpoint",
    "default",
    "goto",
    "instanceof",
    "new",
    "return",
    "throw",
    "throws",
    "null",
    "from",
    "to",
    "with",
    "cls",
    "dynamicinvoke",
    "strictfp",
];

static RESERVED: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| RESERVED_NAMES.iter().copied().collect());

pub fn is_reserved(token: &str) -> bool {
    RESERVED.contains(token)
}

fn looks_quoted(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('\'') && segment.ends_with('\'')
}

fn needs_quoting(segment: &str) -> bool {
    segment.starts_with('-') || is_reserved(segment) || looks_quoted(segment)
}

/// Wraps every dot-separated segment that is a reserved token, starts with `-`,
/// or already looks quoted, in single quotes.
pub fn quote_name(name: &str) -> String {
    let candidate = name.contains('-')
        || name.contains('\'')
        || RESERVED.iter().any(|token| name.contains(token));
    if !candidate {
        return name.to_string();
    }

    let mut quoted = String::with_capacity(name.len() + 2);
    for (i, segment) in name.split('.').enumerate() {
        if i > 0 {
            quoted.push('.');
        }
        if needs_quoting(segment) {
            quoted.push('\'');
            quoted.push_str(segment);
            quoted.push('\'');
        } else {
            quoted.push_str(segment);
        }
    }
    quoted
}

/// Inverse of [`quote_name`].
pub fn unquote_name(name: &str) -> String {
    if !name.contains('\'') {
        return name.to_string();
    }

    let mut plain = String::with_capacity(name.len());
    for (i, segment) in name.split('.').enumerate() {
        if i > 0 {
            plain.push('.');
        }
        if looks_quoted(segment) {
            plain.push_str(&segment[1..segment.len() - 1]);
        } else {
            plain.push_str(segment);
        }
    }
    plain
}

fn split_signature(signature: &str) -> Result<(&str, &str)> {
    let malformed = || SceneError::MalformedSignature(signature.to_string());
    let inner = signature
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(malformed)?;
    let (class, rest) = inner.split_once(':').ok_or_else(malformed)?;
    let subsignature = rest.strip_prefix(' ').ok_or_else(malformed)?;
    if class.is_empty() || subsignature.is_empty() {
        return Err(malformed());
    }
    Ok((class, subsignature))
}

/// `<a.B: void m()>` → `a.B` (unquoted).
pub fn signature_to_class(signature: &str) -> Result<String> {
    let (class, _) = split_signature(signature)?;
    Ok(unquote_name(class))
}

/// `<a.B: void m()>` → `void m()`.
pub fn signature_to_subsignature(signature: &str) -> Result<String> {
    let (_, subsignature) = split_signature(signature)?;
    Ok(subsignature.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(quote_name("org.example.Foo"), "org.example.Foo");
        assert_eq!(unquote_name("org.example.Foo"), "org.example.Foo");
    }

    #[test]
    fn reserved_segments_and_hyphens_are_quoted() {
        assert_eq!(quote_name("org.class.Foo"), "org.'class'.Foo");
        assert_eq!(quote_name("a.-b.c"), "a.'-b'.c");
        // substring match alone does not quote a segment
        assert_eq!(quote_name("org.classic.Foo"), "org.classic.Foo");
    }

    #[test]
    fn quoting_round_trips() {
        let names = [
            "org.class.Foo",
            "a.-b.c",
            "x.'y'.z",
            "'",
            "new.int.Foo$Bar",
            "..",
            "plain",
        ];
        for name in names {
            assert_eq!(unquote_name(&quote_name(name)), name, "round trip of {name}");
        }

        let quoted = "org.'class'.'-x'";
        assert_eq!(quote_name(&unquote_name(quoted)), quoted);
    }

    #[test]
    fn signature_helpers_split_and_reject_malformed() {
        let sig = "<org.'class'.Foo: void run(int)>";
        assert_eq!(signature_to_class(sig).unwrap(), "org.class.Foo");
        assert_eq!(signature_to_subsignature(sig).unwrap(), "void run(int)");

        for bad in ["org.Foo: void run()", "<org.Foo void run()>", "<org.Foo: void run()", "<: x>"] {
            let err = signature_to_class(bad).unwrap_err();
            assert!(matches!(err, SceneError::MalformedSignature(ref s) if s == bad));
        }
    }
}
