//! The class-source contract consumed by the resolver.
//!
//! A [`ClassProvider`] answers "what does class `name` look like?" with a
//! [`ClassDefinition`], or `None` when the class is not available. Front ends
//! (class-file readers, IR parsers) implement it; [`MemoryProvider`] is the
//! in-process variant used by embedders and tests.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::Result;
use crate::model::{Modifiers, Tag};

const PRIMITIVE_TYPES: [&str; 9] = [
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub type_name: String,
    pub modifiers: Modifiers,
    pub tags: Vec<Tag>,
}

impl FieldDefinition {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            modifiers: Modifiers::PRIVATE,
            tags: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDefinition {
    pub name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub modifiers: Modifiers,
    pub exceptions: Vec<String>,
    pub has_body: bool,
    pub tags: Vec<Tag>,
}

impl MethodDefinition {
    pub fn new(name: &str, parameter_types: &[&str], return_type: &str) -> Self {
        Self {
            name: name.to_string(),
            parameter_types: parameter_types.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
            modifiers: Modifiers::PUBLIC,
            exceptions: Vec::new(),
            has_body: true,
            tags: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.has_body = !modifiers.is_abstract() && !modifiers.contains(Modifiers::NATIVE);
        self.modifiers = modifiers;
        self
    }

    pub fn throws(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.to_string());
        self
    }
}

/// Everything a front end knows about one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDefinition {
    pub name: String,
    pub modifiers: Modifiers,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDefinition>,
    pub methods: Vec<MethodDefinition>,
    /// Classes referenced from method bodies.
    pub body_references: Vec<String>,
    pub tags: Vec<Tag>,
}

impl ClassDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            modifiers: Modifiers::PUBLIC,
            ..Self::default()
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }

    pub fn references(mut self, class: &str) -> Self {
        self.body_references.push(class.to_string());
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Reference types named by field types, parameters, return types and
    /// declared exceptions, excluding the class itself.
    pub fn signature_references(&self) -> Vec<String> {
        let mut refs = BTreeSet::new();
        let field_types = self.fields.iter().map(|f| f.type_name.as_str());
        let method_types = self.methods.iter().flat_map(|m| {
            m.parameter_types
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(m.return_type.as_str()))
                .chain(m.exceptions.iter().map(String::as_str))
        });
        for type_name in field_types.chain(method_types) {
            if let Some(class) = reference_type_name(type_name)
                && class != self.name
            {
                refs.insert(class.to_string());
            }
        }
        refs.into_iter().collect()
    }
}

/// Strips array dimensions; `None` for primitive types.
pub fn reference_type_name(type_name: &str) -> Option<&str> {
    let base = type_name.split('[').next().unwrap_or(type_name).trim();
    if base.is_empty() || PRIMITIVE_TYPES.contains(&base) {
        None
    } else {
        Some(base)
    }
}

pub trait ClassProvider: Send + Sync {
    /// Returns the definition of `name`, or `None` when no source for it exists.
    fn lookup(&self, name: &str) -> Result<Option<ClassDefinition>>;

    /// Names of the classes found under a process or dynamic directory / archive.
    fn classes_under(&self, _location: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Names of the classes available in `package` (no sub-packages).
    fn classes_in_package(&self, _package: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    classes: HashMap<String, ClassDefinition>,
    locations: HashMap<String, Vec<String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, definition: ClassDefinition) -> Self {
        self.classes.insert(definition.name.clone(), definition);
        self
    }

    /// Registers `definition` as living under `location` (a process directory).
    pub fn with_class_at(mut self, location: &str, definition: ClassDefinition) -> Self {
        self.locations
            .entry(location.to_string())
            .or_default()
            .push(definition.name.clone());
        self.with_class(definition)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassProvider for MemoryProvider {
    fn lookup(&self, name: &str) -> Result<Option<ClassDefinition>> {
        Ok(self.classes.get(name).cloned())
    }

    fn classes_under(&self, location: &Path) -> Result<Vec<String>> {
        let key = location.to_string_lossy();
        Ok(self.locations.get(key.as_ref()).cloned().unwrap_or_default())
    }

    fn classes_in_package(&self, package: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .classes
            .keys()
            .filter(|name| {
                name.rsplit_once('.')
                    .is_some_and(|(pkg, _)| pkg == package)
            })
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_references_skip_primitives_arrays_and_self() {
        let def = ClassDefinition::new("a.A")
            .field(FieldDefinition::new("count", "int"))
            .field(FieldDefinition::new("names", "java.lang.String[][]"))
            .field(FieldDefinition::new("next", "a.A"))
            .method(
                MethodDefinition::new("run", &["a.B", "long"], "a.C").throws("java.io.IOException"),
            );

        assert_eq!(
            def.signature_references(),
            vec!["a.B", "a.C", "java.io.IOException", "java.lang.String"]
        );
    }

    #[test]
    fn memory_provider_lists_package_members_only() -> Result<()> {
        let provider = MemoryProvider::new()
            .with_class(ClassDefinition::new("a.b.X"))
            .with_class(ClassDefinition::new("a.b.c.Y"))
            .with_class_at("/app", ClassDefinition::new("a.b.Z"));

        assert_eq!(provider.classes_in_package("a.b")?, vec!["a.b.X", "a.b.Z"]);
        assert_eq!(provider.classes_under(Path::new("/app"))?, vec!["a.b.Z"]);
        assert!(provider.lookup("missing.M")?.is_none());
        Ok(())
    }
}
