//! Finding and reading classes on a class path.
//!
//! [`ClassLocator`] indexes the archives and directories of a [`Classpath`] once, in
//! parallel. The runtime image placeholder is backed by the `jmods/` of the java home
//! when there is one, else by the fixed table in [`crate::runtime`].
//! [`LocatorProvider`] pairs the locator with a [`ClassFileParser`] to serve as the
//! resolver's [`ClassProvider`].

use ignore::WalkBuilder;
use indexmap::IndexMap;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, mpsc};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::classpath::{Classpath, MODULE_PATH_PLACEHOLDER};
use crate::error::{Result, SceneError};
use crate::model::{Modifiers, Tag};
use crate::source::{ClassDefinition, ClassProvider, FieldDefinition, MethodDefinition};

/// `.jmod` files carry a 4-byte header (`JM`, major, minor) before the zip data.
const JMOD_MAGIC: &[u8; 2] = b"JM";
const JMOD_HEADER_LEN: usize = 4;
const JMOD_CLASSES_DIR: &str = "classes/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLocation {
    Archive { archive: PathBuf, entry: String },
    File(PathBuf),
    /// An entry of a runtime module under `<java home>/jmods`.
    Module { jmod: PathBuf, entry: String },
    /// A class from the built-in runtime table.
    RuntimeImage,
}

fn class_path_to_class_name(path: &str) -> Option<String> {
    let stem = path.strip_suffix(".class")?;
    if stem.ends_with("module-info") || stem.ends_with("package-info") {
        return None;
    }
    Some(stem.replace(['/', '\\'], "."))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

fn map_archive(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the file is opened read-only and the map does not outlive this read.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn archive_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> SceneError + '_ {
    move |source| SceneError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

fn index_archive(archive_path: &Path) -> Result<Vec<(String, ClassLocation)>> {
    let mmap = map_archive(archive_path)?;
    let archive = ZipArchive::new(Cursor::new(&mmap[..])).map_err(archive_error(archive_path))?;
    let mut entries: Vec<&str> = archive.file_names().collect();
    entries.sort_unstable();
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let name = class_path_to_class_name(entry)?;
            Some((
                name,
                ClassLocation::Archive {
                    archive: archive_path.to_path_buf(),
                    entry: entry.to_string(),
                },
            ))
        })
        .collect())
}

fn open_jmod<'a>(bytes: &'a [u8], path: &Path) -> Result<ZipArchive<Cursor<&'a [u8]>>> {
    if bytes.len() < JMOD_HEADER_LEN || !bytes.starts_with(JMOD_MAGIC) {
        return Err(archive_error(path)(zip::result::ZipError::InvalidArchive(
            "missing jmod header",
        )));
    }
    ZipArchive::new(Cursor::new(&bytes[JMOD_HEADER_LEN..])).map_err(archive_error(path))
}

fn index_jmod(jmod: &Path) -> Result<Vec<(String, ClassLocation)>> {
    let mmap = map_archive(jmod)?;
    let archive = open_jmod(&mmap, jmod)?;
    let mut entries: Vec<&str> = archive.file_names().collect();
    entries.sort_unstable();
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let name = class_path_to_class_name(entry.strip_prefix(JMOD_CLASSES_DIR)?)?;
            Some((
                name,
                ClassLocation::Module {
                    jmod: jmod.to_path_buf(),
                    entry: entry.to_string(),
                },
            ))
        })
        .collect())
}

fn jmods_under(java_home: &Path) -> Vec<PathBuf> {
    let Ok(dir) = std::fs::read_dir(java_home.join("jmods")) else {
        return Vec::new();
    };
    let mut jmods: Vec<PathBuf> = dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|e| e == "jmod"))
        .collect();
    jmods.sort();
    jmods
}

/// Classes behind the runtime image placeholder.
fn index_runtime_image(java_home: Option<&Path>) -> Vec<(String, ClassLocation)> {
    let jmods = java_home.map(jmods_under).unwrap_or_default();
    if jmods.is_empty() {
        debug!("No runtime modules found; using the built-in runtime classes");
        return crate::runtime::names()
            .map(|name| (name.to_string(), ClassLocation::RuntimeImage))
            .collect();
    }

    let per_module: Vec<Vec<(String, ClassLocation)>> = jmods
        .par_iter()
        .map(|jmod| {
            index_jmod(jmod).unwrap_or_else(|err| {
                warn!("Failed to index {}: {}", jmod.display(), err);
                Vec::new()
            })
        })
        .collect();
    per_module.into_iter().flatten().collect()
}

fn index_directory(root: &Path) -> Vec<(String, ClassLocation)> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "class")
                    && let Ok(relative) = path.strip_prefix(root)
                    && let Some(name) = class_path_to_class_name(&relative.to_string_lossy())
                {
                    let _ = tx.send((name, ClassLocation::File(path.to_path_buf())));
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<_> = rx.iter().collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

/// Classes found directly in one class path entry. The runtime image placeholder
/// yields nothing here; [`ClassLocator`] indexes it separately.
pub fn index_entry(entry: &Path) -> Result<Vec<(String, ClassLocation)>> {
    if entry == Path::new(MODULE_PATH_PLACEHOLDER) {
        return Ok(Vec::new());
    }
    if entry.is_dir() {
        return Ok(index_directory(entry));
    }
    if !entry.exists() {
        debug!("Class path entry {} does not exist", entry.display());
        return Ok(Vec::new());
    }
    if is_archive(entry) {
        return index_archive(entry);
    }
    warn!("Skipping class path entry {}: not a directory or jar", entry.display());
    Ok(Vec::new())
}

pub struct ClassLocator {
    classpath: Classpath,
    java_home: Option<PathBuf>,
    index: OnceLock<IndexMap<String, ClassLocation>>,
}

impl ClassLocator {
    pub fn new(classpath: Classpath) -> Self {
        Self {
            classpath,
            java_home: None,
            index: OnceLock::new(),
        }
    }

    /// Runtime whose `jmods/` back the runtime image placeholder.
    pub fn with_java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    pub fn classpath(&self) -> &Classpath {
        &self.classpath
    }

    /// Earlier class path entries shadow later ones.
    fn index(&self) -> &IndexMap<String, ClassLocation> {
        self.index.get_or_init(|| {
            let per_entry: Vec<Vec<(String, ClassLocation)>> = self
                .classpath
                .entries()
                .par_iter()
                .map(|entry| {
                    if entry == Path::new(MODULE_PATH_PLACEHOLDER) {
                        return index_runtime_image(self.java_home.as_deref());
                    }
                    index_entry(entry).unwrap_or_else(|err| {
                        warn!("Failed to index {}: {}", entry.display(), err);
                        Vec::new()
                    })
                })
                .collect();

            let mut index = IndexMap::new();
            for (name, location) in per_entry.into_iter().flatten() {
                index.entry(name).or_insert(location);
            }
            debug!("Indexed {} classes from {} class path entries", index.len(), self.classpath.len());
            index
        })
    }

    pub fn locate(&self, name: &str) -> Option<ClassLocation> {
        self.index().get(name).cloned()
    }

    /// Names of indexed classes, in class path order.
    pub fn class_names(&self) -> Vec<String> {
        self.index().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    pub fn classes_in_package(&self, package: &str) -> Vec<String> {
        self.index()
            .keys()
            .filter(|name| name.rsplit_once('.').is_some_and(|(pkg, _)| pkg == package))
            .cloned()
            .collect()
    }

    /// Class-file bytes at `location`; `None` for the built-in runtime table.
    pub fn read(&self, location: &ClassLocation) -> Result<Option<Vec<u8>>> {
        match location {
            ClassLocation::Archive { archive, entry } => {
                let mmap = map_archive(archive)?;
                let mut zip = ZipArchive::new(Cursor::new(&mmap[..])).map_err(archive_error(archive))?;
                let mut file = zip.by_name(entry).map_err(archive_error(archive))?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            ClassLocation::Module { jmod, entry } => {
                let mmap = map_archive(jmod)?;
                let mut zip = open_jmod(&mmap, jmod)?;
                let mut file = zip.by_name(entry).map_err(archive_error(jmod))?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            ClassLocation::File(path) => Ok(Some(std::fs::read(path)?)),
            ClassLocation::RuntimeImage => Ok(None),
        }
    }
}

/// What a front end gets to build a definition from.
#[derive(Debug, Clone, Copy)]
pub enum ClassInput<'a> {
    Bytes(&'a [u8]),
    /// The class comes from the built-in runtime table.
    RuntimeImage,
}

pub trait ClassFileParser: Send + Sync {
    fn parse(&self, name: &str, input: ClassInput<'_>) -> Result<ClassDefinition>;
}

/// [`ClassProvider`] over a class path.
pub struct LocatorProvider<P> {
    locator: ClassLocator,
    parser: P,
}

impl<P: ClassFileParser> LocatorProvider<P> {
    pub fn new(locator: ClassLocator, parser: P) -> Self {
        Self { locator, parser }
    }

    pub fn locator(&self) -> &ClassLocator {
        &self.locator
    }
}

impl<P: ClassFileParser> ClassProvider for LocatorProvider<P> {
    fn lookup(&self, name: &str) -> Result<Option<ClassDefinition>> {
        let Some(location) = self.locator.locate(name) else {
            return Ok(None);
        };
        let definition = match self.locator.read(&location)? {
            Some(bytes) => self.parser.parse(name, ClassInput::Bytes(&bytes))?,
            None => self.parser.parse(name, ClassInput::RuntimeImage)?,
        };
        Ok(Some(definition))
    }

    fn classes_under(&self, location: &Path) -> Result<Vec<String>> {
        Ok(index_entry(location)?.into_iter().map(|(name, _)| name).collect())
    }

    fn classes_in_package(&self, package: &str) -> Result<Vec<String>> {
        Ok(self.locator.classes_in_package(package))
    }
}

/// Reads the structural parts of a JVM class file: access flags, supertypes, member
/// signatures, the `SourceFile`/`Deprecated` attributes and referenced classes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassFileReader;

impl ClassFileParser for ClassFileReader {
    fn parse(&self, name: &str, input: ClassInput<'_>) -> Result<ClassDefinition> {
        match input {
            ClassInput::Bytes(bytes) => {
                classfile::read(bytes).ok_or_else(|| SceneError::Configuration(format!("malformed class file for {name}")))
            }
            ClassInput::RuntimeImage => {
                crate::runtime::definition(name).ok_or_else(|| SceneError::ClassNotFound(name.to_string()))
            }
        }
    }
}

mod classfile {
    use super::*;

    const MAGIC: u32 = 0xCAFE_BABE;

    enum Constant {
        Utf8(String),
        Class(u16),
        Other,
        Unusable,
    }

    struct Reader<'a> {
        bytes: &'a [u8],
        at: usize,
    }

    impl<'a> Reader<'a> {
        fn take(&mut self, n: usize) -> Option<&'a [u8]> {
            let slice = self.bytes.get(self.at..self.at + n)?;
            self.at += n;
            Some(slice)
        }

        fn u8(&mut self) -> Option<u8> {
            Some(self.take(1)?[0])
        }

        fn u16(&mut self) -> Option<u16> {
            Some(u16::from_be_bytes(self.take(2)?.try_into().ok()?))
        }

        fn u32(&mut self) -> Option<u32> {
            Some(u32::from_be_bytes(self.take(4)?.try_into().ok()?))
        }
    }

    struct Pool(Vec<Constant>);

    impl Pool {
        fn utf8(&self, index: u16) -> Option<&str> {
            match self.0.get(index as usize)? {
                Constant::Utf8(s) => Some(s),
                _ => None,
            }
        }

        fn class_name(&self, index: u16) -> Option<String> {
            match self.0.get(index as usize)? {
                Constant::Class(name) => Some(self.utf8(*name)?.replace('/', ".")),
                _ => None,
            }
        }
    }

    fn pool(r: &mut Reader<'_>) -> Option<Pool> {
        let count = r.u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);
        while entries.len() < count {
            let tag = r.u8()?;
            let entry = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(String::from_utf8_lossy(r.take(len)?).into_owned())
                }
                7 => Constant::Class(r.u16()?),
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    r.take(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    r.take(8)?;
                    entries.push(Constant::Other);
                    Constant::Unusable
                }
                8 | 16 | 19 | 20 => {
                    r.take(2)?;
                    Constant::Other
                }
                15 => {
                    r.take(3)?;
                    Constant::Other
                }
                _ => return None,
            };
            entries.push(entry);
        }
        Some(Pool(entries))
    }

    /// One field type from a descriptor, as a Java source type name.
    fn field_type(descriptor: &str) -> Option<(String, &str)> {
        let dims = descriptor.len() - descriptor.trim_start_matches('[').len();
        let rest = &descriptor[dims..];
        let (base, rest) = match rest.chars().next()? {
            'L' => {
                let end = rest.find(';')?;
                (rest[1..end].replace('/', "."), &rest[end + 1..])
            }
            c => {
                let primitive = match c {
                    'Z' => "boolean",
                    'B' => "byte",
                    'C' => "char",
                    'S' => "short",
                    'I' => "int",
                    'J' => "long",
                    'F' => "float",
                    'D' => "double",
                    'V' => "void",
                    _ => return None,
                };
                (primitive.to_string(), &rest[1..])
            }
        };
        Some((format!("{base}{}", "[]".repeat(dims)), rest))
    }

    fn method_types(descriptor: &str) -> Option<(Vec<String>, String)> {
        let mut rest = descriptor.strip_prefix('(')?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (param, tail) = field_type(rest)?;
            params.push(param);
            rest = tail;
        }
        let (ret, _) = field_type(&rest[1..])?;
        Some((params, ret))
    }

    /// Attribute names, with the `SourceFile` value resolved.
    fn attributes(r: &mut Reader<'_>, pool: &Pool) -> Option<Vec<(String, Option<String>)>> {
        let count = r.u16()?;
        let mut attrs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = pool.utf8(r.u16()?)?.to_string();
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            let value = if name == "SourceFile" && body.len() == 2 {
                pool.utf8(u16::from_be_bytes([body[0], body[1]])).map(str::to_string)
            } else {
                None
            };
            attrs.push((name, value));
        }
        Some(attrs)
    }

    pub(super) fn read(bytes: &[u8]) -> Option<ClassDefinition> {
        let mut r = Reader { bytes, at: 0 };
        if r.u32()? != MAGIC {
            return None;
        }
        r.take(4)?;
        let pool = pool(&mut r)?;

        let modifiers = Modifiers::from_bits(r.u16()?);
        let this_index = r.u16()?;
        let name = pool.class_name(this_index)?;
        let super_index = r.u16()?;
        let mut definition = ClassDefinition::new(&name).with_modifiers(modifiers);
        if super_index != 0 {
            definition.superclass = Some(pool.class_name(super_index)?);
        }
        let mut declared = vec![this_index, super_index];
        for _ in 0..r.u16()? {
            let index = r.u16()?;
            declared.push(index);
            definition.interfaces.push(pool.class_name(index)?);
        }

        for _ in 0..r.u16()? {
            let access = Modifiers::from_bits(r.u16()?);
            let field_name = pool.utf8(r.u16()?)?.to_string();
            let (type_name, _) = field_type(pool.utf8(r.u16()?)?)?;
            attributes(&mut r, &pool)?;
            definition
                .fields
                .push(FieldDefinition::new(&field_name, &type_name).with_modifiers(access));
        }

        for _ in 0..r.u16()? {
            let access = Modifiers::from_bits(r.u16()?);
            let method_name = pool.utf8(r.u16()?)?.to_string();
            let (params, ret) = method_types(pool.utf8(r.u16()?)?)?;
            let attrs = attributes(&mut r, &pool)?;
            let params: Vec<&str> = params.iter().map(String::as_str).collect();
            let mut method = MethodDefinition::new(&method_name, &params, &ret).with_modifiers(access);
            method.has_body = attrs.iter().any(|(n, _)| n == "Code");
            definition.methods.push(method);
        }

        for (attr, value) in attributes(&mut r, &pool)? {
            match (attr.as_str(), value) {
                ("SourceFile", Some(file)) => definition.tags.push(Tag::SourceFile(file)),
                ("Deprecated", _) => definition.tags.push(Tag::Deprecated),
                _ => {}
            }
        }

        for (index, constant) in pool.0.iter().enumerate() {
            if !matches!(constant, Constant::Class(_)) || declared.contains(&(index as u16)) {
                continue;
            }
            let Some(raw) = pool.class_name(index as u16) else {
                continue;
            };
            let referenced = if raw.starts_with('[') {
                field_type(&raw.replace('.', "/"))
                    .and_then(|(t, _)| crate::source::reference_type_name(&t).map(str::to_string))
            } else {
                Some(raw)
            };
            if let Some(class) = referenced
                && class != name
                && !definition.body_references.contains(&class)
            {
                definition.body_references.push(class);
            }
        }
        Some(definition)
    }

}

#[cfg(test)]
mod tests {
    use super::classfile::build::ClassFileBuilder;
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_scene_locator_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    fn runnable_impl() -> Vec<u8> {
        let mut builder = ClassFileBuilder::new("com/acme/Task", Some("java/lang/Object"))
            .interface("java/lang/Runnable")
            .method(0x0001, "run", "()V", true)
            .method(0x0401, "size", "([Ljava/lang/String;J)I", false);
        builder.class("com/acme/Helper");
        builder.class("[Lcom/acme/Item;");
        builder.build()
    }

    #[test]
    fn class_file_reader_extracts_structure() -> Result<()> {
        let def = ClassFileReader.parse("com.acme.Task", ClassInput::Bytes(&runnable_impl()))?;
        assert_eq!(def.name, "com.acme.Task");
        assert_eq!(def.superclass.as_deref(), Some("java.lang.Object"));
        assert_eq!(def.interfaces, vec!["java.lang.Runnable"]);
        assert_eq!(def.methods.len(), 2);
        assert!(def.methods[0].has_body);
        assert_eq!(def.methods[1].parameter_types, vec!["java.lang.String[]", "long"]);
        assert_eq!(def.methods[1].return_type, "int");
        assert!(!def.methods[1].has_body);
        assert_eq!(def.body_references, vec!["com.acme.Helper", "com.acme.Item"]);

        assert!(ClassFileReader.parse("x.Y", ClassInput::Bytes(b"nope")).is_err());
        Ok(())
    }

    /// A jmod as the JDK writes it: header, then a zip whose offsets start after it.
    fn write_jmod(path: &Path, entries: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        let payload = zip.finish()?.into_inner();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(b"JM\x01\x00")?;
        file.write_all(&payload)?;
        Ok(())
    }

    #[test]
    fn runtime_table_classes_keep_their_hierarchy() -> Result<()> {
        let object = ClassFileReader.parse("java.lang.Object", ClassInput::RuntimeImage)?;
        assert!(object.superclass.is_none());
        let string = ClassFileReader.parse("java.lang.String", ClassInput::RuntimeImage)?;
        assert_eq!(string.superclass.as_deref(), Some("java.lang.Object"));
        assert!(string.interfaces.iter().any(|i| i == "java.lang.CharSequence"));
        let runnable = ClassFileReader.parse("java.lang.Runnable", ClassInput::RuntimeImage)?;
        assert!(runnable.modifiers.is_interface());
        assert!(matches!(
            ClassFileReader.parse("java.lang.NoSuchClassAnywhere", ClassInput::RuntimeImage),
            Err(SceneError::ClassNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn runtime_image_only_knows_existing_classes() {
        let locator = ClassLocator::new(Classpath::new(vec![PathBuf::from(MODULE_PATH_PLACEHOLDER)]));
        assert_eq!(locator.locate("java.lang.Object"), Some(ClassLocation::RuntimeImage));
        assert_eq!(locator.locate("java.lang.NoSuchClassAnywhere"), None);
        assert_eq!(locator.locate("javax.swing.JFrame"), None);
        assert_eq!(locator.locate("com.acme.Task"), None);
    }

    #[test]
    fn runtime_image_reads_jmods_of_the_java_home() -> anyhow::Result<()> {
        let home = temp_path("jdk");
        let object = ClassFileBuilder::new("java/lang/Object", None).build();
        let runnable = ClassFileBuilder::new("java/lang/Runnable", Some("java/lang/Object"))
            .access(0x0601)
            .method(0x0401, "run", "()V", false)
            .build();
        write_jmod(
            &home.join("jmods").join("java.base.jmod"),
            &[
                ("classes/java/lang/Object.class", object),
                ("classes/java/lang/Runnable.class", runnable),
                ("classes/module-info.class", Vec::new()),
                ("lib/libjava.so", Vec::new()),
            ],
        )?;

        let classpath = Classpath::new(vec![PathBuf::from(MODULE_PATH_PLACEHOLDER)]);
        let provider = LocatorProvider::new(
            ClassLocator::new(classpath).with_java_home(Some(home.clone())),
            ClassFileReader,
        );
        assert_eq!(provider.locator().class_names(), vec!["java.lang.Object", "java.lang.Runnable"]);
        assert!(matches!(
            provider.locator().locate("java.lang.Runnable"),
            Some(ClassLocation::Module { ref entry, .. }) if entry == "classes/java/lang/Runnable.class"
        ));

        let runnable = provider.lookup("java.lang.Runnable")?.expect("runnable is in java.base");
        assert!(runnable.modifiers.is_interface());
        assert_eq!(runnable.methods[0].name, "run");
        // the jmods replace the built-in table entirely
        assert!(provider.lookup("java.lang.String")?.is_none());

        std::fs::remove_dir_all(home)?;
        Ok(())
    }

    #[test]
    fn earlier_entries_shadow_later_ones() -> anyhow::Result<()> {
        let first = temp_path("first.jar");
        let second = temp_path("second.jar");
        write_jar(&first, &[("com/acme/Task.class", runnable_impl())])?;
        write_jar(
            &second,
            &[
                ("com/acme/Task.class", Vec::new()),
                ("com/acme/Other.class", Vec::new()),
                ("module-info.class", Vec::new()),
                ("META-INF/MANIFEST.MF", Vec::new()),
            ],
        )?;

        let locator = ClassLocator::new(Classpath::new(vec![first.clone(), second.clone()]));
        assert_eq!(locator.class_names(), vec!["com.acme.Task", "com.acme.Other"]);
        assert!(matches!(
            locator.locate("com.acme.Task"),
            Some(ClassLocation::Archive { ref archive, .. }) if *archive == first
        ));
        assert_eq!(locator.classes_in_package("com.acme").len(), 2);
        assert!(locator.locate("java.lang.Object").is_none());

        std::fs::remove_file(first)?;
        std::fs::remove_file(second)?;
        Ok(())
    }

    #[test]
    fn provider_reads_directories_and_runtime_image() -> anyhow::Result<()> {
        let dir = temp_path("classes");
        std::fs::create_dir_all(dir.join("com").join("acme"))?;
        std::fs::write(dir.join("com").join("acme").join("Task.class"), runnable_impl())?;

        let classpath = Classpath::new(vec![dir.clone(), PathBuf::from(MODULE_PATH_PLACEHOLDER)]);
        let provider = LocatorProvider::new(ClassLocator::new(classpath), ClassFileReader);

        let task = provider.lookup("com.acme.Task")?.expect("task is on the class path");
        assert_eq!(task.interfaces, vec!["java.lang.Runnable"]);
        let object = provider.lookup("java.lang.Object")?.expect("object comes from the runtime image");
        assert!(object.superclass.is_none());
        assert!(provider.lookup("org.other.Missing")?.is_none());
        assert_eq!(provider.classes_under(&dir)?, vec!["com.acme.Task"]);

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}
