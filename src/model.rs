//! Descriptors for classes, fields, methods and the analysis-side handles
//! (locals, units) that get numbered alongside them.
//!
//! A [`ClassDescriptor`] is owned by the [`ClassRegistry`](crate::registry::ClassRegistry)
//! once added; superclass and interface links are `Weak` so the registry stays the
//! only owner.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::source::{ClassDefinition, FieldDefinition, MethodDefinition};

/// How much structural detail has been loaded for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResolutionLevel {
    Dangling = 0,
    Hierarchy = 1,
    Signatures = 2,
    Bodies = 3,
}

impl ResolutionLevel {
    pub const ALL: [ResolutionLevel; 4] = [
        ResolutionLevel::Dangling,
        ResolutionLevel::Hierarchy,
        ResolutionLevel::Signatures,
        ResolutionLevel::Bodies,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Partition {
    Application,
    Library,
    Phantom,
}

/// JVM access flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const PUBLIC: Modifiers = Modifiers(0x0001);
    pub const PRIVATE: Modifiers = Modifiers(0x0002);
    pub const PROTECTED: Modifiers = Modifiers(0x0004);
    pub const STATIC: Modifiers = Modifiers(0x0008);
    pub const FINAL: Modifiers = Modifiers(0x0010);
    pub const SYNCHRONIZED: Modifiers = Modifiers(0x0020);
    pub const VOLATILE: Modifiers = Modifiers(0x0040);
    pub const TRANSIENT: Modifiers = Modifiers(0x0080);
    pub const NATIVE: Modifiers = Modifiers(0x0100);
    pub const INTERFACE: Modifiers = Modifiers(0x0200);
    pub const ABSTRACT: Modifiers = Modifiers(0x0400);
    pub const STRICTFP: Modifiers = Modifiers(0x0800);
    pub const ANNOTATION: Modifiers = Modifiers(0x2000);
    pub const ENUM: Modifiers = Modifiers(0x4000);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub const fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifiers({:#06x})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Deprecated,
    SourceFile(String),
    Signature(String),
    Raw { name: String, bytes: Vec<u8> },
}

#[derive(Debug)]
pub struct FieldDescriptor {
    name: String,
    type_name: String,
    modifiers: Modifiers,
    declaring_class: String,
    tags: Vec<Tag>,
}

impl FieldDescriptor {
    pub fn new(declaring_class: &str, definition: &FieldDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            type_name: definition.type_name.clone(),
            modifiers: definition.modifiers,
            declaring_class: declaring_class.to_string(),
            tags: definition.tags.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// `type name`
    pub fn subsignature(&self) -> String {
        format!("{} {}", self.type_name, self.name)
    }

    /// `<declaring: type name>`
    pub fn signature(&self) -> String {
        format!("<{}: {}>", self.declaring_class, self.subsignature())
    }
}

#[derive(Debug)]
pub struct MethodDescriptor {
    name: String,
    parameter_types: Vec<String>,
    return_type: String,
    modifiers: Modifiers,
    exceptions: Vec<String>,
    declaring_class: String,
    declares_body: bool,
    body_loaded: AtomicBool,
    tags: Vec<Tag>,
}

impl MethodDescriptor {
    pub const CONSTRUCTOR_NAME: &'static str = "<init>";
    pub const STATIC_INITIALIZER_NAME: &'static str = "<clinit>";

    pub fn new(declaring_class: &str, definition: &MethodDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            parameter_types: definition.parameter_types.clone(),
            return_type: definition.return_type.clone(),
            modifiers: definition.modifiers,
            exceptions: definition.exceptions.clone(),
            declaring_class: declaring_class.to_string(),
            declares_body: definition.has_body,
            body_loaded: AtomicBool::new(false),
            tags: definition.tags.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }

    /// True once the declaring class reached `Bodies` and this method carries code.
    pub fn has_body(&self) -> bool {
        self.body_loaded.load(Ordering::Acquire)
    }

    pub(crate) fn load_body(&self) {
        if self.declares_body {
            self.body_loaded.store(true, Ordering::Release);
        }
    }

    /// `ret name(p1,p2)`
    pub fn subsignature(&self) -> String {
        format!(
            "{} {}({})",
            self.return_type,
            self.name,
            self.parameter_types.join(",")
        )
    }

    /// `<declaring: ret name(p1,p2)>`
    pub fn signature(&self) -> String {
        format!("<{}: {}>", self.declaring_class, self.subsignature())
    }
}

/// A local variable handle, numbered for points-to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalDescriptor {
    pub method: String,
    pub name: String,
    pub type_name: String,
}

/// A statement position inside a method body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitRef {
    pub method: String,
    pub index: usize,
}

#[derive(Debug)]
struct ClassState {
    level: ResolutionLevel,
    partition: Option<Partition>,
    in_scene: bool,
    phantom: bool,
    modifiers: Modifiers,
    superclass: Option<Weak<ClassDescriptor>>,
    interfaces: Vec<Weak<ClassDescriptor>>,
    fields: Vec<Arc<FieldDescriptor>>,
    methods: Vec<Arc<MethodDescriptor>>,
    tags: Vec<Tag>,
}

#[derive(Debug)]
pub struct ClassDescriptor {
    name: String,
    state: RwLock<ClassState>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_modifiers(name, Modifiers::PUBLIC)
    }

    pub fn with_modifiers(name: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ClassState {
                level: ResolutionLevel::Dangling,
                partition: None,
                in_scene: false,
                phantom: false,
                modifiers,
                superclass: None,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                tags: Vec::new(),
            }),
        }
    }

    pub fn new_phantom(name: impl Into<String>) -> Self {
        let class = Self::new(name);
        class.state.write().phantom = true;
        class
    }

    /// A `Dangling` descriptor carrying the definition's modifiers and tags.
    pub fn from_definition(definition: &ClassDefinition) -> Self {
        let class = Self::with_modifiers(definition.name.clone(), definition.modifiers);
        class.state.write().tags = definition.tags.clone();
        class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> ResolutionLevel {
        self.state.read().level
    }

    /// Moves the level forward; a lower or equal `level` leaves it untouched.
    pub fn raise_level(&self, level: ResolutionLevel) -> bool {
        let mut state = self.state.write();
        if level > state.level {
            state.level = level;
            true
        } else {
            false
        }
    }

    pub fn partition(&self) -> Option<Partition> {
        self.state.read().partition
    }

    pub(crate) fn set_partition(&self, partition: Option<Partition>) {
        let mut state = self.state.write();
        state.partition = partition;
        if partition == Some(Partition::Phantom) {
            state.phantom = true;
        }
    }

    pub fn is_in_scene(&self) -> bool {
        self.state.read().in_scene
    }

    pub(crate) fn set_in_scene(&self, in_scene: bool) {
        self.state.write().in_scene = in_scene;
    }

    pub fn is_phantom(&self) -> bool {
        self.state.read().phantom
    }

    pub fn is_application_class(&self) -> bool {
        self.partition() == Some(Partition::Application)
    }

    pub fn is_library_class(&self) -> bool {
        self.partition() == Some(Partition::Library)
    }

    pub fn modifiers(&self) -> Modifiers {
        self.state.read().modifiers
    }

    pub fn set_modifiers(&self, modifiers: Modifiers) {
        self.state.write().modifiers = modifiers;
    }

    pub fn is_interface(&self) -> bool {
        self.modifiers().is_interface()
    }

    pub fn is_concrete(&self) -> bool {
        let modifiers = self.modifiers();
        !modifiers.is_interface() && !modifiers.is_abstract()
    }

    pub fn superclass(&self) -> Option<Arc<ClassDescriptor>> {
        self.state.read().superclass.as_ref().and_then(Weak::upgrade)
    }

    pub fn interfaces(&self) -> Vec<Arc<ClassDescriptor>> {
        self.state
            .read()
            .interfaces
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn set_hierarchy(
        &self,
        superclass: Option<&Arc<ClassDescriptor>>,
        interfaces: &[Arc<ClassDescriptor>],
    ) {
        let mut state = self.state.write();
        state.superclass = superclass.map(Arc::downgrade);
        state.interfaces = interfaces.iter().map(Arc::downgrade).collect();
    }

    pub fn fields(&self) -> Vec<Arc<FieldDescriptor>> {
        self.state.read().fields.clone()
    }

    pub fn methods(&self) -> Vec<Arc<MethodDescriptor>> {
        self.state.read().methods.clone()
    }

    pub fn add_field(&self, field: Arc<FieldDescriptor>) {
        self.state.write().fields.push(field);
    }

    pub fn add_method(&self, method: Arc<MethodDescriptor>) {
        self.state.write().methods.push(method);
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.state.read().tags.clone()
    }

    pub fn add_tag(&self, tag: Tag) {
        self.state.write().tags.push(tag);
    }

    /// Looks a method up by `ret name(params)`.
    pub fn method_by_subsignature(&self, subsignature: &str) -> Option<Arc<MethodDescriptor>> {
        self.state
            .read()
            .methods
            .iter()
            .find(|m| m.subsignature() == subsignature)
            .cloned()
    }

    /// Looks a field up by `type name`.
    pub fn field_by_subsignature(&self, subsignature: &str) -> Option<Arc<FieldDescriptor>> {
        self.state
            .read()
            .fields
            .iter()
            .find(|f| f.subsignature() == subsignature)
            .cloned()
    }

    pub fn declares_method(&self, subsignature: &str) -> bool {
        self.method_by_subsignature(subsignature).is_some()
    }

    /// Replaces the member lists with those of `definition`.
    pub(crate) fn install_members(&self, definition: &ClassDefinition) {
        let fields = definition
            .fields
            .iter()
            .map(|f| Arc::new(FieldDescriptor::new(&self.name, f)))
            .collect();
        let methods = definition
            .methods
            .iter()
            .map(|m| Arc::new(MethodDescriptor::new(&self.name, m)))
            .collect();
        let mut state = self.state.write();
        state.fields = fields;
        state.methods = methods;
    }

    pub(crate) fn load_bodies(&self) {
        for method in self.state.read().methods.iter() {
            method.load_body();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_level_never_goes_backwards() {
        let class = ClassDescriptor::new("a.A");
        assert!(class.raise_level(ResolutionLevel::Signatures));
        assert!(!class.raise_level(ResolutionLevel::Hierarchy));
        assert_eq!(class.level(), ResolutionLevel::Signatures);
    }

    #[test]
    fn method_signatures_use_declaring_class() {
        let def = MethodDefinition::new("main", &["java.lang.String[]"], "void")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC);
        let method = MethodDescriptor::new("a.Main", &def);
        assert_eq!(method.subsignature(), "void main(java.lang.String[])");
        assert_eq!(method.signature(), "<a.Main: void main(java.lang.String[])>");
        assert!(method.is_static());
    }

    #[test]
    fn superclass_link_does_not_keep_parent_alive() {
        let child = ClassDescriptor::new("a.B");
        {
            let parent = Arc::new(ClassDescriptor::new("a.A"));
            child.set_hierarchy(Some(&parent), &[]);
            assert_eq!(child.superclass().map(|c| c.name().to_string()).as_deref(), Some("a.A"));
        }
        assert!(child.superclass().is_none());
    }
}
