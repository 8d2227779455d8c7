use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{Result, SceneError};
use crate::model::{ClassDescriptor, FieldDescriptor, MethodDescriptor, Partition, ResolutionLevel};
use crate::names::{signature_to_class, signature_to_subsignature};
use crate::numberer::{NumberId, NumbererService};

#[derive(Default)]
struct RegistryInner {
    classes: IndexMap<String, Arc<ClassDescriptor>>,
    application: IndexSet<String>,
    library: IndexSet<String>,
    phantom: IndexSet<String>,
}

impl RegistryInner {
    fn partition_set(&mut self, partition: Partition) -> &mut IndexSet<String> {
        match partition {
            Partition::Application => &mut self.application,
            Partition::Library => &mut self.library,
            Partition::Phantom => &mut self.phantom,
        }
    }

    fn drop_from_partitions(&mut self, name: &str) {
        self.application.shift_remove(name);
        self.library.shift_remove(name);
        self.phantom.shift_remove(name);
    }

    fn snapshot(&self, names: &IndexSet<String>) -> Vec<Arc<ClassDescriptor>> {
        names
            .iter()
            .filter_map(|name| self.classes.get(name).cloned())
            .collect()
    }
}

/// Owns every class descriptor in the scene and its partition membership.
///
/// Structural changes (add/remove) happen under one write lock and bump the
/// mutation counter returned by [`ClassRegistry::state`].
pub struct ClassRegistry {
    inner: RwLock<RegistryInner>,
    state: AtomicU64,
    numberers: Arc<NumbererService>,
    allow_phantom_refs: bool,
}

impl ClassRegistry {
    pub fn new(numberers: Arc<NumbererService>, allow_phantom_refs: bool) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            state: AtomicU64::new(0),
            numberers,
            allow_phantom_refs,
        }
    }

    pub fn numberers(&self) -> &Arc<NumbererService> {
        &self.numberers
    }

    pub fn allow_phantom_refs(&self) -> bool {
        self.allow_phantom_refs
    }

    /// Mutation counter; changes whenever a class is added or removed.
    pub fn state(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    fn bump(&self) -> u64 {
        self.state.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn add_class(&self, class: Arc<ClassDescriptor>) -> Result<NumberId> {
        let mut inner = self.inner.write();
        self.insert_locked(&mut inner, class)
    }

    fn insert_locked(
        &self,
        inner: &mut RegistryInner,
        class: Arc<ClassDescriptor>,
    ) -> Result<NumberId> {
        let name = class.name().to_string();
        if class.is_in_scene() || inner.classes.contains_key(&name) {
            return Err(SceneError::DuplicateClass(name));
        }

        let partition = match class.partition() {
            Some(partition) => partition,
            None if class.is_phantom() => Partition::Phantom,
            None => Partition::Library,
        };
        class.set_partition(Some(partition));
        class.set_in_scene(true);
        inner.partition_set(partition).insert(name.clone());
        inner.classes.insert(name.clone(), class.clone());

        let id = self.numberers.classes().add(class.clone());
        self.number_members(&class);
        let state = self.bump();
        debug!("Added {} as {:?} class #{} (state {})", name, partition, id, state);
        Ok(id)
    }

    pub fn remove_class(&self, class: &Arc<ClassDescriptor>) -> Result<()> {
        let mut inner = self.inner.write();
        let name = class.name();
        let managed = inner
            .classes
            .get(name)
            .is_some_and(|registered| Arc::ptr_eq(registered, class));
        if !managed {
            return Err(SceneError::NotManaged(name.to_string()));
        }

        inner.classes.shift_remove(name);
        inner.drop_from_partitions(name);
        class.set_in_scene(false);
        class.set_partition(None);

        self.numberers.classes().remove(class);
        {
            let mut methods = self.numberers.methods();
            for method in class.methods() {
                methods.remove(&method);
            }
        }
        {
            let mut fields = self.numberers.fields();
            for field in class.fields() {
                fields.remove(&field);
            }
        }
        let state = self.bump();
        debug!("Removed {} (state {})", name, state);
        Ok(())
    }

    /// Numbers the class's methods, fields and method subsignatures. Idempotent.
    pub(crate) fn number_members(&self, class: &ClassDescriptor) {
        let methods = class.methods();
        for method in methods.iter() {
            self.numberers.subsignature_id(&method.subsignature());
        }
        {
            let mut numberer = self.numberers.methods();
            for method in methods {
                numberer.add(method);
            }
        }
        let mut numberer = self.numberers.fields();
        for field in class.fields() {
            numberer.add(field);
        }
    }

    /// Returns the registered class, or registers a phantom for `name`.
    pub fn get_or_create_phantom(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        if let Some(class) = self.get_class(name) {
            return Ok(class);
        }
        if !self.allow_phantom_refs {
            return Err(SceneError::ClassNotFound(name.to_string()));
        }

        let mut inner = self.inner.write();
        if let Some(class) = inner.classes.get(name) {
            return Ok(class.clone());
        }
        let phantom = Arc::new(ClassDescriptor::new_phantom(name));
        self.insert_locked(&mut inner, phantom.clone())?;
        Ok(phantom)
    }

    pub fn reclassify(&self, class: &Arc<ClassDescriptor>, partition: Partition) -> Result<()> {
        let mut inner = self.inner.write();
        let name = class.name();
        let managed = inner
            .classes
            .get(name)
            .is_some_and(|registered| Arc::ptr_eq(registered, class));
        if !managed {
            return Err(SceneError::NotManaged(name.to_string()));
        }
        if class.is_phantom() && partition != Partition::Phantom {
            return Err(SceneError::Configuration(format!(
                "phantom class {} cannot become a {:?} class",
                name, partition
            )));
        }

        inner.drop_from_partitions(name);
        inner.partition_set(partition).insert(name.to_string());
        class.set_partition(Some(partition));
        Ok(())
    }

    pub fn get_class(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.inner.read().classes.get(name).cloned()
    }

    /// Like [`get_class`](Self::get_class) but fails with `ClassNotFound`.
    pub fn class(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        self.get_class(name)
            .ok_or_else(|| SceneError::ClassNotFound(name.to_string()))
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.inner.read().classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All classes in insertion order.
    pub fn classes(&self) -> Vec<Arc<ClassDescriptor>> {
        self.inner.read().classes.values().cloned().collect()
    }

    pub fn application_classes(&self) -> Vec<Arc<ClassDescriptor>> {
        let inner = self.inner.read();
        inner.snapshot(&inner.application)
    }

    pub fn library_classes(&self) -> Vec<Arc<ClassDescriptor>> {
        let inner = self.inner.read();
        inner.snapshot(&inner.library)
    }

    pub fn phantom_classes(&self) -> Vec<Arc<ClassDescriptor>> {
        let inner = self.inner.read();
        inner.snapshot(&inner.phantom)
    }

    pub fn partition_of(&self, name: &str) -> Option<Partition> {
        let inner = self.inner.read();
        if inner.application.contains(name) {
            Some(Partition::Application)
        } else if inner.library.contains(name) {
            Some(Partition::Library)
        } else if inner.phantom.contains(name) {
            Some(Partition::Phantom)
        } else {
            None
        }
    }

    /// Classes resolved to at least `level`.
    pub fn classes_at_level(&self, level: ResolutionLevel) -> Vec<Arc<ClassDescriptor>> {
        self.inner
            .read()
            .classes
            .values()
            .filter(|class| class.level() >= level)
            .cloned()
            .collect()
    }

    /// The three partitions are disjoint and together hold exactly the registered classes.
    pub fn partitions_consistent(&self) -> bool {
        let inner = self.inner.read();
        let total = inner.application.len() + inner.library.len() + inner.phantom.len();
        total == inner.classes.len()
            && inner.classes.keys().all(|name| {
                let hits = [&inner.application, &inner.library, &inner.phantom]
                    .iter()
                    .filter(|set| set.contains(name))
                    .count();
                hits == 1
            })
    }

    /// Method by signature; `None` when the class or the method is unknown.
    pub fn grab_method(&self, signature: &str) -> Result<Option<Arc<MethodDescriptor>>> {
        let class_name = signature_to_class(signature)?;
        let subsignature = signature_to_subsignature(signature)?;
        Ok(self
            .get_class(&class_name)
            .and_then(|class| class.method_by_subsignature(&subsignature)))
    }

    pub fn grab_field(&self, signature: &str) -> Result<Option<Arc<FieldDescriptor>>> {
        let class_name = signature_to_class(signature)?;
        let subsignature = signature_to_subsignature(signature)?;
        Ok(self
            .get_class(&class_name)
            .and_then(|class| class.field_by_subsignature(&subsignature)))
    }

    pub fn get_method(&self, signature: &str) -> Result<Arc<MethodDescriptor>> {
        self.grab_method(signature)?
            .ok_or_else(|| SceneError::MemberNotFound(signature.to_string()))
    }

    pub fn get_field(&self, signature: &str) -> Result<Arc<FieldDescriptor>> {
        self.grab_field(signature)?
            .ok_or_else(|| SceneError::MemberNotFound(signature.to_string()))
    }

    pub fn contains_method(&self, signature: &str) -> bool {
        matches!(self.grab_method(signature), Ok(Some(_)))
    }
}
