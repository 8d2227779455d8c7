use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::error::{Result, SceneError};
use crate::model::{ClassDescriptor, Partition, ResolutionLevel};
use crate::registry::ClassRegistry;
use crate::source::{ClassDefinition, ClassProvider};

/// Brings classes to a requested [`ResolutionLevel`], loading what they depend on first.
///
/// Each name has its own lock, taken only while a descriptor is created or raised
/// and dropped once nobody waits on it. Dependencies are resolved before that lock
/// is taken, so resolving distinct names never blocks on each other.
pub struct Resolver {
    registry: Arc<ClassRegistry>,
    provider: Arc<dyn ClassProvider>,
    verbose: bool,
    done_resolving: AtomicBool,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Resolver {
    pub fn new(registry: Arc<ClassRegistry>, provider: Arc<dyn ClassProvider>, verbose: bool) -> Self {
        Self {
            registry,
            provider,
            verbose,
            done_resolving: AtomicBool::new(false),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn ClassProvider> {
        &self.provider
    }

    pub fn set_done_resolving(&self) {
        self.done_resolving.store(true, Ordering::Release);
    }

    pub fn done_resolving(&self) -> bool {
        self.done_resolving.load(Ordering::Acquire)
    }

    pub fn resolve_class(&self, name: &str, level: ResolutionLevel) -> Result<Arc<ClassDescriptor>> {
        self.resolve(name, level, &mut Vec::new(), false)
    }

    /// Resolves even after [`set_done_resolving`](Self::set_done_resolving). Only this
    /// call and the dependencies it pulls in skip the check.
    pub fn force_resolve(&self, name: &str, level: ResolutionLevel) -> Result<Arc<ClassDescriptor>> {
        self.resolve(name, level, &mut Vec::new(), true)
    }

    /// `None` when `name` has no source and phantom references are disabled.
    pub fn try_load_class(
        &self,
        name: &str,
        level: ResolutionLevel,
    ) -> Result<Option<Arc<ClassDescriptor>>> {
        match self.resolve_class(name, level) {
            Ok(class) => Ok(Some(class)),
            Err(SceneError::ClassNotFound(missing)) if missing == name => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn load_class(&self, name: &str, level: ResolutionLevel) -> Result<Arc<ClassDescriptor>> {
        self.resolve_class(name, level)
    }

    /// Signatures first; bodies too unless the class turned out phantom.
    pub fn load_class_and_support(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        let class = self.resolve_class(name, ResolutionLevel::Signatures)?;
        if class.is_phantom() {
            return Ok(class);
        }
        self.resolve_class(name, ResolutionLevel::Bodies)
    }

    fn resolve(
        &self,
        name: &str,
        level: ResolutionLevel,
        chain: &mut Vec<String>,
        forced: bool,
    ) -> Result<Arc<ClassDescriptor>> {
        let existing = self.registry.get_class(name);
        if let Some(class) = existing.as_ref()
            && (class.is_phantom() || class.level() >= level)
        {
            return Ok(class.clone());
        }
        if chain.iter().any(|link| link == name) {
            return Err(SceneError::CyclicHierarchy(name.to_string()));
        }
        if !forced && self.done_resolving() {
            return Err(SceneError::ResolutionFinished {
                name: name.to_string(),
                level,
            });
        }

        let Some(definition) = self.provider.lookup(name)? else {
            return self.substitute_phantom(name, existing);
        };

        let current = existing
            .as_ref()
            .map_or(ResolutionLevel::Dangling, |class| class.level());

        if level == ResolutionLevel::Dangling {
            return self.publish(&definition, level, |_| {});
        }

        if current < ResolutionLevel::Hierarchy {
            chain.push(name.to_string());
            let supertypes = self.resolve_supertypes(&definition, chain, forced);
            chain.pop();
            let (superclass, interfaces) = supertypes?;

            self.publish(&definition, ResolutionLevel::Hierarchy, |class| {
                class.set_hierarchy(superclass.as_ref(), &interfaces)
            })?;
        }
        if level <= ResolutionLevel::Hierarchy {
            return self.registry.class(name);
        }

        if current < ResolutionLevel::Signatures {
            for reference in definition.signature_references() {
                self.resolve(&reference, ResolutionLevel::Hierarchy, &mut Vec::new(), forced)?;
            }
            self.publish(&definition, ResolutionLevel::Signatures, |class| {
                class.install_members(&definition);
                self.registry.number_members(class);
            })?;
        }
        if level <= ResolutionLevel::Signatures {
            return self.registry.class(name);
        }

        for reference in definition.body_references.iter() {
            if reference != name {
                self.resolve(reference, ResolutionLevel::Hierarchy, &mut Vec::new(), forced)?;
            }
        }
        self.publish(&definition, ResolutionLevel::Bodies, |class| class.load_bodies())
    }

    fn resolve_supertypes(
        &self,
        definition: &ClassDefinition,
        chain: &mut Vec<String>,
        forced: bool,
    ) -> Result<(Option<Arc<ClassDescriptor>>, Vec<Arc<ClassDescriptor>>)> {
        let superclass = match definition.superclass.as_deref() {
            Some(parent) => Some(self.resolve(parent, ResolutionLevel::Hierarchy, chain, forced)?),
            None => None,
        };
        let interfaces = definition
            .interfaces
            .iter()
            .map(|interface| self.resolve(interface, ResolutionLevel::Hierarchy, chain, forced))
            .collect::<Result<Vec<_>>>()?;
        Ok((superclass, interfaces))
    }

    fn substitute_phantom(
        &self,
        name: &str,
        existing: Option<Arc<ClassDescriptor>>,
    ) -> Result<Arc<ClassDescriptor>> {
        if !self.registry.allow_phantom_refs() {
            return Err(SceneError::ClassNotFound(name.to_string()));
        }
        if self.verbose {
            debug!("No source for {}, using a phantom class", name);
        }
        match existing {
            Some(class) => {
                self.registry.reclassify(&class, Partition::Phantom)?;
                Ok(class)
            }
            None => self.registry.get_or_create_phantom(name),
        }
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.name_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Forgets the lock for `name` unless another caller still holds a handle to it.
    fn release_name_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.name_locks.lock();
        drop(lock);
        if locks.get(name).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn name_lock_count(&self) -> usize {
        self.name_locks.lock().len()
    }

    /// Creates or fetches the descriptor under the name lock and raises it to `level`,
    /// running `install` first if the level actually changes.
    fn publish(
        &self,
        definition: &ClassDefinition,
        level: ResolutionLevel,
        install: impl Fn(&Arc<ClassDescriptor>),
    ) -> Result<Arc<ClassDescriptor>> {
        let name = definition.name.as_str();
        let lock = self.name_lock(name);
        let published = {
            let _guard = lock.lock();
            self.publish_locked(definition, level, install)
        };
        self.release_name_lock(name, lock);
        published
    }

    fn publish_locked(
        &self,
        definition: &ClassDefinition,
        level: ResolutionLevel,
        install: impl Fn(&Arc<ClassDescriptor>),
    ) -> Result<Arc<ClassDescriptor>> {
        let name = definition.name.as_str();
        let class = match self.registry.get_class(name) {
            Some(class) => class,
            None => {
                // registered only once it has reached `level`
                let class = Arc::new(ClassDescriptor::from_definition(definition));
                install(&class);
                class.raise_level(level);
                match self.registry.add_class(class.clone()) {
                    Ok(_) => {
                        debug!("Resolved {} to {:?}", name, level);
                        return Ok(class);
                    }
                    Err(SceneError::DuplicateClass(_)) => self.registry.class(name)?,
                    Err(err) => return Err(err),
                }
            }
        };
        if class.is_phantom() || class.level() >= level {
            return Ok(class);
        }
        install(&class);
        class.raise_level(level);
        debug!("Resolved {} to {:?}", name, level);
        Ok(class)
    }
}
