//! Subtype queries over a registry snapshot.
//!
//! Both structures are built from the classes registered at build time and are
//! cached by [`AnalysisCache`](crate::cache::AnalysisCache) against the registry's
//! mutation counter.

use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{Result, SceneError};
use crate::model::{ClassDescriptor, ResolutionLevel};
use crate::registry::ClassRegistry;

/// Every non-phantom class must be resolved to at least `Hierarchy`.
fn check_resolved(classes: &[Arc<ClassDescriptor>]) -> Result<()> {
    for class in classes {
        if !class.is_phantom() && class.level() < ResolutionLevel::Hierarchy {
            return Err(SceneError::UnresolvedClass {
                name: class.name().to_string(),
                required: ResolutionLevel::Hierarchy,
            });
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct Hierarchy {
    classes: IndexMap<String, Arc<ClassDescriptor>>,
    subclasses: HashMap<String, Vec<String>>,
    /// interface -> classes and interfaces naming it directly
    implementors: HashMap<String, Vec<String>>,
}

impl Hierarchy {
    pub fn build(registry: &ClassRegistry) -> Result<Self> {
        let snapshot = registry.classes();
        check_resolved(&snapshot)?;

        let mut subclasses: HashMap<String, Vec<String>> = HashMap::new();
        let mut implementors: HashMap<String, Vec<String>> = HashMap::new();
        for class in snapshot.iter() {
            if let Some(parent) = class.superclass() {
                subclasses
                    .entry(parent.name().to_string())
                    .or_default()
                    .push(class.name().to_string());
            }
            for interface in class.interfaces() {
                implementors
                    .entry(interface.name().to_string())
                    .or_default()
                    .push(class.name().to_string());
            }
        }

        let classes = snapshot
            .into_iter()
            .map(|class| (class.name().to_string(), class))
            .collect();
        Ok(Self {
            classes,
            subclasses,
            implementors,
        })
    }

    fn lookup(&self, names: &[String]) -> Vec<Arc<ClassDescriptor>> {
        names
            .iter()
            .filter_map(|name| self.classes.get(name).cloned())
            .collect()
    }

    pub fn direct_subclasses_of(&self, name: &str) -> Vec<Arc<ClassDescriptor>> {
        self.subclasses
            .get(name)
            .map(|names| self.lookup(names))
            .unwrap_or_default()
    }

    /// `name` followed by all its transitive subclasses.
    pub fn subclasses_of_including(&self, name: &str) -> Vec<Arc<ClassDescriptor>> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(children) = self.subclasses.get(&current) {
                queue.extend(children.iter().cloned());
            }
        }
        seen.iter()
            .filter_map(|name| self.classes.get(name).cloned())
            .collect()
    }

    /// Superclass chain of `name`, nearest first.
    pub fn superclasses_of(&self, name: &str) -> Vec<Arc<ClassDescriptor>> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(name).and_then(|class| class.superclass());
        while let Some(class) = current {
            current = class.superclass();
            chain.push(class);
        }
        chain
    }

    /// Non-interface classes that implement `interface`, directly, through a
    /// sub-interface, or by inheriting from an implementor.
    pub fn implementers_of(&self, interface: &str) -> Vec<Arc<ClassDescriptor>> {
        let mut interfaces: IndexSet<String> = IndexSet::new();
        let mut direct: IndexSet<String> = IndexSet::new();
        let mut queue = VecDeque::from([interface.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !interfaces.insert(current.clone()) {
                continue;
            }
            for name in self.implementors.get(&current).into_iter().flatten() {
                match self.classes.get(name) {
                    Some(class) if class.is_interface() => queue.push_back(name.clone()),
                    Some(_) => {
                        direct.insert(name.clone());
                    }
                    None => {}
                }
            }
        }

        let mut result: IndexSet<String> = IndexSet::new();
        for name in direct {
            for class in self.subclasses_of_including(&name) {
                result.insert(class.name().to_string());
            }
        }
        result
            .iter()
            .filter_map(|name| self.classes.get(name).cloned())
            .collect()
    }

    pub fn is_subclass(&self, child: &str, parent: &str) -> bool {
        self.superclasses_of(child)
            .iter()
            .any(|class| class.name() == parent)
    }

    pub fn is_subclass_including(&self, child: &str, parent: &str) -> bool {
        child == parent || self.is_subclass(child, parent)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Constant-time subclass tests using pre/post-order numbering of the class tree.
#[derive(Debug)]
pub struct FastHierarchy {
    intervals: HashMap<String, (u32, u32)>,
    /// class or interface -> every interface it can be stored into
    interface_closure: HashMap<String, IndexSet<String>>,
    interfaces: IndexSet<String>,
}

impl FastHierarchy {
    pub fn build(registry: &ClassRegistry) -> Result<Self> {
        let classes = registry.classes();
        check_resolved(&classes)?;

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots = Vec::new();
        let mut interfaces = IndexSet::new();
        for class in classes.iter() {
            if class.is_interface() {
                interfaces.insert(class.name().to_string());
                continue;
            }
            match class.superclass() {
                Some(parent) if registry.contains_class(parent.name()) => children
                    .entry(parent.name().to_string())
                    .or_default()
                    .push(class.name().to_string()),
                _ => roots.push(class.name().to_string()),
            }
        }

        let mut intervals = HashMap::new();
        let mut counter = 0u32;
        for root in roots {
            // (name, children visited)
            let mut stack = vec![(root, false)];
            while let Some((name, visited)) = stack.pop() {
                if visited {
                    if let Some((_, upper)) = intervals.get_mut(&name) {
                        *upper = counter;
                    }
                    counter += 1;
                    continue;
                }
                intervals.insert(name.clone(), (counter, counter));
                counter += 1;
                stack.push((name.clone(), true));
                for child in children.get(&name).into_iter().flatten() {
                    stack.push((child.clone(), false));
                }
            }
        }

        let mut interface_closure = HashMap::new();
        for class in classes.iter() {
            let mut closure = IndexSet::new();
            let mut queue: VecDeque<Arc<ClassDescriptor>> = VecDeque::new();
            let mut current = Some(class.clone());
            while let Some(c) = current {
                queue.extend(c.interfaces());
                current = c.superclass();
            }
            while let Some(interface) = queue.pop_front() {
                if closure.insert(interface.name().to_string()) {
                    queue.extend(interface.interfaces());
                }
            }
            interface_closure.insert(class.name().to_string(), closure);
        }

        Ok(Self {
            intervals,
            interface_closure,
            interfaces,
        })
    }

    /// True when `child` is `parent` or a subclass of it. Only class-to-class.
    pub fn is_subclass_including(&self, child: &str, parent: &str) -> bool {
        match (self.intervals.get(child), self.intervals.get(parent)) {
            (Some(&(child_pre, _)), Some(&(parent_pre, parent_post))) => {
                parent_pre <= child_pre && child_pre <= parent_post
            }
            _ => false,
        }
    }

    /// Whether a value of type `child` can be stored in a variable of type `parent`.
    pub fn can_store_class(&self, child: &str, parent: &str) -> bool {
        if child == parent {
            return true;
        }
        if self.interfaces.contains(parent) {
            return self
                .interface_closure
                .get(child)
                .is_some_and(|closure| closure.contains(parent));
        }
        self.is_subclass_including(child, parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Modifiers;
    use crate::numberer::NumbererService;
    use crate::resolver::Resolver;
    use crate::source::{ClassDefinition, MemoryProvider};

    fn interface(name: &str) -> ClassDefinition {
        ClassDefinition::new(name)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT)
    }

    fn resolved_registry() -> Result<Arc<ClassRegistry>> {
        let provider = MemoryProvider::new()
            .with_class(ClassDefinition::new("java.lang.Object"))
            .with_class(interface("i.Shape"))
            .with_class(interface("i.Polygon").implements("i.Shape"))
            .with_class(ClassDefinition::new("s.Circle").extends("java.lang.Object").implements("i.Shape"))
            .with_class(ClassDefinition::new("s.Square").extends("java.lang.Object").implements("i.Polygon"))
            .with_class(ClassDefinition::new("s.Tile").extends("s.Square"))
            .with_class(ClassDefinition::new("s.Dot").extends("java.lang.Object"));
        let registry = Arc::new(ClassRegistry::new(Arc::new(NumbererService::new(false)), false));
        let resolver = Resolver::new(registry.clone(), Arc::new(provider), false);
        for name in ["s.Circle", "s.Tile", "s.Dot"] {
            resolver.resolve_class(name, ResolutionLevel::Hierarchy)?;
        }
        Ok(registry)
    }

    fn names(classes: Vec<Arc<ClassDescriptor>>) -> Vec<String> {
        let mut names: Vec<String> = classes.iter().map(|c| c.name().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn hierarchy_answers_subclass_and_implementer_queries() -> Result<()> {
        let registry = resolved_registry()?;
        let hierarchy = Hierarchy::build(&registry)?;

        assert_eq!(names(hierarchy.direct_subclasses_of("s.Square")), vec!["s.Tile"]);
        assert_eq!(
            names(hierarchy.subclasses_of_including("s.Square")),
            vec!["s.Square", "s.Tile"]
        );
        assert_eq!(
            names(hierarchy.superclasses_of("s.Tile")),
            vec!["java.lang.Object", "s.Square"]
        );
        assert_eq!(
            names(hierarchy.implementers_of("i.Shape")),
            vec!["s.Circle", "s.Square", "s.Tile"]
        );
        assert!(hierarchy.is_subclass("s.Tile", "java.lang.Object"));
        assert!(!hierarchy.is_subclass("s.Dot", "s.Square"));
        Ok(())
    }

    #[test]
    fn fast_hierarchy_matches_hierarchy() -> Result<()> {
        let registry = resolved_registry()?;
        let fast = FastHierarchy::build(&registry)?;

        assert!(fast.is_subclass_including("s.Tile", "s.Square"));
        assert!(fast.is_subclass_including("s.Tile", "java.lang.Object"));
        assert!(!fast.is_subclass_including("s.Square", "s.Tile"));
        assert!(!fast.is_subclass_including("s.Dot", "s.Square"));
        assert!(fast.can_store_class("s.Tile", "i.Shape"));
        assert!(fast.can_store_class("i.Polygon", "i.Shape"));
        assert!(!fast.can_store_class("s.Dot", "i.Shape"));
        Ok(())
    }

    #[test]
    fn unresolved_classes_are_rejected_but_phantoms_are_not() -> Result<()> {
        let registry = ClassRegistry::new(Arc::new(NumbererService::new(false)), true);
        registry.get_or_create_phantom("p.Ghost")?;
        assert_eq!(Hierarchy::build(&registry)?.len(), 1);

        registry.add_class(Arc::new(ClassDescriptor::new("d.Dangling")))?;
        let err = Hierarchy::build(&registry).unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnresolvedClass { ref name, required: ResolutionLevel::Hierarchy } if name == "d.Dangling"
        ));
        assert!(FastHierarchy::build(&registry).is_err());
        Ok(())
    }
}
