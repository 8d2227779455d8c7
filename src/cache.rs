//! Lazily built analysis artifacts attached to a scene.
//!
//! Hierarchy, fast hierarchy, points-to and side-effect results are stamped with
//! the registry's mutation counter when stored; a result whose stamp no longer
//! matches is dropped on access and, where it can be, rebuilt. Each artifact has
//! its own lock, so building one never blocks readers of another.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::analysis::{DumbPointsTo, PointsToAnalysis, SideEffectAnalysis};
use crate::callgraph::{CallGraph, ReachableMethods};
use crate::error::{Result, SceneError};
use crate::hierarchy::{FastHierarchy, Hierarchy};
use crate::model::MethodDescriptor;
use crate::registry::ClassRegistry;

struct Stamped<T: ?Sized> {
    state: u64,
    value: Arc<T>,
}

type Slot<T> = Mutex<Option<Stamped<T>>>;

fn fresh<T: ?Sized>(slot: &mut Option<Stamped<T>>, state: u64) -> Option<Arc<T>> {
    match slot {
        Some(stamped) if stamped.state == state => Some(stamped.value.clone()),
        Some(_) => {
            *slot = None;
            None
        }
        None => None,
    }
}

pub struct AnalysisCache {
    registry: Arc<ClassRegistry>,
    hierarchy: Slot<Hierarchy>,
    fast_hierarchy: Slot<FastHierarchy>,
    points_to: Mutex<Option<Stamped<dyn PointsToAnalysis>>>,
    side_effect: Slot<SideEffectAnalysis>,
    call_graph: RwLock<Option<Arc<CallGraph>>>,
    reachable: Mutex<Option<ReachableMethods>>,
    entry_points: RwLock<Option<Vec<Arc<MethodDescriptor>>>>,
}

impl AnalysisCache {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            hierarchy: Mutex::new(None),
            fast_hierarchy: Mutex::new(None),
            points_to: Mutex::new(None),
            side_effect: Mutex::new(None),
            call_graph: RwLock::new(None),
            reachable: Mutex::new(None),
            entry_points: RwLock::new(None),
        }
    }

    fn stamp<T: ?Sized>(&self, value: Arc<T>) -> Option<Stamped<T>> {
        Some(Stamped {
            state: self.registry.state(),
            value,
        })
    }

    pub fn has_hierarchy(&self) -> bool {
        fresh(&mut self.hierarchy.lock(), self.registry.state()).is_some()
    }

    /// The class hierarchy for the current registry contents, rebuilt if stale.
    pub fn hierarchy(&self) -> Result<Arc<Hierarchy>> {
        let mut slot = self.hierarchy.lock();
        let state = self.registry.state();
        if let Some(hierarchy) = fresh(&mut slot, state) {
            return Ok(hierarchy);
        }
        let hierarchy = Arc::new(Hierarchy::build(&self.registry)?);
        debug!("Built hierarchy over {} classes (state {})", hierarchy.len(), state);
        *slot = Some(Stamped {
            state,
            value: hierarchy.clone(),
        });
        Ok(hierarchy)
    }

    pub fn set_hierarchy(&self, hierarchy: Hierarchy) {
        *self.hierarchy.lock() = self.stamp(Arc::new(hierarchy));
    }

    pub fn release_hierarchy(&self) {
        *self.hierarchy.lock() = None;
    }

    pub fn has_fast_hierarchy(&self) -> bool {
        fresh(&mut self.fast_hierarchy.lock(), self.registry.state()).is_some()
    }

    pub fn fast_hierarchy(&self) -> Result<Arc<FastHierarchy>> {
        let mut slot = self.fast_hierarchy.lock();
        let state = self.registry.state();
        if let Some(fast) = fresh(&mut slot, state) {
            return Ok(fast);
        }
        let fast = Arc::new(FastHierarchy::build(&self.registry)?);
        debug!("Built fast hierarchy (state {})", state);
        *slot = Some(Stamped {
            state,
            value: fast.clone(),
        });
        Ok(fast)
    }

    pub fn set_fast_hierarchy(&self, fast: FastHierarchy) {
        *self.fast_hierarchy.lock() = self.stamp(Arc::new(fast));
    }

    pub fn release_fast_hierarchy(&self) {
        *self.fast_hierarchy.lock() = None;
    }

    pub fn has_points_to(&self) -> bool {
        fresh(&mut self.points_to.lock(), self.registry.state()).is_some()
    }

    /// The installed points-to result, or [`DumbPointsTo`] when none is current.
    pub fn points_to(&self) -> Arc<dyn PointsToAnalysis> {
        let mut slot = self.points_to.lock();
        match fresh(&mut slot, self.registry.state()) {
            Some(points_to) => points_to,
            None => Arc::new(DumbPointsTo),
        }
    }

    pub fn set_points_to(&self, points_to: Arc<dyn PointsToAnalysis>) {
        *self.points_to.lock() = self.stamp(points_to);
    }

    pub fn release_points_to(&self) {
        *self.points_to.lock() = None;
    }

    pub fn has_side_effect(&self) -> bool {
        fresh(&mut self.side_effect.lock(), self.registry.state()).is_some()
    }

    /// Built from the current points-to result and call graph on first use.
    pub fn side_effect(&self) -> Result<Arc<SideEffectAnalysis>> {
        let mut slot = self.side_effect.lock();
        let state = self.registry.state();
        if let Some(side_effect) = fresh(&mut slot, state) {
            return Ok(side_effect);
        }
        let side_effect = Arc::new(SideEffectAnalysis::new(self.points_to(), self.call_graph()?));
        *slot = Some(Stamped {
            state,
            value: side_effect.clone(),
        });
        Ok(side_effect)
    }

    pub fn set_side_effect(&self, side_effect: SideEffectAnalysis) {
        *self.side_effect.lock() = self.stamp(Arc::new(side_effect));
    }

    pub fn release_side_effect(&self) {
        *self.side_effect.lock() = None;
    }

    pub fn has_call_graph(&self) -> bool {
        self.call_graph.read().is_some()
    }

    pub fn call_graph(&self) -> Result<Arc<CallGraph>> {
        self.call_graph.read().clone().ok_or(SceneError::NoCallGraph)
    }

    /// Installs `call_graph` and discards the reachable-method set built on the old one.
    pub fn set_call_graph(&self, call_graph: Arc<CallGraph>) {
        let mut slot = self.call_graph.write();
        *self.reachable.lock() = None;
        *slot = Some(call_graph);
    }

    pub fn release_call_graph(&self) {
        let mut slot = self.call_graph.write();
        *self.reachable.lock() = None;
        *slot = None;
    }

    pub fn has_reachable_methods(&self) -> bool {
        self.reachable.lock().is_some()
    }

    /// Extends the reachable set from the current call graph and `entry_points`,
    /// then returns a snapshot of it.
    pub fn reachable_methods(&self, entry_points: &[Arc<MethodDescriptor>]) -> Result<ReachableMethods> {
        let graph = self.call_graph.read();
        let call_graph = graph.as_ref().ok_or(SceneError::NoCallGraph)?;
        let mut slot = self.reachable.lock();
        let reachable = slot.get_or_insert_with(ReachableMethods::new);
        reachable.update(call_graph, entry_points);
        Ok(reachable.clone())
    }

    pub fn set_reachable_methods(&self, reachable: ReachableMethods) {
        *self.reachable.lock() = Some(reachable);
    }

    pub fn release_reachable_methods(&self) {
        *self.reachable.lock() = None;
    }

    pub fn has_entry_points(&self) -> bool {
        self.entry_points.read().is_some()
    }

    /// Stored entry points, computing them with `build` the first time.
    pub fn entry_points_or_else(
        &self,
        build: impl FnOnce() -> Vec<Arc<MethodDescriptor>>,
    ) -> Vec<Arc<MethodDescriptor>> {
        if let Some(entry_points) = self.entry_points.read().as_ref() {
            return entry_points.clone();
        }
        let mut slot = self.entry_points.write();
        slot.get_or_insert_with(build).clone()
    }

    pub fn set_entry_points(&self, entry_points: Vec<Arc<MethodDescriptor>>) {
        *self.entry_points.write() = Some(entry_points);
    }

    pub fn release_entry_points(&self) {
        *self.entry_points.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PointsToSet;
    use crate::callgraph::InvokeKind;
    use crate::model::{ClassDescriptor, LocalDescriptor, ResolutionLevel};
    use crate::numberer::NumbererService;
    use crate::source::MethodDefinition;

    fn cache() -> (Arc<ClassRegistry>, AnalysisCache) {
        let registry = Arc::new(ClassRegistry::new(Arc::new(NumbererService::new(false)), true));
        let cache = AnalysisCache::new(registry.clone());
        (registry, cache)
    }

    fn method(name: &str) -> Arc<MethodDescriptor> {
        Arc::new(MethodDescriptor::new("a.Main", &MethodDefinition::new(name, &[], "void")))
    }

    struct NothingPointsTo;

    impl PointsToAnalysis for NothingPointsTo {
        fn reaching_objects(&self, _local: &LocalDescriptor) -> PointsToSet {
            PointsToSet::Types(Default::default())
        }
    }

    #[test]
    fn hierarchy_is_rebuilt_after_registry_changes() -> Result<()> {
        let (registry, cache) = cache();
        assert!(!cache.has_hierarchy());
        let first = cache.hierarchy()?;
        assert!(cache.has_hierarchy());
        assert!(Arc::ptr_eq(&first, &cache.hierarchy()?));

        let class = Arc::new(ClassDescriptor::new("a.A"));
        class.raise_level(ResolutionLevel::Hierarchy);
        registry.add_class(class)?;
        assert!(!cache.has_hierarchy());
        let second = cache.hierarchy()?;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);

        cache.release_hierarchy();
        assert!(!cache.has_hierarchy());
        Ok(())
    }

    #[test]
    fn call_graph_must_be_set_before_use() -> Result<()> {
        let (_, cache) = cache();
        assert!(matches!(cache.call_graph(), Err(SceneError::NoCallGraph)));
        assert!(matches!(cache.side_effect(), Err(SceneError::NoCallGraph)));
        assert!(matches!(cache.reachable_methods(&[]), Err(SceneError::NoCallGraph)));

        cache.set_call_graph(Arc::new(CallGraph::new()));
        assert!(cache.has_call_graph());
        assert!(cache.side_effect().is_ok());
        cache.release_call_graph();
        assert!(!cache.has_call_graph());
        Ok(())
    }

    #[test]
    fn reachable_methods_reset_with_the_call_graph() -> Result<()> {
        let (_, cache) = cache();
        let (main, helper) = (method("main"), method("helper"));
        let graph = Arc::new(CallGraph::new());
        graph.add_edge(main.clone(), helper.clone(), InvokeKind::Static);
        cache.set_call_graph(graph);

        let entries = vec![main.clone()];
        let first = cache.reachable_methods(&entries)?;
        let second = cache.reachable_methods(&entries)?;
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(cache.has_reachable_methods());

        cache.set_call_graph(Arc::new(CallGraph::new()));
        assert!(!cache.has_reachable_methods());
        assert_eq!(cache.reachable_methods(&entries)?.len(), 1);
        Ok(())
    }

    #[test]
    fn points_to_falls_back_and_goes_stale() -> Result<()> {
        let (registry, cache) = cache();
        let local = LocalDescriptor {
            method: "<a.Main: void main()>".to_string(),
            name: "r0".to_string(),
            type_name: "a.Main".to_string(),
        };
        assert!(!cache.has_points_to());
        assert_eq!(cache.points_to().reaching_objects(&local), PointsToSet::Everything);

        cache.set_points_to(Arc::new(NothingPointsTo));
        assert!(!cache.points_to().may_alias(&local, &local));

        registry.get_or_create_phantom("a.Ghost")?;
        assert!(!cache.has_points_to());
        assert!(cache.points_to().may_alias(&local, &local));
        Ok(())
    }

    #[test]
    fn entry_points_are_computed_once() {
        let (_, cache) = cache();
        let main = method("main");
        let built = cache.entry_points_or_else(|| vec![main.clone()]);
        assert_eq!(built.len(), 1);
        let again = cache.entry_points_or_else(Vec::new);
        assert_eq!(again.len(), 1);

        cache.release_entry_points();
        assert!(!cache.has_entry_points());
        cache.set_entry_points(Vec::new());
        assert!(cache.entry_points_or_else(|| vec![main]).is_empty());
    }
}
