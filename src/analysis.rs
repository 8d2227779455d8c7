//! Analysis-result contracts stored by the cache, with their trivial fallbacks.

use indexmap::IndexSet;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::callgraph::CallGraph;
use crate::model::{LocalDescriptor, MethodDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointsToSet {
    /// May point to any object.
    Everything,
    /// Allocation types the local may point to.
    Types(BTreeSet<String>),
}

impl PointsToSet {
    pub fn has_non_empty_intersection(&self, other: &PointsToSet) -> bool {
        match (self, other) {
            (PointsToSet::Types(a), PointsToSet::Types(b)) => !a.is_disjoint(b),
            (PointsToSet::Types(a), PointsToSet::Everything)
            | (PointsToSet::Everything, PointsToSet::Types(a)) => !a.is_empty(),
            (PointsToSet::Everything, PointsToSet::Everything) => true,
        }
    }
}

pub trait PointsToAnalysis: Send + Sync {
    fn reaching_objects(&self, local: &LocalDescriptor) -> PointsToSet;

    fn may_alias(&self, a: &LocalDescriptor, b: &LocalDescriptor) -> bool {
        self.reaching_objects(a)
            .has_non_empty_intersection(&self.reaching_objects(b))
    }
}

/// Answers "everything" for every local.
#[derive(Debug, Default, Clone, Copy)]
pub struct DumbPointsTo;

impl PointsToAnalysis for DumbPointsTo {
    fn reaching_objects(&self, _local: &LocalDescriptor) -> PointsToSet {
        PointsToSet::Everything
    }
}

/// Transitive-callee queries over a call graph, paired with the points-to result
/// that was current when it was built.
pub struct SideEffectAnalysis {
    points_to: Arc<dyn PointsToAnalysis>,
    call_graph: Arc<CallGraph>,
}

impl SideEffectAnalysis {
    pub fn new(points_to: Arc<dyn PointsToAnalysis>, call_graph: Arc<CallGraph>) -> Self {
        Self {
            points_to,
            call_graph,
        }
    }

    pub fn points_to(&self) -> &Arc<dyn PointsToAnalysis> {
        &self.points_to
    }

    /// Methods `method` may invoke, directly or indirectly, by signature.
    pub fn transitive_callees(&self, method: &Arc<MethodDescriptor>) -> Vec<Arc<MethodDescriptor>> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut callees = Vec::new();
        let mut queue = VecDeque::from([method.clone()]);
        while let Some(current) = queue.pop_front() {
            for edge in self.call_graph.edges_out_of(&current) {
                if seen.insert(edge.target.signature()) {
                    callees.push(edge.target.clone());
                    queue.push_back(edge.target);
                }
            }
        }
        callees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::InvokeKind;
    use crate::source::MethodDefinition;

    fn local(name: &str) -> LocalDescriptor {
        LocalDescriptor {
            method: "<a.A: void m()>".to_string(),
            name: name.to_string(),
            type_name: "java.lang.Object".to_string(),
        }
    }

    #[test]
    fn dumb_points_to_aliases_everything() {
        assert!(DumbPointsTo.may_alias(&local("r0"), &local("r1")));
        assert_eq!(DumbPointsTo.reaching_objects(&local("r0")), PointsToSet::Everything);
    }

    #[test]
    fn typed_sets_intersect_on_shared_types() {
        let a = PointsToSet::Types(BTreeSet::from(["a.A".to_string()]));
        let b = PointsToSet::Types(BTreeSet::from(["a.B".to_string()]));
        let empty = PointsToSet::Types(BTreeSet::new());
        assert!(!a.has_non_empty_intersection(&b));
        assert!(a.has_non_empty_intersection(&PointsToSet::Everything));
        assert!(!empty.has_non_empty_intersection(&PointsToSet::Everything));
    }

    #[test]
    fn transitive_callees_follow_cycles_once() {
        let m = |name: &str| Arc::new(MethodDescriptor::new("a.A", &MethodDefinition::new(name, &[], "void")));
        let (a, b, c) = (m("a"), m("b"), m("c"));
        let graph = Arc::new(CallGraph::new());
        graph.add_edge(a.clone(), b.clone(), InvokeKind::Static);
        graph.add_edge(b.clone(), c.clone(), InvokeKind::Static);
        graph.add_edge(c.clone(), a.clone(), InvokeKind::Static);

        let side_effects = SideEffectAnalysis::new(Arc::new(DumbPointsTo), graph);
        let callees: Vec<String> = side_effects
            .transitive_callees(&a)
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(callees, vec!["b", "c", "a"]);
    }
}
