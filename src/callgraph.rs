//! Call-graph storage and the incrementally maintained reachable-method set.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::MethodDescriptor;

/// Kind of a call edge. Numbered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InvokeKind {
    Invalid,
    Static,
    Virtual,
    Interface,
    Special,
    Clinit,
    Thread,
    Executor,
    AsyncTask,
    Finalize,
    InvokeFinalize,
    Privileged,
    NewInstance,
}

impl InvokeKind {
    pub const ALL: [InvokeKind; 13] = [
        InvokeKind::Invalid,
        InvokeKind::Static,
        InvokeKind::Virtual,
        InvokeKind::Interface,
        InvokeKind::Special,
        InvokeKind::Clinit,
        InvokeKind::Thread,
        InvokeKind::Executor,
        InvokeKind::AsyncTask,
        InvokeKind::Finalize,
        InvokeKind::InvokeFinalize,
        InvokeKind::Privileged,
        InvokeKind::NewInstance,
    ];

    /// Edges the JVM creates without an invoke instruction at the call site.
    pub fn is_implicit(self) -> bool {
        !matches!(
            self,
            InvokeKind::Static | InvokeKind::Virtual | InvokeKind::Interface | InvokeKind::Special
        )
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: Arc<MethodDescriptor>,
    pub target: Arc<MethodDescriptor>,
    pub kind: InvokeKind,
}

/// Append-only edge list indexed by source method signature.
#[derive(Debug, Default)]
pub struct CallGraph {
    inner: RwLock<CallGraphInner>,
}

#[derive(Debug, Default)]
struct CallGraphInner {
    edges: Vec<Edge>,
    by_source: IndexMap<String, Vec<usize>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge; returns false if the same (source, target, kind) edge exists.
    pub fn add_edge(
        &self,
        source: Arc<MethodDescriptor>,
        target: Arc<MethodDescriptor>,
        kind: InvokeKind,
    ) -> bool {
        let mut inner = self.inner.write();
        let key = source.signature();
        let duplicate = inner.by_source.get(&key).is_some_and(|indices| {
            indices.iter().any(|&i| {
                let edge = &inner.edges[i];
                edge.kind == kind && Arc::ptr_eq(&edge.target, &target)
            })
        });
        if duplicate {
            return false;
        }
        let index = inner.edges.len();
        inner.edges.push(Edge {
            source,
            target,
            kind,
        });
        inner.by_source.entry(key).or_default().push(index);
        true
    }

    pub fn edges_out_of(&self, method: &MethodDescriptor) -> Vec<Edge> {
        let inner = self.inner.read();
        inner
            .by_source
            .get(&method.signature())
            .map(|indices| indices.iter().map(|&i| inner.edges[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Edges appended at or after position `start`.
    pub fn edges_since(&self, start: usize) -> Vec<Edge> {
        let inner = self.inner.read();
        inner.edges.get(start..).map(<[Edge]>::to_vec).unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }
}

/// Methods reachable from the entry points over the call graph.
///
/// [`update`](ReachableMethods::update) only ever adds methods. It consumes call-graph
/// edges appended since the previous update, so calling it again without new edges
/// or entry points leaves the set unchanged.
#[derive(Debug, Clone, Default)]
pub struct ReachableMethods {
    reachable: IndexMap<String, Arc<MethodDescriptor>>,
    edges_seen: usize,
}

impl ReachableMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, call_graph: &CallGraph, entry_points: &[Arc<MethodDescriptor>]) {
        let mut worklist: VecDeque<Arc<MethodDescriptor>> = VecDeque::new();
        for entry in entry_points {
            if self.insert(entry) {
                worklist.push_back(entry.clone());
            }
        }

        // Edges from methods that were already reachable before this update.
        let fresh = call_graph.edges_since(self.edges_seen);
        self.edges_seen += fresh.len();
        for edge in fresh {
            if self.contains(&edge.source) && self.insert(&edge.target) {
                worklist.push_back(edge.target.clone());
            }
        }

        while let Some(method) = worklist.pop_front() {
            for edge in call_graph.edges_out_of(&method) {
                if self.insert(&edge.target) {
                    worklist.push_back(edge.target.clone());
                }
            }
        }
    }

    fn insert(&mut self, method: &Arc<MethodDescriptor>) -> bool {
        let key = method.signature();
        if self.reachable.contains_key(&key) {
            return false;
        }
        self.reachable.insert(key, method.clone());
        true
    }

    pub fn contains(&self, method: &MethodDescriptor) -> bool {
        self.reachable.contains_key(&method.signature())
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.reachable.values()
    }

    pub fn len(&self) -> usize {
        self.reachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reachable.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MethodDefinition;

    fn method(class: &str, name: &str) -> Arc<MethodDescriptor> {
        Arc::new(MethodDescriptor::new(
            class,
            &MethodDefinition::new(name, &[], "void"),
        ))
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let graph = CallGraph::new();
        let a = method("a.A", "a");
        let b = method("a.B", "b");
        assert!(graph.add_edge(a.clone(), b.clone(), InvokeKind::Static));
        assert!(!graph.add_edge(a.clone(), b.clone(), InvokeKind::Static));
        assert!(graph.add_edge(a.clone(), b, InvokeKind::Virtual));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges_out_of(&a).len(), 2);
    }

    #[test]
    fn reachable_methods_grow_and_are_idempotent() {
        let graph = CallGraph::new();
        let main = method("a.Main", "main");
        let helper = method("a.Helper", "help");
        let deep = method("a.Deep", "dive");
        let orphan = method("a.Orphan", "lost");
        graph.add_edge(main.clone(), helper.clone(), InvokeKind::Static);
        graph.add_edge(orphan.clone(), deep.clone(), InvokeKind::Static);

        let mut reachable = ReachableMethods::new();
        reachable.update(&graph, &[main.clone()]);
        assert_eq!(reachable.len(), 2);
        assert!(reachable.contains(&helper));
        assert!(!reachable.contains(&deep));

        let snapshot: Vec<String> = reachable.methods().map(|m| m.signature()).collect();
        reachable.update(&graph, &[main.clone()]);
        let again: Vec<String> = reachable.methods().map(|m| m.signature()).collect();
        assert_eq!(snapshot, again);

        graph.add_edge(helper.clone(), deep.clone(), InvokeKind::Virtual);
        reachable.update(&graph, &[main]);
        assert_eq!(reachable.len(), 3);
        assert!(reachable.contains(&deep));
        assert!(!reachable.contains(&orphan));
    }

    #[test]
    fn kind_order_is_fixed() {
        assert_eq!(InvokeKind::ALL[0], InvokeKind::Invalid);
        assert_eq!(InvokeKind::ALL[12], InvokeKind::NewInstance);
        assert!(InvokeKind::Thread.is_implicit());
        assert!(!InvokeKind::Special.is_implicit());
    }
}
