//! Guard-annotation classification.
//!
//! An annotation type is a guard if it carries the [`TypeId::GUARD`] marker,
//! or inherits guard-ness from a guard that meta-annotates it. Classification
//! builds the meta-annotation graph reachable from the inspected type (an
//! edge `a -> b` means `b` is meta-annotated with `a`), propagates the guard
//! flag forward along edges, and then walks back from the origin through
//! guard nodes looking for a cycle.
//!
//! Marking has to finish before the cycle walk: a cycle among ordinary
//! annotations is harmless, only a cycle among guards is an error.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use guardrail_core::{TypeId, TypeRegistry};

use crate::cache::OnceMap;
use crate::error::Circularity;

/// Caches classification verdicts per annotation type.
#[derive(Debug, Default)]
pub struct Classifier {
    verdicts: OnceMap<TypeId, Result<bool, Circularity>>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `annotation_type` is a guard. Computed at most once per type;
    /// later calls return the same verdict, errors included.
    pub fn is_guard(
        &self,
        registry: &TypeRegistry,
        annotation_type: TypeId,
    ) -> Result<bool, Circularity> {
        self.verdicts.get_or_init(annotation_type, || {
            let verdict = classify(registry, annotation_type);
            if let Err(cycle) = &verdict {
                tracing::warn!(
                    annotation = %registry.qualified_name(annotation_type),
                    %cycle,
                    "guard annotation is circular; it will never be linked"
                );
            }
            verdict
        })
    }

    /// Number of classified annotation types.
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uncached classification of one annotation type.
pub fn classify(registry: &TypeRegistry, origin: TypeId) -> Result<bool, Circularity> {
    if !registry.is_annotation(origin) {
        return Ok(false);
    }
    let meta = MetaGraph::build(registry, origin);
    let guards = meta.propagate();
    if !guards.contains(&meta.origin) {
        return Ok(false);
    }
    match meta.find_guard_cycle(&guards) {
        Some(cycle) => {
            let path: Vec<TypeId> = cycle.iter().map(|n| meta.graph[*n]).collect();
            let names = path.iter().map(|t| registry.qualified_name(*t)).collect();
            Err(Circularity { path, names })
        }
        None => Ok(true),
    }
}

/// Meta-annotation graph reachable from one annotation type.
struct MetaGraph {
    graph: DiGraph<TypeId, ()>,
    origin: NodeIndex,
    /// Nodes carrying the guard marker themselves.
    marked: HashSet<NodeIndex>,
}

impl MetaGraph {
    fn build(registry: &TypeRegistry, origin: TypeId) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<TypeId, NodeIndex> = HashMap::new();
        let mut marked = HashSet::new();

        let origin_idx = graph.add_node(origin);
        nodes.insert(origin, origin_idx);

        let mut pending = vec![origin];
        while let Some(current) = pending.pop() {
            let current_idx = nodes[&current];
            let Some(def) = registry.annotation(current) else {
                continue;
            };
            for meta in &def.meta {
                let meta_type = meta.type_id;
                if meta_type == TypeId::GUARD {
                    marked.insert(current_idx);
                    continue;
                }
                if TypeId::LANGUAGE_META.contains(&meta_type)
                    || !registry.is_annotation(meta_type)
                {
                    continue;
                }
                let meta_idx = match nodes.get(&meta_type) {
                    Some(idx) => *idx,
                    None => {
                        let idx = graph.add_node(meta_type);
                        nodes.insert(meta_type, idx);
                        pending.push(meta_type);
                        idx
                    }
                };
                if !graph.contains_edge(meta_idx, current_idx) {
                    graph.add_edge(meta_idx, current_idx, ());
                }
            }
        }

        MetaGraph {
            graph,
            origin: origin_idx,
            marked,
        }
    }

    /// Spreads guard-ness from marked nodes to everything they meta-annotate,
    /// transitively.
    fn propagate(&self) -> HashSet<NodeIndex> {
        let mut guards: HashSet<NodeIndex> = self.marked.clone();
        let mut queue: VecDeque<NodeIndex> = self.marked.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if guards.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        guards
    }

    /// Depth-first walk from the origin towards its meta-annotations,
    /// restricted to guard nodes. Returns the first cycle found, closed
    /// (first node repeated at the end).
    fn find_guard_cycle(&self, guards: &HashSet<NodeIndex>) -> Option<Vec<NodeIndex>> {
        let mut walk = CycleWalk {
            graph: &self.graph,
            guards,
            path: Vec::new(),
            on_path: HashSet::new(),
            done: HashSet::new(),
        };
        walk.visit(self.origin)
    }
}

struct CycleWalk<'a> {
    graph: &'a DiGraph<TypeId, ()>,
    guards: &'a HashSet<NodeIndex>,
    path: Vec<NodeIndex>,
    on_path: HashSet<NodeIndex>,
    done: HashSet<NodeIndex>,
}

impl CycleWalk<'_> {
    fn visit(&mut self, node: NodeIndex) -> Option<Vec<NodeIndex>> {
        self.path.push(node);
        self.on_path.insert(node);
        let metas: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        for meta in metas {
            if !self.guards.contains(&meta) || self.done.contains(&meta) {
                continue;
            }
            if self.on_path.contains(&meta) {
                let start = self.path.iter().position(|n| *n == meta).unwrap_or(0);
                let mut cycle = self.path[start..].to_vec();
                cycle.push(meta);
                return Some(cycle);
            }
            if let Some(cycle) = self.visit(meta) {
                return Some(cycle);
            }
        }
        self.path.pop();
        self.on_path.remove(&node);
        self.done.insert(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_core::{Annotation, AnnotationDef, ClassDef};

    fn guard_marker() -> Annotation {
        Annotation::new(TypeId::GUARD)
    }

    fn declare(reg: &mut TypeRegistry, name: &str, guard: bool) -> TypeId {
        let retention = Annotation::new(TypeId::RETENTION).with("value", "RUNTIME");
        let mut def = AnnotationDef::new().meta(retention);
        if guard {
            def = def.meta(guard_marker());
        }
        reg.declare_annotation("demo", name, def).unwrap()
    }

    #[test]
    fn directly_marked_is_guard() {
        let mut reg = TypeRegistry::new();
        let min = declare(&mut reg, "Min", true);
        assert_eq!(classify(&reg, min), Ok(true));
    }

    #[test]
    fn plain_annotation_is_not_guard() {
        let mut reg = TypeRegistry::new();
        let doc = declare(&mut reg, "Doc", false);
        assert_eq!(classify(&reg, doc), Ok(false));
    }

    #[test]
    fn guard_ness_is_inherited_transitively() {
        let mut reg = TypeRegistry::new();
        let min = declare(&mut reg, "Min", true);
        let positive = declare(&mut reg, "Positive", false);
        reg.add_meta_annotation(positive, Annotation::new(min).with("value", 1)).unwrap();
        let strictly = declare(&mut reg, "StrictlyPositive", false);
        reg.add_meta_annotation(strictly, Annotation::new(positive)).unwrap();

        assert_eq!(classify(&reg, positive), Ok(true));
        assert_eq!(classify(&reg, strictly), Ok(true));
        // inheritance flows down only
        assert_eq!(classify(&reg, min), Ok(true));
    }

    #[test]
    fn guard_cycle_is_circularity() {
        let mut reg = TypeRegistry::new();
        let a = declare(&mut reg, "A", true);
        let b = declare(&mut reg, "B", true);
        reg.add_meta_annotation(a, Annotation::new(b)).unwrap();
        reg.add_meta_annotation(b, Annotation::new(a)).unwrap();

        let err = classify(&reg, a).unwrap_err();
        assert_eq!(err.path, vec![a, b, a]);
        assert_eq!(err.names, vec!["demo.A", "demo.B", "demo.A"]);
        assert!(classify(&reg, b).is_err());
    }

    #[test]
    fn non_guard_cycle_is_harmless() {
        let mut reg = TypeRegistry::new();
        let a = declare(&mut reg, "A", false);
        let b = declare(&mut reg, "B", false);
        reg.add_meta_annotation(a, Annotation::new(b)).unwrap();
        reg.add_meta_annotation(b, Annotation::new(a)).unwrap();

        assert_eq!(classify(&reg, a), Ok(false));
        assert_eq!(classify(&reg, b), Ok(false));
    }

    #[test]
    fn non_guard_cycle_above_a_guard_is_ignored() {
        let mut reg = TypeRegistry::new();
        let x = declare(&mut reg, "X", false);
        let y = declare(&mut reg, "Y", false);
        reg.add_meta_annotation(x, Annotation::new(y)).unwrap();
        reg.add_meta_annotation(y, Annotation::new(x)).unwrap();
        let g = declare(&mut reg, "G", true);
        reg.add_meta_annotation(g, Annotation::new(x)).unwrap();

        assert_eq!(classify(&reg, g), Ok(true));
    }

    #[test]
    fn inherited_guard_in_cycle_is_circularity() {
        let mut reg = TypeRegistry::new();
        let a = declare(&mut reg, "A", true);
        let b = declare(&mut reg, "B", false);
        reg.add_meta_annotation(b, Annotation::new(a)).unwrap();
        reg.add_meta_annotation(a, Annotation::new(b)).unwrap();

        assert!(classify(&reg, a).is_err());
        assert!(classify(&reg, b).is_err());
    }

    #[test]
    fn self_annotated_guard_is_circularity() {
        let mut reg = TypeRegistry::new();
        let a = declare(&mut reg, "Loop", true);
        reg.add_meta_annotation(a, Annotation::new(a)).unwrap();
        let err = classify(&reg, a).unwrap_err();
        assert_eq!(err.path, vec![a, a]);
    }

    #[test]
    fn language_meta_annotations_are_ignored() {
        let mut reg = TypeRegistry::new();
        // Retention and Documented annotate each other in real libraries
        reg.add_meta_annotation(TypeId::RETENTION, Annotation::new(TypeId::DOCUMENTED)).unwrap();
        reg.add_meta_annotation(TypeId::DOCUMENTED, Annotation::new(TypeId::RETENTION)).unwrap();
        let a = declare(&mut reg, "A", true);
        reg.add_meta_annotation(a, Annotation::new(TypeId::DOCUMENTED)).unwrap();
        assert_eq!(classify(&reg, a), Ok(true));
    }

    #[test]
    fn non_annotation_types_are_not_guards() {
        let mut reg = TypeRegistry::new();
        let c = reg.declare_class("demo", "Plain", ClassDef::class()).unwrap();
        assert_eq!(classify(&reg, c), Ok(false));
        assert_eq!(classify(&reg, TypeId::INT), Ok(false));
        assert_eq!(classify(&reg, TypeId(9_999)), Ok(false));
    }

    #[test]
    fn classifier_is_deterministic_and_cached() {
        let mut reg = TypeRegistry::new();
        let a = declare(&mut reg, "A", true);
        let b = declare(&mut reg, "B", true);
        reg.add_meta_annotation(a, Annotation::new(b)).unwrap();
        reg.add_meta_annotation(b, Annotation::new(a)).unwrap();
        let ok = declare(&mut reg, "Ok", true);

        let classifier = Classifier::new();
        let first = classifier.is_guard(&reg, a);
        for _ in 0..3 {
            assert_eq!(classifier.is_guard(&reg, a), first);
            assert_eq!(classifier.is_guard(&reg, ok), Ok(true));
        }
        assert_eq!(classifier.len(), 2);
    }
}
