//! Data-lineage tracing between source-role symbols (view bindings, form
//! fields, state fields) and sink-role symbols (columns, tables).
//!
//! Both directions walk breadth-first over flow references only. Every path
//! found is returned, complete or partial; partial paths carry the reason they
//! stopped in `gaps`. Upstream traces are reversed so every path reads
//! source to sink.

use crate::model::{Confidence, RefKind, Reference, SYNTHETIC_DB_PREFIX, Symbol};
use crate::source::GraphSource;
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Gap recorded when a branch runs out of depth before reaching an endpoint.
pub const GAP_MAX_DEPTH: &str = "max_depth";
/// Gap recorded when a branch has no flow reference to follow.
pub const GAP_DEAD_END: &str = "dead_end";
/// Gap recorded when a reference points at an id that is neither stored nor synthetic.
pub const GAP_UNRESOLVED: &str = "unresolved_target";
/// Gap recorded when every flow reference leads back into the path itself.
pub const GAP_CYCLE: &str = "cycle";

/// Upper bound on paths collected by one trace call.
const MAX_PATHS: usize = 1_000;

/// How a trace avoids revisiting nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitMode {
    /// One visited set per call. Bounded, but a node reached by one branch is
    /// never expanded again for another, so alternate paths through it are dropped.
    #[default]
    Global,
    /// Only nodes already on the current path are excluded. Enumerates every
    /// alternate path within the depth bound.
    PerPath,
}

impl From<&str> for VisitMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "per_path" | "per-path" | "perpath" | "exhaustive" => VisitMode::PerPath,
            _ => VisitMode::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageStep {
    pub symbol: Symbol,
    /// Relationship that reached this step; `None` on the first step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<RefKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineagePath {
    pub steps: Vec<LineageStep>,
    #[serde(rename = "is_complete")]
    pub complete: bool,
    pub gaps: Vec<String>,
    #[serde(rename = "min_confidence")]
    pub confidence: Confidence,
}

impl LineagePath {
    fn finish(steps: Vec<LineageStep>, complete: bool, gaps: Vec<String>) -> Self {
        let confidence = Confidence::weakest(steps.iter().filter_map(|step| step.confidence));
        Self {
            steps,
            complete,
            gaps,
            confidence,
        }
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.symbol.id.clone()).collect()
    }

    pub fn source(&self) -> Option<&Symbol> {
        self.steps.first().map(|step| &step.symbol)
    }

    pub fn sink(&self) -> Option<&Symbol> {
        self.steps.last().map(|step| &step.symbol)
    }

    /// Number of references on the path.
    pub fn len(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.len() <= 1
    }

    /// Stable identity of the node sequence.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in self.node_ids() {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Clone, Copy)]
enum Walk {
    Downstream,
    Upstream,
}

impl Walk {
    fn is_endpoint(self, symbol: &Symbol) -> bool {
        match self {
            Walk::Downstream => {
                symbol.kind.is_sink_role() || symbol.id.starts_with(SYNTHETIC_DB_PREFIX)
            }
            Walk::Upstream => symbol.kind.is_source_role(),
        }
    }

    fn next_id(self, reference: &Reference) -> &str {
        match self {
            Walk::Downstream => &reference.target_id,
            Walk::Upstream => &reference.source_id,
        }
    }
}

struct Pending {
    steps: Vec<LineageStep>,
}

impl Pending {
    fn current(&self) -> &Symbol {
        // Never empty: every pending path starts from the resolved start symbol.
        &self.steps[self.steps.len() - 1].symbol
    }

    fn depth(&self) -> usize {
        self.steps.len() - 1
    }

    fn contains(&self, id: &str) -> bool {
        self.steps.iter().any(|step| step.symbol.id == id)
    }
}

/// Lineage tracer over any [`GraphSource`].
pub struct Tracer<'a, S: GraphSource + ?Sized> {
    source: &'a S,
    mode: VisitMode,
}

impl<'a, S: GraphSource + ?Sized> Tracer<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            mode: VisitMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: VisitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> VisitMode {
        self.mode
    }

    /// Paths from `source_id` along outgoing flow references. `kinds` defaults to [`RefKind::FLOW`].
    pub fn trace_downstream(
        &self,
        source_id: &str,
        max_depth: usize,
        kinds: Option<&[RefKind]>,
    ) -> Result<Vec<LineagePath>> {
        self.trace(source_id, max_depth, kinds, Walk::Downstream)
    }

    /// Paths reaching `sink_id` along incoming flow references, each reversed to read source to sink.
    pub fn trace_upstream(
        &self,
        sink_id: &str,
        max_depth: usize,
        kinds: Option<&[RefKind]>,
    ) -> Result<Vec<LineagePath>> {
        let paths = self.trace(sink_id, max_depth, kinds, Walk::Upstream)?;
        Ok(paths.into_iter().map(reverse).collect())
    }

    fn trace(
        &self,
        start_id: &str,
        max_depth: usize,
        kinds: Option<&[RefKind]>,
        walk: Walk,
    ) -> Result<Vec<LineagePath>> {
        let Some(start) = self.source.symbol(start_id)? else {
            tracing::debug!(id = start_id, "lineage start not found");
            return Ok(Vec::new());
        };
        let kinds = kinds.unwrap_or(&RefKind::FLOW[..]);

        let mut paths = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.id.clone());
        let mut queue = VecDeque::new();
        queue.push_back(Pending {
            steps: vec![LineageStep {
                symbol: start,
                via: None,
                confidence: None,
            }],
        });

        while let Some(pending) = queue.pop_front() {
            if paths.len() >= MAX_PATHS {
                tracing::debug!(id = start_id, limit = MAX_PATHS, "lineage path limit reached");
                break;
            }
            let current = pending.current();
            if walk.is_endpoint(current) {
                paths.push(LineagePath::finish(pending.steps, true, Vec::new()));
                continue;
            }
            if pending.depth() >= max_depth {
                let gap = format!("{GAP_MAX_DEPTH}:{}", current.id);
                paths.push(LineagePath::finish(pending.steps, false, vec![gap]));
                continue;
            }

            let current_id = current.id.clone();
            let edges = match walk {
                Walk::Downstream => self.source.outgoing(&current_id, Some(kinds))?,
                Walk::Upstream => self.source.incoming(&current_id, Some(kinds))?,
            };
            if edges.is_empty() {
                let gap = format!("{GAP_DEAD_END}:{current_id}");
                paths.push(LineagePath::finish(pending.steps, false, vec![gap]));
                continue;
            }

            let mut unresolved = Vec::new();
            let mut enqueued = 0;
            let mut only_ancestors = true;
            for reference in &edges {
                let next_id = walk.next_id(reference);
                let seen = match self.mode {
                    VisitMode::Global => visited.contains(next_id),
                    VisitMode::PerPath => pending.contains(next_id),
                };
                if seen {
                    only_ancestors &= pending.contains(next_id);
                    continue;
                }
                let Some(next) = self.source.symbol(next_id)? else {
                    unresolved.push(format!("{GAP_UNRESOLVED}:{next_id}"));
                    continue;
                };
                if self.mode == VisitMode::Global {
                    visited.insert(next.id.clone());
                }
                let mut steps = pending.steps.clone();
                steps.push(LineageStep {
                    symbol: next,
                    via: Some(reference.kind),
                    confidence: Some(reference.confidence),
                });
                queue.push_back(Pending { steps });
                enqueued += 1;
            }
            if !unresolved.is_empty() {
                paths.push(LineagePath::finish(pending.steps, false, unresolved));
            } else if enqueued == 0 && only_ancestors {
                // Neighbours reached through another branch are that branch's to report.
                let gap = format!("{GAP_CYCLE}:{current_id}");
                paths.push(LineagePath::finish(pending.steps, false, vec![gap]));
            }
        }

        Ok(paths)
    }
}

// Upstream steps carry the edge toward the previous (sink-side) node; after
// reversal each step must carry the edge that reaches it from the source side.
fn reverse(path: LineagePath) -> LineagePath {
    let LineagePath {
        steps,
        complete,
        gaps,
        confidence,
    } = path;
    let edges: Vec<(Option<RefKind>, Option<Confidence>)> = steps
        .iter()
        .rev()
        .map(|step| (step.via, step.confidence))
        .collect();
    let mut reversed: Vec<LineageStep> = steps.into_iter().rev().collect();
    for (idx, step) in reversed.iter_mut().enumerate() {
        let (via, confidence) = match idx {
            0 => (None, None),
            _ => edges[idx - 1],
        };
        step.via = via;
        step.confidence = confidence;
    }
    LineagePath {
        steps: reversed,
        complete,
        gaps,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SymbolGraph;
    use crate::model::SymbolKind;

    fn sym(kind: SymbolKind, name: &str) -> Symbol {
        Symbol::new(kind, name, name, "app/form.html", 1, 1)
    }

    #[test]
    fn path_confidence_is_the_weakest_step() {
        let mut graph = SymbolGraph::new();
        let binding = sym(SymbolKind::ViewBinding, "amount");
        let handler = sym(SymbolKind::Function, "save");
        let field = sym(SymbolKind::EntityField, "Order.amount");
        for s in [&binding, &handler, &field] {
            graph.add_symbol(s.clone());
        }
        graph.add_reference(
            Reference::new(&binding.id, &handler.id, RefKind::Submits)
                .with_confidence(Confidence::Medium),
        );
        graph.add_reference(
            Reference::new(&handler.id, &field.id, RefKind::Writes).with_confidence(Confidence::Low),
        );
        graph.add_reference(
            Reference::new(&field.id, "db::orders.amount", RefKind::MapsTo)
                .with_confidence(Confidence::High),
        );

        let paths = Tracer::new(&graph)
            .trace_downstream(&binding.id, 5, None)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].complete);
        assert_eq!(paths[0].confidence, Confidence::Low);
        assert_eq!(paths[0].len(), 3);
    }

    #[test]
    fn upstream_paths_read_source_to_sink() {
        let mut graph = SymbolGraph::new();
        let binding = sym(SymbolKind::ViewBinding, "email");
        let field = sym(SymbolKind::EntityField, "User.email");
        graph.add_symbol(binding.clone());
        graph.add_symbol(field.clone());
        graph.add_reference(
            Reference::new(&binding.id, &field.id, RefKind::BindsTo)
                .with_confidence(Confidence::Medium),
        );
        graph.add_reference(Reference::new(&field.id, "db::users.email", RefKind::MapsTo));

        let paths = Tracer::new(&graph)
            .trace_upstream("db::users.email", 5, None)
            .unwrap();
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert!(path.complete);
        assert_eq!(
            path.node_ids(),
            vec![binding.id.clone(), field.id.clone(), "db::users.email".to_string()]
        );
        assert_eq!(path.steps[0].via, None);
        assert_eq!(path.steps[1].via, Some(RefKind::BindsTo));
        assert_eq!(path.steps[1].confidence, Some(Confidence::Medium));
        assert_eq!(path.steps[2].via, Some(RefKind::MapsTo));
        assert_eq!(path.confidence, Confidence::Medium);
    }

    #[test]
    fn dead_ends_and_depth_limits_are_partial_paths() {
        let mut graph = SymbolGraph::new();
        let binding = sym(SymbolKind::ViewBinding, "name");
        let handler = sym(SymbolKind::Function, "update");
        graph.add_symbol(binding.clone());
        graph.add_symbol(handler.clone());
        graph.add_reference(Reference::new(&binding.id, &handler.id, RefKind::Submits));

        let tracer = Tracer::new(&graph);
        let paths = tracer.trace_downstream(&binding.id, 5, None).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].complete);
        assert_eq!(paths[0].gaps, vec![format!("{GAP_DEAD_END}:{}", handler.id)]);

        let paths = tracer.trace_downstream(&binding.id, 0, None).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].steps.len(), 1);
        assert!(paths[0].gaps[0].starts_with(GAP_MAX_DEPTH));
    }

    #[test]
    fn structural_references_are_not_followed() {
        let mut graph = SymbolGraph::new();
        let entity = sym(SymbolKind::Entity, "Order");
        let base = sym(SymbolKind::Class, "Base");
        graph.add_symbol(entity.clone());
        graph.add_symbol(base.clone());
        graph.add_reference(Reference::new(&entity.id, &base.id, RefKind::Extends));

        let paths = Tracer::new(&graph)
            .trace_downstream(&entity.id, 5, None)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].gaps[0].starts_with(GAP_DEAD_END));
    }

    #[test]
    fn per_path_mode_finds_alternate_routes() {
        // a -> b -> d -> db::t.c and a -> c -> d: global mode expands d once.
        let mut graph = SymbolGraph::new();
        let a = sym(SymbolKind::FormField, "a");
        let b = sym(SymbolKind::Function, "b");
        let c = sym(SymbolKind::Function, "c");
        let d = sym(SymbolKind::EntityField, "d");
        for s in [&a, &b, &c, &d] {
            graph.add_symbol(s.clone());
        }
        graph.add_reference(Reference::new(&a.id, &b.id, RefKind::Submits));
        graph.add_reference(Reference::new(&a.id, &c.id, RefKind::Submits));
        graph.add_reference(Reference::new(&b.id, &d.id, RefKind::Writes));
        graph.add_reference(Reference::new(&c.id, &d.id, RefKind::Writes));
        graph.add_reference(Reference::new(&d.id, "db::t.c", RefKind::MapsTo));

        let global = Tracer::new(&graph).trace_downstream(&a.id, 5, None).unwrap();
        assert_eq!(global.iter().filter(|p| p.complete).count(), 1);

        let exhaustive = Tracer::new(&graph)
            .with_mode(VisitMode::PerPath)
            .trace_downstream(&a.id, 5, None)
            .unwrap();
        assert_eq!(exhaustive.iter().filter(|p| p.complete).count(), 2);
    }

    #[test]
    fn cycles_terminate() {
        let mut graph = SymbolGraph::new();
        let a = sym(SymbolKind::StateField, "a");
        let b = sym(SymbolKind::Function, "b");
        graph.add_symbol(a.clone());
        graph.add_symbol(b.clone());
        graph.add_reference(Reference::new(&a.id, &b.id, RefKind::Calls));
        graph.add_reference(Reference::new(&b.id, &a.id, RefKind::Calls));

        for mode in [VisitMode::Global, VisitMode::PerPath] {
            let paths = Tracer::new(&graph)
                .with_mode(mode)
                .trace_downstream(&a.id, 10, None)
                .unwrap();
            assert_eq!(paths.len(), 1, "{mode:?}");
            assert!(!paths[0].complete);
            assert_eq!(paths[0].node_ids(), vec![a.id.clone(), b.id.clone()]);
            assert_eq!(paths[0].gaps, vec![format!("{GAP_CYCLE}:{}", b.id)]);
        }
    }

    #[test]
    fn self_loop_is_a_cycle_not_silence() {
        let mut graph = SymbolGraph::new();
        let a = sym(SymbolKind::Function, "retry");
        graph.add_symbol(a.clone());
        graph.add_reference(Reference::new(&a.id, &a.id, RefKind::Calls));

        let paths = Tracer::new(&graph)
            .with_mode(VisitMode::PerPath)
            .trace_upstream(&a.id, 5, None)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].gaps, vec![format!("{GAP_CYCLE}:{}", a.id)]);
    }

    #[test]
    fn unknown_start_yields_nothing() {
        let graph = SymbolGraph::new();
        let paths = Tracer::new(&graph)
            .trace_downstream("nope::x", 5, None)
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn fingerprint_depends_on_nodes_only() {
        let column = Symbol::synthetic("db::t.c").unwrap();
        let step = |via| LineageStep {
            symbol: column.clone(),
            via,
            confidence: None,
        };
        let a = LineagePath::finish(vec![step(None)], true, Vec::new());
        let b = LineagePath::finish(vec![step(Some(RefKind::MapsTo))], false, Vec::new());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
