//! In-memory symbol graph.
//!
//! Owns symbols and references with O(1) point lookups through four secondary
//! indexes (kind, lowercase name, file, lowercase qualified name) plus outgoing
//! and incoming adjacency. The graph is rebuilt from the store per invocation;
//! nothing shares a mutable instance.

use crate::model::{RefKey, RefKind, Reference, Symbol, SymbolKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Direction to traverse the symbol graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow incoming references (who depends on this)
    Upstream,
    /// Follow outgoing references (what this depends on)
    Downstream,
    /// Both of the above, reported separately
    #[default]
    Both,
}

impl From<&str> for Direction {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "upstream" | "up" | "in" | "dependents" => Direction::Upstream,
            "downstream" | "down" | "out" | "dependencies" => Direction::Downstream,
            _ => Direction::Both,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlastRadius {
    pub upstream: BTreeSet<String>,
    pub downstream: BTreeSet<String>,
}

impl BlastRadius {
    pub fn total(&self) -> usize {
        self.upstream.union(&self.downstream).count()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SymbolGraph {
    symbols: HashMap<String, Symbol>,
    references: Vec<Reference>,
    ref_keys: HashSet<RefKey>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
    by_kind: HashMap<SymbolKind, BTreeSet<String>>,
    by_name: HashMap<String, BTreeSet<String>>,
    by_file: HashMap<String, BTreeSet<String>>,
    by_qualified_name: HashMap<String, String>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by id. Last write wins.
    pub fn add_symbol(&mut self, symbol: Symbol) {
        if let Some(previous) = self.symbols.remove(&symbol.id) {
            self.unindex(&previous);
        }
        self.by_kind
            .entry(symbol.kind)
            .or_default()
            .insert(symbol.id.clone());
        self.by_name
            .entry(symbol.name.to_lowercase())
            .or_default()
            .insert(symbol.id.clone());
        self.by_file
            .entry(symbol.file_path.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.by_qualified_name
            .insert(symbol.qualified_name.to_lowercase(), symbol.id.clone());
        self.symbols.insert(symbol.id.clone(), symbol);
    }

    fn unindex(&mut self, symbol: &Symbol) {
        remove_from(&mut self.by_kind, &symbol.kind, &symbol.id);
        remove_from(&mut self.by_name, &symbol.name.to_lowercase(), &symbol.id);
        remove_from(&mut self.by_file, &symbol.file_path, &symbol.id);
        let qualified = symbol.qualified_name.to_lowercase();
        if self.by_qualified_name.get(&qualified) == Some(&symbol.id) {
            self.by_qualified_name.remove(&qualified);
        }
    }

    /// Insert unless the (source, target, kind) triple is already present.
    /// Returns whether the reference was added.
    pub fn add_reference(&mut self, reference: Reference) -> bool {
        if !self.ref_keys.insert(reference.key()) {
            return false;
        }
        let idx = self.references.len();
        self.outgoing
            .entry(reference.source_id.clone())
            .or_default()
            .push(idx);
        self.incoming
            .entry(reference.target_id.clone())
            .or_default()
            .push(idx);
        self.references.push(reference);
        true
    }

    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.symbols.contains_key(id)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Symbols ordered by id.
    pub fn symbols(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<&Symbol> = self.symbols.values().collect();
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        symbols
    }

    /// References in insertion order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn ids_by_kind(&self, kind: SymbolKind) -> Vec<&str> {
        collect_ids(self.by_kind.get(&kind))
    }

    pub fn ids_by_name(&self, name: &str) -> Vec<&str> {
        collect_ids(self.by_name.get(&name.to_lowercase()))
    }

    pub fn ids_in_file(&self, file_path: &str) -> Vec<&str> {
        collect_ids(self.by_file.get(file_path))
    }

    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.by_file.keys().map(String::as_str).collect();
        files.sort_unstable();
        files
    }

    pub fn find_by_qualified_name(&self, qualified_name: &str) -> Option<&Symbol> {
        self.by_qualified_name
            .get(&qualified_name.to_lowercase())
            .and_then(|id| self.symbols.get(id))
    }

    /// Outgoing references of `id`, optionally restricted to one kind. Unknown ids yield nothing.
    pub fn references_from(&self, id: &str, kind: Option<RefKind>) -> Vec<&Reference> {
        self.adjacent(&self.outgoing, id, kind)
    }

    /// Incoming references of `id`, optionally restricted to one kind. Unknown ids yield nothing.
    pub fn references_to(&self, id: &str, kind: Option<RefKind>) -> Vec<&Reference> {
        self.adjacent(&self.incoming, id, kind)
    }

    fn adjacent(
        &self,
        index: &HashMap<String, Vec<usize>>,
        id: &str,
        kind: Option<RefKind>,
    ) -> Vec<&Reference> {
        let Some(positions) = index.get(id) else {
            return Vec::new();
        };
        positions
            .iter()
            .map(|&idx| &self.references[idx])
            .filter(|reference| kind.is_none_or(|k| reference.kind == k))
            .collect()
    }

    /// Ids reachable over outgoing references within `max_depth` hops, excluding `id`.
    pub fn transitive_refs(
        &self,
        id: &str,
        kinds: Option<&[RefKind]>,
        max_depth: usize,
    ) -> BTreeSet<String> {
        self.walk(id, kinds, max_depth, Direction::Downstream)
    }

    /// Ids that reach `id` over references within `max_depth` hops, excluding `id`.
    pub fn transitive_refs_reverse(
        &self,
        id: &str,
        kinds: Option<&[RefKind]>,
        max_depth: usize,
    ) -> BTreeSet<String> {
        self.walk(id, kinds, max_depth, Direction::Upstream)
    }

    pub fn blast_radius(
        &self,
        id: &str,
        kinds: Option<&[RefKind]>,
        max_depth: usize,
        direction: Direction,
    ) -> BlastRadius {
        let mut radius = BlastRadius::default();
        if matches!(direction, Direction::Downstream | Direction::Both) {
            radius.downstream = self.transitive_refs(id, kinds, max_depth);
        }
        if matches!(direction, Direction::Upstream | Direction::Both) {
            radius.upstream = self.transitive_refs_reverse(id, kinds, max_depth);
        }
        radius
    }

    // Breadth-first with one visited set per call: each node is expanded at most
    // once even when several branches reach it.
    fn walk(
        &self,
        start: &str,
        kinds: Option<&[RefKind]>,
        max_depth: usize,
        direction: Direction,
    ) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        visited.insert(start);
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let edges = match direction {
                Direction::Upstream => self.incoming.get(current),
                _ => self.outgoing.get(current),
            };
            let Some(edges) = edges else {
                continue;
            };
            for &idx in edges {
                let reference = &self.references[idx];
                if kinds.is_some_and(|allowed| !allowed.contains(&reference.kind)) {
                    continue;
                }
                let next = match direction {
                    Direction::Upstream => reference.source_id.as_str(),
                    _ => reference.target_id.as_str(),
                };
                if visited.insert(next) {
                    reached.insert(next.to_string());
                    queue.push_back((next, depth + 1));
                }
            }
        }
        reached
    }
}

fn remove_from<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeSet<String>>,
    key: &K,
    id: &str,
) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn collect_ids(ids: Option<&BTreeSet<String>>) -> Vec<&str> {
    ids.map(|ids| ids.iter().map(String::as_str).collect())
        .unwrap_or_default()
}
