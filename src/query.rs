//! Store-backed queries: bidirectional reference lookup, dependent blast
//! radius grouped by depth, and category aggregation.

use crate::config::Config;
use crate::db::Db;
use crate::model::{Confidence, Layer, RefKind, Reference, Symbol, SymbolSummary};
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceEntry {
    /// The symbol at the other end of the reference.
    pub symbol: Symbol,
    pub kind: RefKind,
    pub confidence: Confidence,
    pub direction: RefDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SymbolReferences {
    pub id: String,
    pub outgoing: Vec<ReferenceEntry>,
    pub incoming: Vec<ReferenceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependentsReport {
    pub id: String,
    pub max_depth: usize,
    pub total_affected: usize,
    pub by_depth: BTreeMap<usize, Vec<SymbolSummary>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub symbol_count: i64,
    pub files: usize,
    pub by_layer: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coupling {
    pub from: String,
    pub to: String,
    pub references: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryReport {
    pub categories: Vec<CategorySummary>,
    pub by_layer: BTreeMap<String, i64>,
    pub coupling: Vec<Coupling>,
}

pub struct QueryEngine<'a> {
    db: &'a Db,
    coupling_threshold: usize,
    category_depth: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self::with_config(db, Config::get())
    }

    pub fn with_config(db: &'a Db, config: &Config) -> Self {
        Self {
            db,
            coupling_threshold: config.coupling_threshold,
            category_depth: config.category_depth.max(1),
        }
    }

    /// Outgoing and incoming references of `id`, each with the symbol on the
    /// other end. References whose far end cannot be resolved are left out.
    pub fn find_references(&self, id: &str) -> Result<SymbolReferences> {
        let outgoing = self.db.references_from(id, None)?;
        let incoming = self.db.references_to(id, None)?;

        let mut ids: Vec<String> = outgoing
            .iter()
            .map(|r| r.target_id.clone())
            .chain(incoming.iter().map(|r| r.source_id.clone()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        let resolved = self.materialize(&ids)?;

        let entries = |references: Vec<Reference>, direction: RefDirection| {
            references
                .into_iter()
                .filter_map(|reference| {
                    let other = match direction {
                        RefDirection::Outgoing => &reference.target_id,
                        RefDirection::Incoming => &reference.source_id,
                    };
                    let Some(symbol) = resolved.get(other) else {
                        tracing::debug!(id = %other, "unresolved reference end");
                        return None;
                    };
                    Some(ReferenceEntry {
                        symbol: symbol.clone(),
                        kind: reference.kind,
                        confidence: reference.confidence,
                        direction,
                    })
                })
                .collect::<Vec<_>>()
        };

        Ok(SymbolReferences {
            id: id.to_string(),
            outgoing: entries(outgoing, RefDirection::Outgoing),
            incoming: entries(incoming, RefDirection::Incoming),
        })
    }

    /// Dependents of `id` (breadth-first over incoming references), grouped by
    /// the depth at which each was first reached. One visited set per call.
    pub fn blast_radius(&self, id: &str, max_depth: usize) -> Result<DependentsReport> {
        let mut report = DependentsReport {
            id: id.to_string(),
            max_depth,
            ..Default::default()
        };
        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut frontier = vec![id.to_string()];

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }
            let next: BTreeSet<String> = self
                .db
                .references_to_any(&frontier)?
                .into_iter()
                .map(|reference| reference.source_id)
                .filter(|source| !visited.contains(source))
                .collect();
            if next.is_empty() {
                break;
            }
            visited.extend(next.iter().cloned());
            frontier = next.into_iter().collect();

            let resolved = self.materialize(&frontier)?;
            let level: Vec<SymbolSummary> = frontier
                .iter()
                .filter_map(|dependent| resolved.get(dependent))
                .map(SymbolSummary::from)
                .collect();
            if !level.is_empty() {
                report.total_affected += level.len();
                report.by_depth.insert(depth, level);
            }
        }

        Ok(report)
    }

    /// Symbol counts per directory category and per layer, plus category pairs
    /// whose cross references reach the coupling threshold.
    pub fn categories(&self) -> Result<CategoryReport> {
        let mut report = CategoryReport::default();
        let mut categories: BTreeMap<String, CategorySummary> = BTreeMap::new();
        let mut files: HashMap<String, BTreeSet<String>> = HashMap::new();

        for (file, layer, count) in self.db.file_layer_counts()? {
            let name = category_of(&file, self.category_depth);
            let summary = categories
                .entry(name.clone())
                .or_insert_with(|| CategorySummary {
                    name: name.clone(),
                    ..Default::default()
                });
            summary.symbol_count += count;
            *summary
                .by_layer
                .entry(layer.as_str().to_string())
                .or_default() += count;
            *report
                .by_layer
                .entry(layer.as_str().to_string())
                .or_default() += count;
            files.entry(name).or_default().insert(file);
        }
        for (name, summary) in categories.iter_mut() {
            summary.files = files.get(name).map_or(0, BTreeSet::len);
        }
        for layer in Layer::ALL {
            report.by_layer.entry(layer.as_str().to_string()).or_default();
        }

        let mut pairs: BTreeMap<(String, String), i64> = BTreeMap::new();
        for (source_file, target_file, count) in self.db.reference_file_pairs()? {
            let from = category_of(&source_file, self.category_depth);
            let to = category_of(&target_file, self.category_depth);
            if from != to {
                *pairs.entry((from, to)).or_default() += count;
            }
        }
        let threshold = self.coupling_threshold as i64;
        report.coupling = pairs
            .into_iter()
            .filter(|(_, references)| *references >= threshold)
            .map(|((from, to), references)| Coupling {
                from,
                to,
                references,
            })
            .collect();
        report
            .coupling
            .sort_by(|a, b| b.references.cmp(&a.references));

        report.categories = categories.into_values().collect();
        Ok(report)
    }

    // Stored symbols for `ids`, with synthetic snapshots for reserved-prefix ids.
    fn materialize(&self, ids: &[String]) -> Result<HashMap<String, Symbol>> {
        let mut resolved: HashMap<String, Symbol> = self
            .db
            .symbols_by_ids(ids)?
            .into_iter()
            .map(|symbol| (symbol.id.clone(), symbol))
            .collect();
        for id in ids {
            if !resolved.contains_key(id) {
                if let Some(symbol) = Symbol::synthetic(id) {
                    resolved.insert(id.clone(), symbol);
                }
            }
        }
        Ok(resolved)
    }
}

/// First `depth` directory components of `file_path`; root-level files map to `.`.
pub fn category_of(file_path: &str, depth: usize) -> String {
    let mut components: Vec<&str> = file_path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    components.pop();
    if components.is_empty() {
        return ".".to_string();
    }
    components.truncate(depth.max(1));
    components.join("/")
}
