//! Change-impact planning for a single symbol.
//!
//! A plan lists who references the target directly, who would break
//! (upstream), what the target itself depends on (downstream, context only),
//! and classifies the change with a fixed risk model. Nothing here touches
//! source files; text edits come from a [`PatchGenerator`].

use crate::graph::SymbolGraph;
use crate::model::{Confidence, Symbol, SymbolSummary};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reason recorded when a rename or removal targets a symbol nothing in the index references.
pub const NO_INTERNAL_REFS: &str = "no_internal_refs";

/// Policy: a rename of a symbol with no internal references is HIGH risk,
/// because whatever consumes it lives outside the indexed tree.
pub const ORPHAN_RENAME_IS_HIGH_RISK: bool = true;

/// More upstream references than this makes a rename HIGH risk.
pub const HIGH_RISK_REFS: usize = 10;
/// More affected files than this makes a rename HIGH risk.
pub const HIGH_RISK_FILES: usize = 6;

pub const REASON_REMOVAL: &str = "removal_breaks_consumers";
pub const REASON_ADDITIVE: &str = "additive_change";
pub const REASON_MANY_REFS: &str = "many_upstream_refs";
pub const REASON_MANY_FILES: &str = "many_files";
pub const REASON_HAS_REFS: &str = "has_upstream_refs";
pub const REASON_MULTIPLE_FILES: &str = "multiple_files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddField,
    RenameField,
    RemoveField,
    Modify,
}

impl ChangeKind {
    pub fn parse(raw: &str) -> Option<ChangeKind> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "add_field" | "add" => Some(ChangeKind::AddField),
            "rename_field" | "rename" => Some(ChangeKind::RenameField),
            "remove_field" | "remove" | "delete" => Some(ChangeKind::RemoveField),
            "modify" | "generic_modify" | "change" => Some(ChangeKind::Modify),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationPlan {
    pub target: Symbol,
    pub change: ChangeKind,
    pub direct: Vec<SymbolSummary>,
    pub upstream: Vec<SymbolSummary>,
    pub downstream: Vec<SymbolSummary>,
    pub files_affected: BTreeSet<String>,
    pub risk: Risk,
    pub reasons: Vec<String>,
    pub breaking: bool,
    pub confidence: Confidence,
    /// Impacted symbols living in test files. Reported only; not part of the risk model.
    pub test_coverage: usize,
}

impl PropagationPlan {
    pub fn impacted_ids(&self) -> BTreeSet<&str> {
        self.direct
            .iter()
            .chain(&self.upstream)
            .chain(&self.downstream)
            .map(|s| s.id.as_str())
            .collect()
    }
}

/// Field-level description of the change handed to a patch generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub field_type: Option<String>,
}

/// A localized replacement of lines `line_start..=line_end` in `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub file: String,
    pub line_start: i64,
    pub line_end: i64,
    pub replacement: String,
}

/// Renders language-specific edits for a plan. The engine never applies them.
pub trait PatchGenerator {
    fn name(&self) -> &str;

    fn generate(&self, plan: &PropagationPlan, change: &FieldChange) -> Result<Vec<TextEdit>>;
}

pub struct Planner<'a> {
    graph: &'a SymbolGraph,
}

impl<'a> Planner<'a> {
    pub fn new(graph: &'a SymbolGraph) -> Self {
        Self { graph }
    }

    /// `None` when `id` is not in the graph.
    pub fn plan(&self, id: &str, change: ChangeKind, max_depth: usize) -> Option<PropagationPlan> {
        let target = self.graph.symbol(id)?.clone();

        let direct_ids: BTreeSet<String> = self
            .graph
            .references_from(id, None)
            .into_iter()
            .map(|r| r.target_id.clone())
            .chain(
                self.graph
                    .references_to(id, None)
                    .into_iter()
                    .map(|r| r.source_id.clone()),
            )
            .filter(|other| other != id)
            .collect();
        let upstream_ids = self.graph.transitive_refs_reverse(id, None, max_depth);
        let downstream_ids = self.graph.transitive_refs(id, None, max_depth);

        let direct = self.summaries(&direct_ids);
        let upstream = self.summaries(&upstream_ids);
        let downstream = self.summaries(&downstream_ids);

        let impacted: Vec<&SymbolSummary> =
            direct.iter().chain(&upstream).chain(&downstream).collect();
        let files_affected: BTreeSet<String> = impacted
            .iter()
            .filter(|s| !s.file_path.is_empty())
            .map(|s| s.file_path.clone())
            .collect();
        let mut counted: BTreeSet<&str> = BTreeSet::new();
        let test_coverage = impacted
            .iter()
            .filter(|s| counted.insert(s.id.as_str()) && is_test_file(&s.file_path))
            .count();
        let confidence = match (counted.is_empty(), files_affected.is_empty()) {
            (false, false) => Confidence::High,
            (false, true) => Confidence::Medium,
            _ => Confidence::Low,
        };

        let (risk, reasons) = assess(change, upstream.len(), files_affected.len());
        let breaking = match change {
            ChangeKind::RemoveField => true,
            ChangeKind::RenameField => !upstream.is_empty(),
            ChangeKind::AddField | ChangeKind::Modify => false,
        };

        tracing::debug!(
            id,
            ?change,
            ?risk,
            upstream = upstream.len(),
            files = files_affected.len(),
            "propagation planned"
        );

        Some(PropagationPlan {
            target,
            change,
            direct,
            upstream,
            downstream,
            files_affected,
            risk,
            reasons,
            breaking,
            confidence,
            test_coverage,
        })
    }

    fn summaries(&self, ids: &BTreeSet<String>) -> Vec<SymbolSummary> {
        ids.iter()
            .filter_map(|id| {
                self.graph
                    .symbol(id)
                    .map(SymbolSummary::from)
                    .or_else(|| Symbol::synthetic(id).map(SymbolSummary::from))
            })
            .collect()
    }
}

/// Deterministic risk classification from upstream reference and file counts.
pub fn assess(change: ChangeKind, upstream_refs: usize, files: usize) -> (Risk, Vec<String>) {
    match change {
        ChangeKind::AddField => (Risk::Low, vec![REASON_ADDITIVE.to_string()]),
        ChangeKind::RemoveField => {
            let mut reasons = vec![REASON_REMOVAL.to_string()];
            if upstream_refs == 0 {
                reasons.push(NO_INTERNAL_REFS.to_string());
            }
            (Risk::High, reasons)
        }
        ChangeKind::RenameField if upstream_refs == 0 && ORPHAN_RENAME_IS_HIGH_RISK => {
            (Risk::High, vec![NO_INTERNAL_REFS.to_string()])
        }
        ChangeKind::RenameField | ChangeKind::Modify => scaled(upstream_refs, files),
    }
}

fn scaled(upstream_refs: usize, files: usize) -> (Risk, Vec<String>) {
    let mut reasons = Vec::new();
    if upstream_refs > HIGH_RISK_REFS {
        reasons.push(REASON_MANY_REFS.to_string());
    }
    if files > HIGH_RISK_FILES {
        reasons.push(REASON_MANY_FILES.to_string());
    }
    if !reasons.is_empty() {
        return (Risk::High, reasons);
    }
    if upstream_refs > 0 {
        reasons.push(REASON_HAS_REFS.to_string());
    }
    if files > 1 {
        reasons.push(REASON_MULTIPLE_FILES.to_string());
    }
    if reasons.is_empty() {
        (Risk::Low, reasons)
    } else {
        (Risk::Medium, reasons)
    }
}

/// Check if a file path appears to be a test file
pub fn is_test_file(path: &str) -> bool {
    let path_lower = path.to_lowercase();
    let file_name = path_lower.rsplit(['/', '\\']).next().unwrap_or("");
    path_lower.starts_with("test/")
        || path_lower.starts_with("tests/")
        || path_lower.starts_with("spec/")
        || path_lower.contains("/test/")
        || path_lower.contains("/tests/")
        || path_lower.contains("/__tests__/")
        || path_lower.contains("/spec/")
        || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
        || file_name.ends_with("_spec.rb")
        || file_name.ends_with("test.java")
}
