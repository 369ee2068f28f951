//! Serialized graph export for external caching and round trips.
//!
//! The document is a metadata block (counts, breakdowns, content digest), the
//! symbols array and the references array, with exactly the fields the store
//! persists. Symbol rows carry the derived `layer` and an explicit `label`,
//! null included, the same as the `symbols` table.

use crate::graph::SymbolGraph;
use crate::model::{Attributes, Layer, Reference, Symbol, SymbolKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportStats {
    pub by_kind: BTreeMap<String, usize>,
    pub by_layer: BTreeMap<String, usize>,
    pub by_ref_kind: BTreeMap<String, usize>,
    pub by_confidence: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: u32,
    pub symbol_count: usize,
    pub reference_count: usize,
    pub stats: ExportStats,
    /// blake3 over the canonical symbols and references arrays.
    pub digest: String,
}

/// One `symbols` row. `layer` is written for consumers and recomputed from `kind` on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSymbol {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub label: Option<String>,
    pub layer: Layer,
    #[serde(default)]
    pub attributes: Attributes,
}

impl From<Symbol> for ExportedSymbol {
    fn from(symbol: Symbol) -> Self {
        ExportedSymbol {
            layer: symbol.layer(),
            id: symbol.id,
            kind: symbol.kind,
            name: symbol.name,
            qualified_name: symbol.qualified_name,
            file_path: symbol.file_path,
            line_start: symbol.line_start,
            line_end: symbol.line_end,
            label: symbol.label,
            attributes: symbol.attributes,
        }
    }
}

impl From<ExportedSymbol> for Symbol {
    fn from(row: ExportedSymbol) -> Self {
        Symbol {
            id: row.id,
            kind: row.kind,
            name: row.name,
            qualified_name: row.qualified_name,
            file_path: row.file_path,
            line_start: row.line_start,
            line_end: row.line_end,
            attributes: row.attributes,
            label: row.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub metadata: ExportMetadata,
    pub symbols: Vec<ExportedSymbol>,
    pub references: Vec<Reference>,
}

pub fn export_graph(graph: &SymbolGraph) -> Result<GraphExport> {
    let symbols: Vec<ExportedSymbol> = graph
        .symbols()
        .into_iter()
        .cloned()
        .map(ExportedSymbol::from)
        .collect();
    let mut references: Vec<Reference> = graph.references().to_vec();
    references.sort_by(|a, b| {
        (&a.source_id, &a.target_id, a.kind).cmp(&(&b.source_id, &b.target_id, b.kind))
    });

    let mut stats = ExportStats::default();
    for symbol in &symbols {
        *stats.by_kind.entry(symbol.kind.to_string()).or_default() += 1;
        *stats.by_layer.entry(symbol.layer.to_string()).or_default() += 1;
    }
    for reference in &references {
        *stats.by_ref_kind.entry(reference.kind.to_string()).or_default() += 1;
        *stats
            .by_confidence
            .entry(reference.confidence.to_string())
            .or_default() += 1;
    }

    let digest = digest(&symbols, &references)?;
    Ok(GraphExport {
        metadata: ExportMetadata {
            version: EXPORT_VERSION,
            symbol_count: symbols.len(),
            reference_count: references.len(),
            stats,
            digest,
        },
        symbols,
        references,
    })
}

/// Rebuild a graph from an export. Duplicate ids and reference triples collapse
/// the same way they do on insert.
pub fn import_graph(export: GraphExport) -> Result<SymbolGraph> {
    if export.metadata.version > EXPORT_VERSION {
        anyhow::bail!(
            "export version {} is newer than supported version {}",
            export.metadata.version,
            EXPORT_VERSION
        );
    }
    let expected = digest(&export.symbols, &export.references)?;
    if expected != export.metadata.digest {
        tracing::warn!(
            expected = %export.metadata.digest,
            actual = %expected,
            "export digest mismatch, importing anyway"
        );
    }
    let mut graph = SymbolGraph::new();
    for row in export.symbols {
        if row.layer != row.kind.layer() {
            tracing::debug!(id = %row.id, "exported layer disagrees with kind, recomputing");
        }
        graph.add_symbol(Symbol::from(row));
    }
    for reference in export.references {
        graph.add_reference(reference);
    }
    Ok(graph)
}

pub fn write_json(export: &GraphExport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, export)
        .with_context(|| format!("write export to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn read_json(path: &Path) -> Result<GraphExport> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse export {}", path.display()))
}

fn digest(symbols: &[ExportedSymbol], references: &[Reference]) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(symbols)?);
    hasher.update(&serde_json::to_vec(references)?);
    Ok(hasher.finalize().to_hex().to_string())
}
