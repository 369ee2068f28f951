//! Extraction adapters and the two-pass build pipeline.
//!
//! Adapters turn file text into symbols; cross-file references are attached
//! only after every file has been parsed. The registry is an owned value
//! handed to the pipeline, so each caller (and each test) has its own set.

use crate::graph::SymbolGraph;
use crate::model::{Reference, Symbol};
use anyhow::Result;
use serde::Serialize;

pub trait Adapter: Send + Sync {
    /// Stable adapter name; registering a second adapter with the same name replaces the first.
    fn name(&self) -> &str;

    fn handles(&self, file_path: &str) -> bool;

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>>;

    /// Second pass: references between symbols already in `graph`.
    fn link(&self, _graph: &SymbolGraph) -> Result<Vec<Reference>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn Adapter>) -> &mut Self {
        match self.adapters.iter().position(|a| a.name() == adapter.name()) {
            Some(idx) => self.adapters[idx] = adapter,
            None => self.adapters.push(adapter),
        }
        self
    }

    /// First registered adapter that handles `file_path`.
    pub fn adapter_for(&self, file_path: &str) -> Option<&dyn Adapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.handles(file_path))
            .map(|adapter| adapter.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub files: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub symbols: usize,
    pub references: usize,
    pub link_failures: usize,
}

pub struct Pipeline<'a> {
    registry: &'a AdapterRegistry,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Parse every file, then run each participating adapter's link pass.
    /// One bad file or adapter is logged and counted; it never aborts the build.
    pub fn build(&self, files: &[SourceFile]) -> (SymbolGraph, PipelineStats) {
        let mut graph = SymbolGraph::new();
        let mut stats = PipelineStats {
            files: files.len(),
            ..Default::default()
        };
        let mut participating: Vec<&str> = Vec::new();

        for file in files {
            let Some(adapter) = self.registry.adapter_for(&file.path) else {
                tracing::debug!(path = %file.path, "no adapter for file");
                stats.skipped += 1;
                continue;
            };
            match adapter.parse(&file.content, &file.path) {
                Ok(symbols) => {
                    stats.parsed += 1;
                    for symbol in symbols {
                        graph.add_symbol(symbol);
                    }
                    if !participating.contains(&adapter.name()) {
                        participating.push(adapter.name());
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %file.path,
                        adapter = adapter.name(),
                        error = %err,
                        "failed to parse file"
                    );
                    stats.failed += 1;
                }
            }
        }

        for name in participating {
            let Some(adapter) = self.registry.adapters.iter().find(|a| a.name() == name) else {
                continue;
            };
            match adapter.link(&graph) {
                Ok(references) => {
                    for reference in references {
                        graph.add_reference(reference);
                    }
                }
                Err(err) => {
                    tracing::warn!(adapter = name, error = %err, "link pass failed");
                    stats.link_failures += 1;
                }
            }
        }

        stats.symbols = graph.symbol_count();
        stats.references = graph.reference_count();
        tracing::info!(
            files = stats.files,
            parsed = stats.parsed,
            skipped = stats.skipped,
            failed = stats.failed,
            "graph built"
        );
        (graph, stats)
    }
}
