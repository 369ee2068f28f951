//! Read seam shared by the in-memory graph and the persistent store.
//!
//! Lineage tracing only needs point lookups and adjacency, so it runs against
//! either backend through this trait.

use crate::graph::SymbolGraph;
use crate::model::{RefKind, Reference, Symbol};
use anyhow::Result;

pub trait GraphSource {
    /// Symbol by id, or a synthetic snapshot for reserved-prefix ids.
    fn symbol(&self, id: &str) -> Result<Option<Symbol>>;

    /// Outgoing references, restricted to `kinds` when given.
    fn outgoing(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>>;

    /// Incoming references, restricted to `kinds` when given.
    fn incoming(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>>;
}

impl GraphSource for SymbolGraph {
    fn symbol(&self, id: &str) -> Result<Option<Symbol>> {
        Ok(SymbolGraph::symbol(self, id)
            .cloned()
            .or_else(|| Symbol::synthetic(id)))
    }

    fn outgoing(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        Ok(filter_kinds(self.references_from(id, None), kinds))
    }

    fn incoming(&self, id: &str, kinds: Option<&[RefKind]>) -> Result<Vec<Reference>> {
        Ok(filter_kinds(self.references_to(id, None), kinds))
    }
}

fn filter_kinds(references: Vec<&Reference>, kinds: Option<&[RefKind]>) -> Vec<Reference> {
    references
        .into_iter()
        .filter(|reference| kinds.is_none_or(|allowed| allowed.contains(&reference.kind)))
        .cloned()
        .collect()
}
