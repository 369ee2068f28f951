//! Typed engine errors.
//!
//! Most failures degrade locally to an empty or partial result. The variants
//! here are the ones a caller has to tell apart, so they travel inside
//! `anyhow::Error` and are recovered with `downcast_ref::<EngineError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The persistent store does not exist; the index has to be rebuilt.
    #[error("symbol store not found at {}; rebuild the index", path.display())]
    MissingStore { path: PathBuf },

    /// A kind/role tag that is not part of the closed vocabulary.
    #[error("unknown {category} kind: {kind}")]
    UnknownKind { category: &'static str, kind: String },
}

impl EngineError {
    pub fn is_missing_store(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingStore { .. })
        )
    }
}
