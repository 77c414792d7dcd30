//! Graph engine error taxonomy.
//!
//! Every error renders as `GraphError: <kind phrase> (<detail>)`. The
//! kinds mirror the write pipeline's failure modes: invalid input data,
//! storage access failures split by direction, flush/rollback failures
//! (fatal to the enclosing transaction), index failures (non-fatal, the
//! data store stays consistent), and aggregated rule failures.

use thiserror::Error;

/// Result alias used throughout the graph engine.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised by the graph engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed input: bad charset, missing reserved attributes,
    /// mistyped endpoint attributes, or a dangling edge endpoint.
    #[error("GraphError: Invalid data ({0})")]
    InvalidData(String),

    /// A storage component could not be accessed or constructed.
    #[error("GraphError: Failed to access graph storage component ({0})")]
    AccessComponent(String),

    /// A storage call failed on a read path.
    #[error("GraphError: Could not read graph information ({0})")]
    Reading(String),

    /// A storage call failed on a write path.
    #[error("GraphError: Could not write graph information ({0})")]
    Writing(String),

    /// Pending changes could not be persisted. Fatal: the engine cannot
    /// recover without risking corruption.
    #[error("GraphError: Failed to flush changes ({0})")]
    Flushing(String),

    /// Rollback itself failed. Fatal for the same reason.
    #[error("GraphError: Failed to rollback changes ({0})")]
    Rollback(String),

    /// An index mutation failed. The content store is consistent; an
    /// index entry may be missing.
    #[error("GraphError: Index error ({0})")]
    Index(String),

    /// One or more rule handlers failed; details are joined with `;`.
    #[error("GraphError: Graph rule error ({0})")]
    Rule(String),
}

impl GraphError {
    /// Wraps a storage failure on a read path.
    pub fn reading(err: impl std::fmt::Display) -> Self {
        GraphError::Reading(err.to_string())
    }

    /// Wraps a storage failure on a write path.
    pub fn writing(err: impl std::fmt::Display) -> Self {
        GraphError::Writing(err.to_string())
    }

    /// Wraps a storage component access failure.
    pub fn access(err: impl std::fmt::Display) -> Self {
        GraphError::AccessComponent(err.to_string())
    }

    /// Wraps an index mutation or lookup failure.
    pub fn index(err: impl std::fmt::Display) -> Self {
        GraphError::Index(err.to_string())
    }
}
