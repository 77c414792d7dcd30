//! Error type shared by all storage backends and the hash-trie.

use thiserror::Error;

/// Storage operation that a fault was injected for.
///
/// Used by the in-memory backend's fault-injection table (tests only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessOp {
    /// Direct record read.
    Fetch,
    /// Cache-only record read.
    FetchCached,
    /// In-place record update.
    Update,
    /// Record deallocation.
    Free,
}

impl std::fmt::Display for AccessOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessOp::Fetch => write!(f, "fetch"),
            AccessOp::FetchCached => write!(f, "fetch-cached"),
            AccessOp::Update => write!(f, "update"),
            AccessOp::Free => write!(f, "free"),
        }
    }
}

/// Errors surfaced by [`StorageManager`](crate::storage::StorageManager)
/// implementations and by the hash-trie built on top of them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist in the manager.
    #[error("record {location} not found in storage manager {manager}")]
    NotFound {
        /// Name of the storage manager.
        manager: String,
        /// Location that was requested.
        location: u64,
    },

    /// A fault-injection entry fired (in-memory backend, tests only).
    #[error("injected {op} fault at record {location}")]
    Injected {
        /// Operation the fault was registered for.
        op: AccessOp,
        /// Location the fault was registered for.
        location: u64,
    },

    /// The persistence backend reported an error.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted record could not be encoded or decoded.
    #[error("record encoding error: {0}")]
    Codec(String),
}

impl StorageError {
    /// Wraps a backend error, preserving only its message.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StorageError::Backend(err.to_string())
    }

    /// Wraps a codec error, preserving only its message.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        StorageError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = StorageError::NotFound {
            manager: "main".to_string(),
            location: 42,
        };
        assert_eq!(
            err.to_string(),
            "record 42 not found in storage manager main"
        );

        let err = StorageError::Injected {
            op: AccessOp::Fetch,
            location: 7,
        };
        assert_eq!(err.to_string(), "injected fetch fault at record 7");
    }

    #[test]
    fn wrappers_preserve_messages() {
        assert_eq!(
            StorageError::backend("disk full").to_string(),
            "storage backend error: disk full"
        );
        assert_eq!(
            StorageError::codec("truncated input").to_string(),
            "record encoding error: truncated input"
        );
    }
}
