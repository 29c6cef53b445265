//! Error surface of the retrodep workspace.
//!
//! Only genuinely fatal conditions live here. "No satisfying assignment
//! exists" and "round limit exhausted" are ordinary resolution outcomes and
//! are carried in the resolution result, never as errors.

use retrodep_types::{NameId, NodeId};
use thiserror::Error;

/// Fatal error raised by the graph context, the store, or the resolver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RetroError {
    /// A node id outside the preloaded arrays was referenced.
    #[error("node {node} is outside the preloaded graph")]
    MissingNode { node: NodeId },

    /// A name id outside the preloaded name table was referenced.
    #[error("name {name} is outside the preloaded graph")]
    MissingName { name: NameId },

    /// A chunk the headers promised is absent from the backing store.
    ///
    /// Chunks are atomically present or absent; a partial read is never
    /// surfaced as a shorter body.
    #[error("chunk body missing: src={src} dep={dep} chunk={chunk}")]
    MissingChunk {
        src: NodeId,
        dep: NameId,
        chunk: usize,
    },

    /// The backing store failed mid-read. The current resolve call aborts;
    /// the context remains usable for further calls.
    #[error("backing store failure: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Local file i/o failed (batch inputs and outputs).
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Preloaded data violated a shape invariant.
    #[error("corrupt graph data: {0}")]
    Corrupt(String),

    /// Invariant violation inside the resolver itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RetroError {
    #[must_use]
    pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(err))
    }

    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

pub type Result<T, E = RetroError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_offending_id() {
        let err = RetroError::MissingNode {
            node: NodeId::new(17),
        };
        assert_eq!(err.to_string(), "node 17 is outside the preloaded graph");
    }

    #[test]
    fn test_store_error_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection dropped");
        let err = RetroError::store(io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("backing store failure"));
    }
}
