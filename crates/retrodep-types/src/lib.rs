//! Shared vocabulary types for the retrodep workspace.
//!
//! Everything here is plain data: dense integer identifiers, upload
//! timestamps, interpreter compatibility masks, and the candidate /
//! requirement pair the resolver trades in. No I/O, no policy.

pub mod ids;
pub mod mask;
pub mod row;

pub use ids::{NameId, NodeId};
pub use mask::{InterpreterMask, INTERPRETER_VERSIONS};
pub use row::{DepsRow, HeaderRow, NodeRow};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch of a version's first upload.
///
/// Signed: the source data carries timestamps predating 1970 for a handful
/// of mangled uploads, and arithmetic on differences must not wrap.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Epoch(i64);

impl Epoch {
    #[inline]
    #[must_use]
    pub const fn new(seconds: i64) -> Self {
        Self(seconds)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One concrete package-version offered for (or pinned to) an identifier.
///
/// Upload time and interpreter mask are not carried here; they are read
/// from the preloaded per-node arrays via `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub node: NodeId,
    pub name: NameId,
}

impl Candidate {
    #[inline]
    #[must_use]
    pub const fn new(node: NodeId, name: NameId) -> Self {
        Self { node, name }
    }
}

/// A demand for some version of a package name.
///
/// `parent == None` marks the synthetic requirement that seeds a resolution
/// call; every requirement discovered during the search carries the
/// candidate that introduced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: NameId,
    pub parent: Option<Candidate>,
}

impl Requirement {
    /// The parentless requirement seeding a resolution call.
    #[inline]
    #[must_use]
    pub const fn root(name: NameId) -> Self {
        Self { name, parent: None }
    }

    /// A requirement introduced by pinning `parent`.
    #[inline]
    #[must_use]
    pub const fn from_parent(name: NameId, parent: Candidate) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ordering_and_max() {
        let older = Epoch::new(100);
        let newer = Epoch::new(200);
        assert!(older < newer);
        assert_eq!(older.max(newer), newer);
    }

    #[test]
    fn test_requirement_constructors() {
        let name = NameId::new(3);
        let root = Requirement::root(name);
        assert_eq!(root.parent, None);

        let parent = Candidate::new(NodeId::new(7), NameId::new(1));
        let derived = Requirement::from_parent(name, parent);
        assert_eq!(derived.parent, Some(parent));
        assert_eq!(derived.name, name);
    }
}
