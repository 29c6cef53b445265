//! Interpreter compatibility masks.
//!
//! Each package-version carries a bitmask over [`INTERPRETER_VERSIONS`]:
//! bit `i` set means the version declared compatibility with entry `i`.
//! All-ones means the version never constrained its interpreter at all.
//! A consistent assignment must keep the running intersection nonzero.

use serde::{Deserialize, Serialize};

/// Ordered interpreter version strings; bit `i` of any mask corresponds to
/// entry `i` of this list.
pub const INTERPRETER_VERSIONS: [&str; 26] = [
    "2.0", "2.1", "2.2", "2.3", "2.4", "2.5", "2.6", "2.7", "3.0", "3.1", "3.2", "3.3", "3.4",
    "3.5", "3.6", "3.7", "3.8", "3.9", "3.10", "3.11", "3.12", "3.13", "3.14", "3.15", "3.16",
    "3.17",
];

/// Bitmask over [`INTERPRETER_VERSIONS`]; bit set = compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterpreterMask(u32);

impl InterpreterMask {
    /// Mask of a version that never constrained its interpreter.
    pub const UNCONSTRAINED: Self = Self(u32::MAX);

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no interpreter bit remains.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// True when at least one interpreter bit is shared with `other`.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Mask with only the bit for `INTERPRETER_VERSIONS[index]` set.
    ///
    /// Panics if `index` is out of range for the version list; callers pick
    /// indices from the list itself.
    #[must_use]
    pub fn single(index: usize) -> Self {
        assert!(
            index < INTERPRETER_VERSIONS.len(),
            "interpreter index {index} out of range"
        );
        Self(1 << index)
    }

    /// Version strings whose bit is set, in list order.
    #[must_use]
    pub fn versions(self) -> Vec<&'static str> {
        INTERPRETER_VERSIONS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl Default for InterpreterMask {
    fn default() -> Self {
        Self::UNCONSTRAINED
    }
}

impl std::fmt::Display for InterpreterMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
