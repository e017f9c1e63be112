//! Qudit handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A qudit as seen by the execution manager: its number of basis levels and
/// the identifier assigned by the manager's identity pool.
///
/// Two handles are equal iff both fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuditInfo {
    /// Dimensionality of the qudit (2 for a qubit).
    pub levels: usize,
    /// Pool-assigned identifier, unique among live qudits.
    pub id: usize,
}

impl QuditInfo {
    /// Create a new qudit handle.
    pub fn new(levels: usize, id: usize) -> Self {
        Self { levels, id }
    }

    /// Shorthand for a two-level qudit.
    pub fn qubit(id: usize) -> Self {
        Self { levels: 2, id }
    }

    /// True if this is a two-level qudit.
    #[inline]
    pub fn is_qubit(&self) -> bool {
        self.levels == 2
    }
}

impl fmt::Display for QuditInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_qubit() {
            write!(f, "q{}", self.id)
        } else {
            write!(f, "q{}<d{}>", self.id, self.levels)
        }
    }
}
