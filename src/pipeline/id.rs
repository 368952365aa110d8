//! Identity types for the runtime.
//!
//! Both IDs are newtypes over `u32` that serve as direct array indices into the
//! node and edge vectors of a loaded graph, providing O(1) lookup.

use std::fmt;

/// Index into a graph's node instances (declaration order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub const INVALID: NodeIndex = NodeIndex(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeIndex {
    fn from(value: usize) -> Self {
        NodeIndex(value as u32)
    }
}

impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeIndex(INVALID)")
        } else {
            write!(f, "NodeIndex({})", self.0)
        }
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into a graph definition's edge list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

impl EdgeId {
    pub const INVALID: EdgeId = EdgeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "EdgeId(INVALID)")
        } else {
            write!(f, "EdgeId({})", self.0)
        }
    }
}
