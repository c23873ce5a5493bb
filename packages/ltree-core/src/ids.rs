#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier of a record owning a path. Backed by `i64` so it maps onto an SQL
/// primary key without conversion.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub i64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
