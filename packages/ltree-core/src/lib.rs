#![forbid(unsafe_code)]
//! Materialized-path tree index.
//! Every node's position is encoded in a sortable, fixed-width label, so ancestor, descendant
//! and sibling lookups become prefix and range predicates. This crate holds the path algebra,
//! the shift/reparent mutation protocol and tree assembly; storage engines plug in through
//! [`PathStore`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod path;
pub mod query;
pub mod reparent;
pub mod shift;
pub mod traits;
pub mod tree;

pub use config::PathConfig;
pub use coordinator::{MutationCoordinator, Placement};
pub use error::{Error, Result};
pub use ids::NodeId;
pub use path::{Path, PathCodec, SiblingPattern};
pub use query::{Direction, NodeQuery, NodeRecord, QueryModifier, SortOrder};
pub use reparent::{ReparentPlan, SubtreeReparentEngine};
pub use shift::{ShiftDelta, ShiftPlan, SiblingShiftEngine};
pub use traits::{MemoryPathStore, PathStore};
pub use tree::{assemble, PathBearing, TreeNode};
