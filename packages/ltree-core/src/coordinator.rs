use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::path::{Path, PathCodec};
use crate::query::{Direction, NodeQuery, NodeRecord};
use crate::reparent::SubtreeReparentEngine;
use crate::shift::SiblingShiftEngine;
use crate::traits::PathStore;
use crate::tree::{assemble, TreeNode};

/// Where a node should land, relative to an already placed node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Last child of the given node.
    AppendTo(NodeId),
    /// First child of the given node.
    PrependTo(NodeId),
    /// Immediately before the given sibling.
    Before(NodeId),
    /// Immediately after the given sibling.
    After(NodeId),
    /// Last root.
    Root,
}

impl Placement {
    fn name(self) -> &'static str {
        match self {
            Placement::AppendTo(_) => "append",
            Placement::PrependTo(_) => "prepend",
            Placement::Before(_) => "before",
            Placement::After(_) => "after",
            Placement::Root => "make-root",
        }
    }
}

/// Target of one placement and whether a slot has to be opened for it.
struct Target {
    path: Path,
    open_slot: bool,
}

/// Facade running every structural mutation as one transaction over a [`PathStore`], plus
/// the read helpers built on the same path algebra.
pub struct MutationCoordinator<S: PathStore> {
    store: S,
    codec: PathCodec,
}

impl<S: PathStore> MutationCoordinator<S> {
    pub fn new(store: S, codec: PathCodec) -> Self {
        Self { store, codec }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Move or insert `node` as the last child of `parent`.
    pub fn append_to(&mut self, node: NodeId, parent: NodeId) -> Result<Path> {
        self.place(node, Placement::AppendTo(parent))
    }

    /// Move or insert `node` as the first child of `parent`.
    pub fn prepend_to(&mut self, node: NodeId, parent: NodeId) -> Result<Path> {
        self.place(node, Placement::PrependTo(parent))
    }

    pub fn insert_before(&mut self, node: NodeId, reference: NodeId) -> Result<Path> {
        self.place(node, Placement::Before(reference))
    }

    pub fn insert_after(&mut self, node: NodeId, reference: NodeId) -> Result<Path> {
        self.place(node, Placement::After(reference))
    }

    /// Move or insert `node` as the last root.
    pub fn make_root(&mut self, node: NodeId) -> Result<Path> {
        self.place(node, Placement::Root)
    }

    /// Place `node` and return its final path.
    pub fn place(&mut self, node: NodeId, placement: Placement) -> Result<Path> {
        let current = self.record(node)?;
        let Some(target) = self.target_for(&current, placement)? else {
            debug!(%node, op = placement.name(), "already in place");
            return Ok(current.path);
        };
        if target.path == current.path {
            debug!(%node, op = placement.name(), "already in place");
            return Ok(current.path);
        }
        if current.is_placed() && current.path.contains(&target.path) {
            return Err(Error::InvalidOperation(format!(
                "cannot move {node} from {} into its own subtree at {}",
                self.codec.encode(&current.path),
                self.codec.encode(&target.path)
            )));
        }

        let had_following = current.is_placed() && self.following_sibling(&current.path)?.is_some();
        debug!(
            %node,
            op = placement.name(),
            from = %self.codec.encode(&current.path),
            to = %self.codec.encode(&target.path),
            "placing node"
        );

        let codec = &self.codec;
        let result = self.store.with_transaction(|store| {
            let shifts = SiblingShiftEngine::new(codec);
            if target.open_slot {
                shifts
                    .open_slot(store, &target.path)
                    .map_err(|e| e.in_step("shift-up"))?;
            }

            // The shift may have moved the node itself.
            let moved = store
                .find_by_id(node)
                .map_err(|e| e.in_step("reload"))?
                .ok_or_else(|| Error::Storage(format!("reload: {node} vanished")))?;

            store
                .assign_path(node, &target.path)
                .map_err(|e| match e {
                    Error::Validation { reason, .. } => Error::Validation {
                        path: codec.encode(&target.path),
                        reason,
                    },
                    other => other.in_step("assign"),
                })?;

            if moved.is_placed() {
                SubtreeReparentEngine::new(codec)
                    .reparent(store, &moved.path, &target.path)
                    .map_err(|e| e.in_step("reparent"))?;
                if had_following {
                    shifts
                        .close_gap(store, &moved.path)
                        .map_err(|e| e.in_step("close-gap"))?;
                }
            }

            let placed = store
                .find_by_id(node)
                .map_err(|e| e.in_step("reload"))?
                .ok_or_else(|| Error::Storage(format!("reload: {node} vanished")))?;
            Ok(placed.path)
        });

        if let Err(e) = &result {
            warn!(%node, op = placement.name(), error = %e, "placement rolled back");
        }
        result
    }

    /// Remove `node` with its whole subtree and close the slot it leaves behind.
    /// Returns the number of removed records.
    pub fn delete(&mut self, node: NodeId) -> Result<u64> {
        let current = self.record(node)?;
        let had_following = current.is_placed() && self.following_sibling(&current.path)?.is_some();
        debug!(%node, path = %self.codec.encode(&current.path), "deleting subtree");

        let codec = &self.codec;
        let result = self.store.with_transaction(|store| {
            let expected = if current.is_placed() {
                1 + store
                    .count_descendants(&current.path)
                    .map_err(|e| e.in_step("delete"))?
            } else {
                1
            };
            let removed = store
                .delete_subtree(&current)
                .map_err(|e| e.in_step("delete"))?;
            if removed != expected {
                return Err(Error::Storage(format!(
                    "delete: removed {removed} rows, expected {expected}"
                )));
            }
            if had_following {
                SiblingShiftEngine::new(codec)
                    .close_gap(store, &current.path)
                    .map_err(|e| e.in_step("close-gap"))?;
            }
            Ok(removed)
        });

        if let Err(e) = &result {
            warn!(%node, error = %e, "delete rolled back");
        }
        result
    }

    /// Current path of `node`; empty when the node is not placed yet.
    pub fn path_of(&self, node: NodeId) -> Result<Path> {
        Ok(self.record(node)?.path)
    }

    /// 1 for roots, 0 for unplaced nodes.
    pub fn level(&self, node: NodeId) -> Result<usize> {
        Ok(self.path_of(node)?.level())
    }

    pub fn is_root(&self, node: NodeId) -> Result<bool> {
        Ok(self.level(node)? == 1)
    }

    /// Direct child of a root.
    pub fn is_first_level(&self, node: NodeId) -> Result<bool> {
        Ok(self.level(node)? == 2)
    }

    /// Descendants in path order; `depth == 0` returns the whole subtree.
    pub fn children(&self, node: NodeId, depth: usize) -> Result<Vec<NodeRecord>> {
        let record = self.record(node)?;
        if !record.is_placed() {
            return Ok(Vec::new());
        }
        self.store.find_children(&record.path, depth)
    }

    /// Ancestors, root first; `depth == 0` returns all of them.
    pub fn ancestors(&self, node: NodeId, depth: usize) -> Result<Vec<NodeRecord>> {
        let record = self.record(node)?;
        if !record.is_placed() {
            return Ok(Vec::new());
        }
        self.store.find_ancestors(&record.path, depth)
    }

    /// Following siblings, nearest first.
    pub fn next_siblings(&self, node: NodeId) -> Result<Vec<NodeRecord>> {
        self.siblings(node, Direction::After, None)
    }

    /// Preceding siblings, nearest first.
    pub fn previous_siblings(&self, node: NodeId) -> Result<Vec<NodeRecord>> {
        self.siblings(node, Direction::Before, None)
    }

    pub fn next_sibling(&self, node: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.siblings(node, Direction::After, Some(1))?.into_iter().next())
    }

    pub fn previous_sibling(&self, node: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.siblings(node, Direction::Before, Some(1))?.into_iter().next())
    }

    /// Every sibling except `node` itself, in path order.
    pub fn nearest(&self, node: NodeId) -> Result<Vec<NodeRecord>> {
        let record = self.record(node)?;
        if !record.is_placed() {
            return Ok(Vec::new());
        }
        let query = NodeQuery::new()
            .siblings(self.codec.sibling_pattern(&record.path))
            .not(record.path);
        self.store.query(&query)
    }

    /// Run `query` and nest the result.
    pub fn tree(&self, query: &NodeQuery) -> Result<Vec<TreeNode<NodeRecord>>> {
        Ok(assemble(self.store.query(query)?))
    }

    /// The subtree rooted at `node` (inclusive) as a nested tree.
    pub fn subtree(&self, node: NodeId) -> Result<Option<TreeNode<NodeRecord>>> {
        let record = self.record(node)?;
        if !record.is_placed() {
            return Ok(None);
        }
        let mut roots = self.tree(&NodeQuery::new().by_path(record.path, true))?;
        Ok(roots.pop())
    }

    fn siblings(
        &self,
        node: NodeId,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<NodeRecord>> {
        let record = self.record(node)?;
        if !record.is_placed() {
            return Ok(Vec::new());
        }
        let pattern = self.codec.sibling_pattern(&record.path);
        self.store
            .find_siblings_between(&pattern, &record.path, direction, limit)
    }

    fn following_sibling(&self, path: &Path) -> Result<Option<NodeRecord>> {
        let pattern = self.codec.sibling_pattern(path);
        Ok(self
            .store
            .find_siblings_between(&pattern, path, Direction::After, Some(1))?
            .into_iter()
            .next())
    }

    fn record(&self, node: NodeId) -> Result<NodeRecord> {
        self.store
            .find_by_id(node)?
            .ok_or_else(|| Error::InvalidOperation(format!("unknown node {node}")))
    }

    /// A reference node must exist and be placed.
    fn hit(&self, reference: NodeId) -> Result<NodeRecord> {
        match self.store.find_by_id(reference)? {
            Some(record) if record.is_placed() => Ok(record),
            Some(_) => Err(Error::HitTargetMissing(format!("{reference} is not placed"))),
            None => Err(Error::HitTargetMissing(format!("{reference} does not exist"))),
        }
    }

    /// `None` means the node already sits where the placement would put it.
    fn target_for(&self, current: &NodeRecord, placement: Placement) -> Result<Option<Target>> {
        let target = match placement {
            Placement::AppendTo(parent) => {
                let parent = self.hit(parent)?;
                match self.store.last_child(&parent.path)? {
                    Some(last) if last.id == current.id => return Ok(None),
                    Some(last) => Target {
                        path: self.codec.next_sibling(&last.path)?,
                        open_slot: false,
                    },
                    None => Target {
                        path: self.codec.child_slot(&parent.path, 1)?,
                        open_slot: false,
                    },
                }
            }
            Placement::PrependTo(parent) => {
                let parent = self.hit(parent)?;
                Target {
                    path: self.codec.child_slot(&parent.path, 1)?,
                    open_slot: true,
                }
            }
            Placement::Before(reference) => {
                let reference = self.hit(reference)?;
                if reference.id == current.id || self.immediately_precedes(current, &reference) {
                    return Ok(None);
                }
                Target {
                    path: reference.path,
                    open_slot: true,
                }
            }
            Placement::After(reference) => {
                let reference = self.hit(reference)?;
                if reference.id == current.id {
                    return Ok(None);
                }
                Target {
                    path: self.codec.next_sibling(&reference.path)?,
                    open_slot: true,
                }
            }
            Placement::Root => match self.store.last_child(&Path::empty())? {
                Some(last) if last.id == current.id => return Ok(None),
                Some(last) => Target {
                    path: self.codec.next_sibling(&last.path)?,
                    open_slot: false,
                },
                None => Target {
                    path: self.codec.child_slot(&Path::empty(), 1)?,
                    open_slot: false,
                },
            },
        };
        self.codec.check(&target.path)?;
        Ok(Some(target))
    }

    fn immediately_precedes(&self, current: &NodeRecord, reference: &NodeRecord) -> bool {
        current.is_placed()
            && current.path.is_sibling_of(&reference.path)
            && current.path.last_octant().map(|o| o + 1) == reference.path.last_octant()
    }
}
