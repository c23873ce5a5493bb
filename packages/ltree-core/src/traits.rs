use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::path::{Path, SiblingPattern};
use crate::query::{Direction, NodeQuery, NodeRecord, SortOrder};
use crate::reparent::ReparentPlan;
use crate::shift::ShiftPlan;

/// Capabilities the core needs from a record store holding one path column.
///
/// Implementations must apply [`ShiftPlan`]s in the plan's order (or set-based with deferred
/// uniqueness) and must roll back everything done inside a failed `with_transaction`.
pub trait PathStore {
    /// Evaluate a composed query over placed records.
    fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>>;

    /// Number of records the query's filters accept (ordering and limits ignored).
    fn count(&self, query: &NodeQuery) -> Result<u64>;

    /// Placed or unplaced record by id; unplaced records carry the empty path.
    fn find_by_id(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    /// Apply a sibling shift. Returns the number of rows rewritten.
    fn bulk_shift(&mut self, plan: &ShiftPlan) -> Result<u64>;

    /// Apply a subtree prefix rewrite. Returns the number of rows rewritten.
    fn bulk_reparent(&mut self, plan: &ReparentPlan) -> Result<u64>;

    /// Store `path` on record `id`; fails with [`Error::Validation`] if the store rejects it.
    fn assign_path(&mut self, id: NodeId, path: &Path) -> Result<()>;

    /// Remove `node` and, when placed, every record under its path.
    fn delete_subtree(&mut self, node: &NodeRecord) -> Result<u64>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Run `f` atomically: commit on `Ok`, roll back on `Err` (or on a failed commit).
    fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin().map_err(|e| e.in_step("begin"))?;
        match f(self) {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(e) => {
                    let _ = self.rollback();
                    Err(e.in_step("commit"))
                }
            },
            Err(e) => {
                let _ = self.rollback();
                Err(e)
            }
        }
    }

    fn find_by_path(&self, path: &Path) -> Result<Option<NodeRecord>> {
        Ok(self
            .query(&NodeQuery::new().by_path(path.clone(), false).limit(1))?
            .into_iter()
            .next())
    }

    /// Descendants of `parent` in path order; `depth == 0` means the whole subtree, otherwise
    /// only `depth` levels below `parent`. The empty parent selects the whole forest.
    fn find_children(&self, parent: &Path, depth: usize) -> Result<Vec<NodeRecord>> {
        let mut query = NodeQuery::new()
            .by_path(parent.clone(), true)
            .not(parent.clone())
            .sorted(SortOrder::Asc);
        if depth > 0 {
            query = query.end_level(parent.level() + depth);
        }
        self.query(&query)
    }

    /// Ancestors of `path`, root first; `depth > 0` keeps only the nearest `depth` of them.
    fn find_ancestors(&self, path: &Path, depth: usize) -> Result<Vec<NodeRecord>> {
        let mut query = NodeQuery::new()
            .ancestors_of(path.clone())
            .not(path.clone())
            .sorted(SortOrder::Asc);
        if depth > 0 {
            query = query.start_level(path.level().saturating_sub(depth).max(1));
        }
        self.query(&query)
    }

    /// Members of `pattern` strictly after/before `from`, nearest first.
    fn find_siblings_between(
        &self,
        pattern: &SiblingPattern,
        from: &Path,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<Vec<NodeRecord>> {
        let mut query = NodeQuery::new().siblings(pattern.clone());
        query = match direction {
            Direction::After => query.after(from.clone()).sorted(SortOrder::Asc),
            Direction::Before => query.before(from.clone()).sorted(SortOrder::Desc),
        };
        if let Some(n) = limit {
            query = query.limit(n);
        }
        self.query(&query)
    }

    /// Last direct child of `parent`; with the empty parent, the last root.
    fn last_child(&self, parent: &Path) -> Result<Option<NodeRecord>> {
        let query = NodeQuery::new()
            .siblings(SiblingPattern::new(parent.clone()))
            .sorted(SortOrder::Desc)
            .limit(1);
        Ok(self.query(&query)?.into_iter().next())
    }

    fn count_descendants(&self, path: &Path) -> Result<u64> {
        self.count(&NodeQuery::new().by_path(path.clone(), true).not(path.clone()))
    }
}

type Tables = (BTreeMap<Path, NodeId>, HashMap<NodeId, Path>);

/// In-memory store keyed both ways. Shift plans are applied row by row in the plan's order,
/// and any row landing on an occupied path fails the statement. Transactions nest; each
/// `begin` saves a copy of both tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryPathStore {
    by_path: BTreeMap<Path, NodeId>,
    by_id: HashMap<NodeId, Path>,
    saved: Vec<Tables>,
}

impl MemoryPathStore {
    /// Register a record that has no path yet.
    pub fn insert_unplaced(&mut self, id: NodeId) -> Result<()> {
        if self.by_id.contains_key(&id) {
            return Err(Error::Storage(format!("duplicate id {id}")));
        }
        self.by_id.insert(id, Path::empty());
        Ok(())
    }

    /// Register a record at `path` without any sibling bookkeeping.
    pub fn insert_placed(&mut self, id: NodeId, path: Path) -> Result<()> {
        self.insert_unplaced(id)?;
        self.assign_path(id, &path)
    }

    pub fn path_of(&self, id: NodeId) -> Option<Path> {
        self.by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every record sorted by id, unplaced ones included.
    pub fn snapshot(&self) -> Vec<(NodeId, Path)> {
        let mut rows: Vec<_> = self.by_id.iter().map(|(id, p)| (*id, p.clone())).collect();
        rows.sort();
        rows
    }

    fn rename_rows(&mut self, rows: Vec<(Path, NodeId)>, rewrite: impl Fn(&Path) -> Path) -> Result<u64> {
        let mut count = 0u64;
        for (old, id) in rows {
            let new = rewrite(&old);
            if let Some(holder) = self.by_path.get(&new) {
                if *holder != id {
                    return Err(Error::Storage(format!(
                        "duplicate path {new:?}: held by {holder} while moving {id}"
                    )));
                }
            }
            self.by_path.remove(&old);
            self.by_path.insert(new.clone(), id);
            self.by_id.insert(id, new);
            count += 1;
        }
        Ok(count)
    }
}

impl PathStore for MemoryPathStore {
    fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>> {
        Ok(query.evaluate(self.by_path.iter()))
    }

    fn count(&self, query: &NodeQuery) -> Result<u64> {
        Ok(self.by_path.keys().filter(|p| query.accepts(p)).count() as u64)
    }

    fn find_by_id(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        Ok(self.by_id.get(&id).map(|path| NodeRecord::new(id, path.clone())))
    }

    fn bulk_shift(&mut self, plan: &ShiftPlan) -> Result<u64> {
        let mut rows: Vec<(Path, NodeId)> = self
            .by_path
            .iter()
            .filter(|(path, _)| plan.covers(path))
            .map(|(path, id)| (path.clone(), *id))
            .collect();
        if plan.order() == SortOrder::Desc {
            rows.reverse();
        }
        self.rename_rows(rows, |path| plan.rewrite(path))
    }

    fn bulk_reparent(&mut self, plan: &ReparentPlan) -> Result<u64> {
        let rows: Vec<(Path, NodeId)> = self
            .by_path
            .range(plan.old_prefix().clone()..)
            .take_while(|(path, _)| plan.old_prefix().contains(path))
            .filter(|(path, _)| plan.covers(path))
            .map(|(path, id)| (path.clone(), *id))
            .collect();
        self.rename_rows(rows, |path| plan.rewrite(path))
    }

    fn assign_path(&mut self, id: NodeId, path: &Path) -> Result<()> {
        let Some(current) = self.by_id.get(&id).cloned() else {
            return Err(Error::Storage(format!("unknown record {id}")));
        };
        if let Some(holder) = self.by_path.get(path) {
            if *holder != id {
                return Err(Error::Validation {
                    path: format!("{:?}", path.octants()),
                    reason: format!("already held by {holder}"),
                });
            }
        }
        if !current.is_empty() {
            self.by_path.remove(&current);
        }
        if !path.is_empty() {
            self.by_path.insert(path.clone(), id);
        }
        self.by_id.insert(id, path.clone());
        Ok(())
    }

    fn delete_subtree(&mut self, node: &NodeRecord) -> Result<u64> {
        if self.by_id.remove(&node.id).is_none() {
            return Ok(0);
        }
        let mut removed = 1u64;
        if node.is_placed() {
            self.by_path.remove(&node.path);
            let doomed: Vec<(Path, NodeId)> = self
                .by_path
                .range(node.path.clone()..)
                .take_while(|(path, _)| node.path.contains(path))
                .map(|(path, id)| (path.clone(), *id))
                .collect();
            for (path, id) in doomed {
                self.by_path.remove(&path);
                self.by_id.remove(&id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn begin(&mut self) -> Result<()> {
        self.saved.push((self.by_path.clone(), self.by_id.clone()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.saved
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Storage("commit without begin".into()))
    }

    fn rollback(&mut self) -> Result<()> {
        let (by_path, by_id) = self
            .saved
            .pop()
            .ok_or_else(|| Error::Storage("rollback without begin".into()))?;
        self.by_path = by_path;
        self.by_id = by_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(octants: &[u32]) -> Path {
        Path::from_octants(octants.to_vec())
    }

    fn store() -> MemoryPathStore {
        let mut store = MemoryPathStore::default();
        store.insert_placed(NodeId(1), p(&[1])).unwrap();
        store.insert_placed(NodeId(2), p(&[1, 1])).unwrap();
        store.insert_placed(NodeId(3), p(&[1, 2])).unwrap();
        store.insert_unplaced(NodeId(4)).unwrap();
        store
    }

    #[test]
    fn failed_transaction_restores_tables() {
        let mut store = store();
        let before = store.snapshot();
        let result: Result<()> = store.with_transaction(|s| {
            s.assign_path(NodeId(4), &p(&[1, 3]))?;
            Err(Error::Storage("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn committed_transaction_keeps_changes() {
        let mut store = store();
        store
            .with_transaction(|s| s.assign_path(NodeId(4), &p(&[1, 3])))
            .unwrap();
        assert_eq!(store.path_of(NodeId(4)), Some(p(&[1, 3])));
        assert!(store.rollback().is_err());
    }

    #[test]
    fn assigning_a_held_path_is_a_validation_error() {
        let mut store = store();
        let err = store.assign_path(NodeId(4), &p(&[1, 2])).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(store.path_of(NodeId(4)), Some(Path::empty()));
    }

    #[test]
    fn reads_on_helper_methods() {
        let store = store();
        assert_eq!(store.find_by_path(&p(&[1, 2])).unwrap().map(|r| r.id), Some(NodeId(3)));
        assert_eq!(store.last_child(&p(&[1])).unwrap().map(|r| r.id), Some(NodeId(3)));
        assert_eq!(store.last_child(&Path::empty()).unwrap().map(|r| r.id), Some(NodeId(1)));
        assert_eq!(store.count_descendants(&p(&[1])).unwrap(), 2);
        assert_eq!(store.find_children(&p(&[1]), 1).unwrap().len(), 2);
        let found = store.find_by_id(NodeId(4)).unwrap().unwrap();
        assert!(!found.is_placed());
    }

    #[test]
    fn delete_subtree_counts_every_row() {
        let mut store = store();
        let root = store.find_by_id(NodeId(1)).unwrap().unwrap();
        assert_eq!(store.delete_subtree(&root).unwrap(), 3);
        assert_eq!(store.len(), 1);
    }
}
