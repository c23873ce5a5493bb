use tracing::trace;

use crate::error::{Error, Result};
use crate::path::{Path, PathCodec};
use crate::query::NodeQuery;
use crate::traits::PathStore;

/// Rewrite of one subtree's shared prefix: every strict descendant of `old` becomes
/// `new ++ suffix`. Distinct descendants keep distinct suffixes, so rows can be rewritten in
/// any order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReparentPlan {
    old: Path,
    new: Path,
}

impl ReparentPlan {
    pub fn old_prefix(&self) -> &Path {
        &self.old
    }

    pub fn new_prefix(&self) -> &Path {
        &self.new
    }

    pub fn covers(&self, path: &Path) -> bool {
        self.old.is_ancestor_of(path)
    }

    pub fn rewrite(&self, path: &Path) -> Path {
        match path.strip_prefix(&self.old) {
            Some(suffix) => self.new.join(suffix),
            None => path.clone(),
        }
    }

    pub fn scan_query(&self) -> NodeQuery {
        NodeQuery::new()
            .by_path(self.old.clone(), true)
            .not(self.old.clone())
    }
}

pub struct SubtreeReparentEngine<'a> {
    codec: &'a PathCodec,
}

impl<'a> SubtreeReparentEngine<'a> {
    pub fn new(codec: &'a PathCodec) -> Self {
        Self { codec }
    }

    pub fn plan(&self, old: &Path, new: &Path) -> Result<ReparentPlan> {
        if old.is_empty() || new.is_empty() {
            return Err(Error::InvalidOperation(
                "reparent requires two placed paths".into(),
            ));
        }
        if old.contains(new) {
            return Err(Error::InvalidOperation(format!(
                "cannot move {} into its own subtree at {}",
                self.codec.encode(old),
                self.codec.encode(new)
            )));
        }
        self.codec.check(new)?;
        Ok(ReparentPlan {
            old: old.clone(),
            new: new.clone(),
        })
    }

    /// Move every descendant of `old` under `new`. The row count reported by the store must
    /// match the descendant count exactly.
    pub fn reparent<S: PathStore>(&self, store: &mut S, old: &Path, new: &Path) -> Result<u64> {
        let plan = self.plan(old, new)?;
        let expected = store.count(&plan.scan_query())?;
        if expected == 0 {
            return Ok(0);
        }
        let rows = store.bulk_reparent(&plan)?;
        if rows != expected {
            return Err(Error::Storage(format!(
                "reparent {} -> {} touched {rows} rows, expected {expected}",
                self.codec.encode(old),
                self.codec.encode(new)
            )));
        }
        trace!(
            old = %self.codec.encode(old),
            new = %self.codec.encode(new),
            rows,
            "subtree reparented"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::traits::MemoryPathStore;

    fn p(octants: &[u32]) -> Path {
        Path::from_octants(octants.to_vec())
    }

    #[test]
    fn rewrite_keeps_relative_suffix() {
        let codec = PathCodec::default();
        let plan = SubtreeReparentEngine::new(&codec)
            .plan(&p(&[1, 3]), &p(&[1, 1, 1]))
            .unwrap();
        assert_eq!(plan.rewrite(&p(&[1, 3, 1])), p(&[1, 1, 1, 1]));
        assert_eq!(plan.rewrite(&p(&[1, 3, 2, 5])), p(&[1, 1, 1, 2, 5]));
        assert!(!plan.covers(&p(&[1, 3])));
        assert!(!plan.covers(&p(&[1, 4, 1])));
    }

    #[test]
    fn rejects_moving_into_own_subtree() {
        let codec = PathCodec::default();
        let engine = SubtreeReparentEngine::new(&codec);
        let err = engine.plan(&p(&[1, 3]), &p(&[1, 3, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn reparent_moves_whole_subtree() {
        let codec = PathCodec::default();
        let engine = SubtreeReparentEngine::new(&codec);
        let mut store = MemoryPathStore::default();
        store.insert_placed(NodeId(1), p(&[2])).unwrap();
        store.insert_placed(NodeId(2), p(&[1, 1])).unwrap();
        store.insert_placed(NodeId(3), p(&[1, 1, 1])).unwrap();
        store.insert_placed(NodeId(4), p(&[1, 2])).unwrap();

        let rows = engine.reparent(&mut store, &p(&[1]), &p(&[2])).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(store.path_of(NodeId(2)), Some(p(&[2, 1])));
        assert_eq!(store.path_of(NodeId(3)), Some(p(&[2, 1, 1])));
        assert_eq!(store.path_of(NodeId(4)), Some(p(&[2, 2])));
    }
}
