use tracing::trace;

use crate::error::{Error, Result};
use crate::path::{Path, PathCodec, SiblingPattern};
use crate::query::{NodeQuery, SortOrder};
use crate::traits::PathStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftDelta {
    /// Increment: opens a slot at the pivot.
    Up,
    /// Decrement: closes a slot just before the pivot.
    Down,
}

impl ShiftDelta {
    pub fn as_i64(self) -> i64 {
        match self {
            ShiftDelta::Up => 1,
            ShiftDelta::Down => -1,
        }
    }
}

/// A normalised sibling shift: every member of `group` whose octant is `>= from`, together
/// with its subtree, moves by `delta` at the group level.
///
/// Rows must be rewritten in [`ShiftPlan::order`]; descending for `Up`, ascending for
/// `Down`, so that no row is ever moved onto a path another unprocessed row still holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShiftPlan {
    group: SiblingPattern,
    from: u32,
    delta: ShiftDelta,
}

impl ShiftPlan {
    pub fn group(&self) -> &SiblingPattern {
        &self.group
    }

    /// First shifted octant (inclusive).
    pub fn from_octant(&self) -> u32 {
        self.from
    }

    pub fn delta(&self) -> ShiftDelta {
        self.delta
    }

    /// Path of the first shifted sibling.
    pub fn pivot(&self) -> Path {
        self.group.parent().join(&[self.from])
    }

    /// 0-based index of the shifted octant.
    pub fn octant_index(&self) -> usize {
        self.group.parent().level()
    }

    pub fn order(&self) -> SortOrder {
        match self.delta {
            ShiftDelta::Up => SortOrder::Desc,
            ShiftDelta::Down => SortOrder::Asc,
        }
    }

    pub fn covers(&self, path: &Path) -> bool {
        self.group.covers(path)
            && path
                .octant_at(self.octant_index())
                .is_some_and(|octant| octant >= self.from)
    }

    /// New value for one covered row. Descendant suffixes are kept as they are.
    pub fn rewrite(&self, path: &Path) -> Path {
        let index = self.octant_index();
        let octant = path.octants()[index];
        let shifted = match self.delta {
            ShiftDelta::Up => octant + 1,
            ShiftDelta::Down => octant - 1,
        };
        path.with_octant(index, shifted)
    }

    /// Every covered row, in mandated processing order.
    pub fn scan_query(&self) -> NodeQuery {
        NodeQuery::new()
            .by_path(self.group.parent().clone(), true)
            .start_level(self.group.level())
            .at_or_after(self.pivot())
            .sorted(self.order())
    }

    /// Only the sibling rows of the range (no descendants).
    pub fn siblings_query(&self) -> NodeQuery {
        NodeQuery::new()
            .siblings(self.group.clone())
            .at_or_after(self.pivot())
    }
}

/// Opens and closes slots inside one sibling group.
pub struct SiblingShiftEngine<'a> {
    codec: &'a PathCodec,
}

impl<'a> SiblingShiftEngine<'a> {
    pub fn new(codec: &'a PathCodec) -> Self {
        Self { codec }
    }

    /// Normalise `(pivot, inclusive)` into a plan. `None` when the range is empty by
    /// construction (an exclusive pivot already at the last encodable octant).
    pub fn plan(&self, pivot: &Path, inclusive: bool, delta: ShiftDelta) -> Result<Option<ShiftPlan>> {
        let last = pivot
            .last_octant()
            .ok_or_else(|| Error::InvalidOperation("cannot shift around the empty path".into()))?;
        self.codec.check(pivot)?;
        let from = if inclusive { last } else { last + 1 };
        if from > self.codec.max_octant() {
            return Ok(None);
        }
        Ok(Some(ShiftPlan {
            group: self.codec.sibling_pattern(pivot),
            from,
            delta,
        }))
    }

    /// Shift every sibling at or after `pivot` (after, when not `inclusive`) by one.
    /// Returns the number of rows rewritten, descendants included.
    pub fn shift<S: PathStore>(
        &self,
        store: &mut S,
        pivot: &Path,
        inclusive: bool,
        delta: ShiftDelta,
    ) -> Result<u64> {
        let Some(plan) = self.plan(pivot, inclusive, delta)? else {
            return Ok(0);
        };

        let boundary_order = match delta {
            ShiftDelta::Up => SortOrder::Desc,
            ShiftDelta::Down => SortOrder::Asc,
        };
        let boundary = store.query(&plan.siblings_query().sorted(boundary_order).limit(1))?;
        let Some(boundary) = boundary.first() else {
            trace!(pivot = %self.codec.encode(&plan.pivot()), "shift range empty");
            return Ok(0);
        };
        let edge = boundary.path.last_octant().unwrap_or_default();
        match delta {
            ShiftDelta::Up if edge >= self.codec.max_octant() => {
                return Err(Error::Overflow(format!(
                    "sibling group under {:?} is full ({} octants)",
                    self.codec.encode(plan.group().parent()),
                    self.codec.max_octant()
                )));
            }
            ShiftDelta::Down if edge <= 1 => {
                return Err(Error::Overflow(format!(
                    "cannot shift {} below octant 1",
                    self.codec.encode(&boundary.path)
                )));
            }
            _ => {}
        }

        let expected = store.count(&plan.scan_query())?;
        let rows = store.bulk_shift(&plan)?;
        if rows != expected {
            return Err(Error::Storage(format!(
                "shift at {} touched {rows} rows, expected {expected}",
                self.codec.encode(&plan.pivot())
            )));
        }
        trace!(
            pivot = %self.codec.encode(&plan.pivot()),
            delta = delta.as_i64(),
            rows,
            "sibling shift applied"
        );
        Ok(rows)
    }

    /// Make `slot` free by moving it and every later sibling up.
    pub fn open_slot<S: PathStore>(&self, store: &mut S, slot: &Path) -> Result<u64> {
        self.shift(store, slot, true, ShiftDelta::Up)
    }

    /// Fill the vacated `slot` by moving every later sibling down.
    pub fn close_gap<S: PathStore>(&self, store: &mut S, slot: &Path) -> Result<u64> {
        self.shift(store, slot, false, ShiftDelta::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathConfig;
    use crate::ids::NodeId;
    use crate::traits::MemoryPathStore;

    fn p(octants: &[u32]) -> Path {
        Path::from_octants(octants.to_vec())
    }

    fn seeded(paths: &[&[u32]]) -> MemoryPathStore {
        let mut store = MemoryPathStore::default();
        for (i, octants) in paths.iter().enumerate() {
            store.insert_placed(NodeId(i as i64 + 1), p(octants)).unwrap();
        }
        store
    }

    #[test]
    fn plan_normalises_exclusive_pivot() {
        let codec = PathCodec::default();
        let engine = SiblingShiftEngine::new(&codec);
        let plan = engine.plan(&p(&[1, 2]), false, ShiftDelta::Down).unwrap().unwrap();
        assert_eq!(plan.pivot(), p(&[1, 3]));
        assert_eq!(plan.order(), SortOrder::Asc);
        assert!(plan.covers(&p(&[1, 3, 7])));
        assert!(!plan.covers(&p(&[1, 2, 7])));
        assert!(!plan.covers(&p(&[1])));
        assert_eq!(plan.rewrite(&p(&[1, 3, 7])), p(&[1, 2, 7]));
    }

    #[test]
    fn open_slot_moves_later_siblings_with_descendants() {
        let codec = PathCodec::default();
        let engine = SiblingShiftEngine::new(&codec);
        let mut store = seeded(&[&[1], &[1, 1], &[1, 2], &[1, 2, 1], &[1, 3]]);

        let rows = engine.open_slot(&mut store, &p(&[1, 2])).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(store.path_of(NodeId(2)), Some(p(&[1, 1])));
        assert_eq!(store.path_of(NodeId(3)), Some(p(&[1, 3])));
        assert_eq!(store.path_of(NodeId(4)), Some(p(&[1, 3, 1])));
        assert_eq!(store.path_of(NodeId(5)), Some(p(&[1, 4])));
    }

    #[test]
    fn close_gap_is_noop_without_followers() {
        let codec = PathCodec::default();
        let engine = SiblingShiftEngine::new(&codec);
        let mut store = seeded(&[&[1], &[1, 1]]);
        assert_eq!(engine.close_gap(&mut store, &p(&[1, 2])).unwrap(), 0);
    }

    #[test]
    fn open_slot_rejects_full_group_before_writing() {
        let codec = PathCodec::new(PathConfig::default().with_width(1)).unwrap();
        let engine = SiblingShiftEngine::new(&codec);
        let mut store = seeded(&[&[8], &[9]]);
        let before = store.snapshot();
        let err = engine.open_slot(&mut store, &p(&[8])).unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn shift_down_onto_octant_zero_is_rejected() {
        let codec = PathCodec::default();
        let engine = SiblingShiftEngine::new(&codec);
        let mut store = seeded(&[&[1], &[2]]);
        let err = engine
            .shift(&mut store, &p(&[1]), true, ShiftDelta::Down)
            .unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));
    }
}
