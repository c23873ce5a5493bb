//! Backend conformance suite shared by every `PathStore` implementation's tests.
//!
//! Each backend's test file implements [`Backend`] for a local type and calls the scenario
//! functions (or [`run_all`]) with it.

use std::collections::BTreeMap;

use ltree_core::{
    Error, MutationCoordinator, NodeId, NodeQuery, NodeRecord, Path, PathCodec, PathConfig,
    PathStore, ReparentPlan, Result, ShiftPlan, SortOrder,
};

/// How a conformance run obtains fresh, empty stores.
pub trait Backend {
    type Store: PathStore;

    fn open(&mut self, config: &PathConfig) -> Self::Store;

    /// Create a record with no path yet, the way the surrounding framework would.
    fn add_record(store: &mut Self::Store, id: NodeId) -> Result<()>;
}

/// Wraps a store, counts writes, and can fail the N-th write (1-based).
pub struct FailingStore<S> {
    inner: S,
    writes: usize,
    fail_at: Option<usize>,
}

impl<S: PathStore> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: 0,
            fail_at: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Fail the `n`-th write from now on.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_at = Some(self.writes + n);
    }

    pub fn disarm(&mut self) {
        self.fail_at = None;
    }

    fn tick(&mut self, what: &str) -> Result<()> {
        self.writes += 1;
        if self.fail_at == Some(self.writes) {
            return Err(Error::Storage(format!("injected failure on {what}")));
        }
        Ok(())
    }
}

impl<S: PathStore> PathStore for FailingStore<S> {
    fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>> {
        self.inner.query(query)
    }

    fn count(&self, query: &NodeQuery) -> Result<u64> {
        self.inner.count(query)
    }

    fn find_by_id(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.inner.find_by_id(id)
    }

    fn bulk_shift(&mut self, plan: &ShiftPlan) -> Result<u64> {
        self.tick("shift")?;
        self.inner.bulk_shift(plan)
    }

    fn bulk_reparent(&mut self, plan: &ReparentPlan) -> Result<u64> {
        self.tick("reparent")?;
        self.inner.bulk_reparent(plan)
    }

    fn assign_path(&mut self, id: NodeId, path: &Path) -> Result<()> {
        self.tick("assign")?;
        self.inner.assign_path(id, path)
    }

    fn delete_subtree(&mut self, node: &NodeRecord) -> Result<u64> {
        self.tick("delete")?;
        self.inner.delete_subtree(node)
    }

    fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }
}

pub type TestTree<S> = MutationCoordinator<FailingStore<S>>;

pub fn fresh_with<B: Backend>(backend: &mut B, config: PathConfig) -> TestTree<B::Store> {
    let store = backend.open(&config);
    let codec = PathCodec::new(config).expect("valid config");
    MutationCoordinator::new(FailingStore::new(store), codec)
}

pub fn fresh<B: Backend>(backend: &mut B) -> TestTree<B::Store> {
    fresh_with(backend, PathConfig::default())
}

pub fn add<B: Backend>(tree: &mut TestTree<B::Store>, ids: &[i64]) {
    for id in ids {
        B::add_record(tree.store_mut().inner_mut(), NodeId(*id)).expect("add record");
    }
}

pub fn label<S: PathStore>(tree: &MutationCoordinator<S>, id: i64) -> String {
    let path = tree.path_of(NodeId(id)).expect("known node");
    tree.codec().encode(&path)
}

/// `(id, label)` for every placed record, in path order.
pub fn dump<S: PathStore>(tree: &MutationCoordinator<S>) -> Vec<(i64, String)> {
    tree.store()
        .query(&NodeQuery::new().sorted(SortOrder::Asc))
        .expect("query all")
        .into_iter()
        .map(|r| (r.id.0, tree.codec().encode(&r.path)))
        .collect()
}

/// Unique paths, prefix-closed containment, and gap-free `{1..k}` children everywhere.
pub fn assert_invariants<S: PathStore>(tree: &MutationCoordinator<S>) {
    let rows = tree
        .store()
        .query(&NodeQuery::new().sorted(SortOrder::Asc))
        .expect("query all");
    let mut groups: BTreeMap<Path, Vec<u32>> = BTreeMap::new();
    for window in rows.windows(2) {
        assert!(window[0].path < window[1].path, "paths not unique/sorted: {window:?}");
    }
    for row in &rows {
        let parent = row.path.parent();
        if !parent.is_empty() {
            assert!(
                rows.iter().any(|r| r.path == parent),
                "{:?} has no parent record",
                row.path
            );
        }
        groups
            .entry(parent)
            .or_default()
            .push(row.path.last_octant().expect("placed"));
    }
    for (parent, mut octants) in groups {
        octants.sort_unstable();
        let expected: Vec<u32> = (1..=octants.len() as u32).collect();
        assert_eq!(octants, expected, "gap under {parent:?}");
    }
}

const R: i64 = 1;
const A: i64 = 2;
const B: i64 = 3;
const C: i64 = 4;
const B1: i64 = 5;
const E: i64 = 6;

/// R with children A, C, B (B owning B1) and trailing E:
/// `R=0001, A=0001.0001, C=0001.0002, B=0001.0003, B1=0001.0003.0001, E=0001.0004`.
pub fn seed<B: Backend>(backend: &mut B) -> TestTree<B::Store> {
    let mut tree = fresh(backend);
    add::<B>(&mut tree, &[R, A, B, C, B1, E]);
    tree.make_root(NodeId(R)).unwrap();
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    tree.append_to(NodeId(B), NodeId(R)).unwrap();
    tree.insert_before(NodeId(C), NodeId(B)).unwrap();
    tree.append_to(NodeId(B1), NodeId(B)).unwrap();
    tree.append_to(NodeId(E), NodeId(R)).unwrap();
    tree
}

pub fn append_assigns_sequential_children<B: Backend>(backend: &mut B) {
    let mut tree = fresh(backend);
    add::<B>(&mut tree, &[R, A, B]);
    tree.make_root(NodeId(R)).unwrap();
    assert_eq!(label(&tree, R), "0001");
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    assert_eq!(label(&tree, A), "0001.0001");
    tree.append_to(NodeId(B), NodeId(R)).unwrap();
    assert_eq!(label(&tree, B), "0001.0002");
    assert_eq!(tree.level(NodeId(B)).unwrap(), 2);
    assert!(tree.is_root(NodeId(R)).unwrap());
    assert!(tree.is_first_level(NodeId(A)).unwrap());
    assert_invariants(&tree);
}

pub fn insert_before_shifts_following_siblings<B: Backend>(backend: &mut B) {
    let mut tree = fresh(backend);
    add::<B>(&mut tree, &[R, A, B, C]);
    tree.make_root(NodeId(R)).unwrap();
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    tree.append_to(NodeId(B), NodeId(R)).unwrap();

    tree.insert_before(NodeId(C), NodeId(B)).unwrap();
    assert_eq!(label(&tree, C), "0001.0002");
    assert_eq!(label(&tree, B), "0001.0003");
    assert_eq!(tree.next_sibling(NodeId(C)).unwrap().map(|r| r.id), Some(NodeId(B)));
    assert_eq!(tree.previous_sibling(NodeId(C)).unwrap().map(|r| r.id), Some(NodeId(A)));
    assert_invariants(&tree);
}

pub fn delete_closes_gap<B: Backend>(backend: &mut B) {
    let mut tree = fresh(backend);
    add::<B>(&mut tree, &[R, A, C]);
    tree.make_root(NodeId(R)).unwrap();
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    tree.append_to(NodeId(C), NodeId(R)).unwrap();

    assert_eq!(tree.delete(NodeId(A)).unwrap(), 1);
    assert_eq!(label(&tree, C), "0001.0001");
    assert_invariants(&tree);
}

pub fn delete_removes_whole_subtree<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    assert_eq!(tree.delete(NodeId(B)).unwrap(), 2);
    assert_eq!(
        dump(&tree),
        vec![
            (R, "0001".to_string()),
            (A, "0001.0001".to_string()),
            (C, "0001.0002".to_string()),
            (E, "0001.0003".to_string()),
        ]
    );
    assert_invariants(&tree);
}

pub fn move_subtree_to_first_child<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    tree.prepend_to(NodeId(B), NodeId(A)).unwrap();
    assert_eq!(label(&tree, B), "0001.0001.0001");
    assert_eq!(label(&tree, B1), "0001.0001.0001.0001");
    assert_eq!(label(&tree, E), "0001.0003");
    assert_invariants(&tree);
}

pub fn move_within_group_keeps_order<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    // E to the front, then A to the back.
    tree.insert_before(NodeId(E), NodeId(A)).unwrap();
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    let order: Vec<i64> = tree
        .children(NodeId(R), 1)
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(order, vec![E, C, B, A]);
    assert_eq!(label(&tree, B1), "0001.0003.0001");

    // Swap neighbours through both directions.
    tree.insert_after(NodeId(C), NodeId(B)).unwrap();
    tree.insert_before(NodeId(A), NodeId(E)).unwrap();
    let order: Vec<i64> = tree
        .children(NodeId(R), 1)
        .unwrap()
        .into_iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(order, vec![A, E, B, C]);
    assert_eq!(label(&tree, B1), "0001.0003.0001");
    assert_invariants(&tree);
}

pub fn move_before_own_parent<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    tree.insert_before(NodeId(B1), NodeId(B)).unwrap();
    assert_eq!(label(&tree, B1), "0001.0003");
    assert_eq!(label(&tree, B), "0001.0004");
    assert_eq!(label(&tree, E), "0001.0005");
    assert!(tree.children(NodeId(B), 0).unwrap().is_empty());
    assert_invariants(&tree);
}

pub fn make_root_appends_and_promotes<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    add::<B>(&mut tree, &[50]);
    tree.make_root(NodeId(50)).unwrap();
    assert_eq!(label(&tree, 50), "0002");

    tree.make_root(NodeId(B)).unwrap();
    assert_eq!(label(&tree, B), "0003");
    assert_eq!(label(&tree, B1), "0003.0001");
    assert_eq!(label(&tree, E), "0001.0003");
    // Already the last root.
    let writes = tree.store().writes();
    tree.make_root(NodeId(B)).unwrap();
    assert_eq!(tree.store().writes(), writes);
    assert_invariants(&tree);
}

pub fn insert_after_in_place_is_noop<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    let before = dump(&tree);
    let writes = tree.store().writes();

    tree.insert_after(NodeId(C), NodeId(A)).unwrap();
    tree.insert_before(NodeId(A), NodeId(C)).unwrap();
    tree.append_to(NodeId(E), NodeId(R)).unwrap();
    tree.prepend_to(NodeId(A), NodeId(R)).unwrap();
    tree.insert_after(NodeId(B), NodeId(B)).unwrap();

    assert_eq!(tree.store().writes(), writes);
    assert_eq!(dump(&tree), before);
}

pub fn unplaced_reference_is_rejected<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    add::<B>(&mut tree, &[40, 41]);
    let writes = tree.store().writes();
    for result in [
        tree.append_to(NodeId(40), NodeId(41)),
        tree.prepend_to(NodeId(40), NodeId(41)),
        tree.insert_before(NodeId(40), NodeId(41)),
        tree.insert_after(NodeId(40), NodeId(99)),
    ] {
        assert!(matches!(result, Err(Error::HitTargetMissing(_))), "{result:?}");
    }
    assert_eq!(tree.store().writes(), writes);
    assert_eq!(tree.level(NodeId(40)).unwrap(), 0);
}

pub fn moving_into_own_subtree_is_rejected<B: Backend>(backend: &mut B) {
    let mut tree = seed(backend);
    let before = dump(&tree);
    let err = tree.append_to(NodeId(B), NodeId(B1)).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
    let err = tree.prepend_to(NodeId(R), NodeId(R)).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
    assert_eq!(dump(&tree), before);
}

pub fn full_group_overflows_before_any_write<B: Backend>(backend: &mut B) {
    let mut tree = fresh_with(backend, PathConfig::default().with_width(1));
    let ids: Vec<i64> = (1..=11).collect();
    add::<B>(&mut tree, &ids);
    tree.make_root(NodeId(1)).unwrap();
    for id in 2..=10 {
        tree.append_to(NodeId(id), NodeId(1)).unwrap();
    }
    let before = dump(&tree);
    let writes = tree.store().writes();

    let err = tree.append_to(NodeId(11), NodeId(1)).unwrap_err();
    assert!(matches!(err, Error::Overflow(_)), "{err:?}");
    let err = tree.prepend_to(NodeId(11), NodeId(1)).unwrap_err();
    assert!(matches!(err, Error::Overflow(_)), "{err:?}");
    assert_eq!(dump(&tree), before);
    // The prepend's overflow check reads only; nothing reached the store.
    assert_eq!(tree.store().writes(), writes);
}

/// Fail every write of a composite move in turn; storage must come back unchanged each time.
pub fn failed_steps_roll_back<B: Backend>(backend: &mut B) {
    let mut probe = seed(backend);
    let start = probe.store().writes();
    probe.insert_before(NodeId(B), NodeId(A)).unwrap();
    let total = probe.store().writes() - start;
    assert!(total >= 3, "expected shift, assign, reparent and close-gap writes");

    for n in 1..=total {
        let mut tree = seed(backend);
        let before = dump(&tree);
        tree.store_mut().fail_after(n);
        let err = tree.insert_before(NodeId(B), NodeId(A)).unwrap_err();
        assert!(matches!(err, Error::Storage(_)), "{err:?}");
        tree.store_mut().disarm();
        assert_eq!(dump(&tree), before, "write {n} left partial state");
    }

    let mut tree = seed(backend);
    let before = dump(&tree);
    tree.store_mut().fail_after(2);
    assert!(tree.delete(NodeId(A)).is_err());
    assert_eq!(dump(&tree), before);
}

pub fn reads_follow_paths<B: Backend>(backend: &mut B) {
    let tree = seed(backend);
    let ids = |records: Vec<NodeRecord>| records.into_iter().map(|r| r.id.0).collect::<Vec<_>>();

    assert_eq!(ids(tree.children(NodeId(R), 0).unwrap()), vec![A, C, B, B1, E]);
    assert_eq!(ids(tree.children(NodeId(R), 1).unwrap()), vec![A, C, B, E]);
    assert_eq!(ids(tree.ancestors(NodeId(B1), 0).unwrap()), vec![R, B]);
    assert_eq!(ids(tree.ancestors(NodeId(B1), 1).unwrap()), vec![B]);
    assert_eq!(ids(tree.next_siblings(NodeId(C)).unwrap()), vec![B, E]);
    assert_eq!(ids(tree.previous_siblings(NodeId(B)).unwrap()), vec![C, A]);
    assert_eq!(ids(tree.nearest(NodeId(C)).unwrap()), vec![A, B, E]);
    assert!(tree.next_sibling(NodeId(E)).unwrap().is_none());

    let root = tree.subtree(NodeId(R)).unwrap().expect("placed");
    assert_eq!(root.size(), 6);
    let walked: Vec<i64> = root.walk().iter().map(|r| r.id.0).collect();
    assert_eq!(walked, vec![R, A, C, B, B1, E]);
}

pub fn assembles_flat_query_result<B: Backend>(backend: &mut B) {
    let mut tree = fresh(backend);
    add::<B>(&mut tree, &[R, A, B]);
    tree.make_root(NodeId(R)).unwrap();
    tree.append_to(NodeId(A), NodeId(R)).unwrap();
    tree.append_to(NodeId(B), NodeId(R)).unwrap();

    let forest = tree.tree(&NodeQuery::new().sorted(SortOrder::Asc)).unwrap();
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].item.id, NodeId(R));
    let children: Vec<NodeId> = forest[0].children.iter().map(|c| c.item.id).collect();
    assert_eq!(children, vec![NodeId(A), NodeId(B)]);
}

/// Deterministic pseudo-random insert/move/delete mix; invariants after every step.
pub fn random_mutations_keep_invariants<B: Backend>(backend: &mut B, steps: usize) {
    let mut tree = fresh(backend);
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |bound: usize| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % bound as u64) as usize
    };

    let mut live: Vec<i64> = Vec::new();
    let mut next_id = 1i64;
    for _ in 0..steps {
        let choice = if live.is_empty() { 0 } else { next(6) };
        let result = match choice {
            0 => {
                let id = next_id;
                next_id += 1;
                add::<B>(&mut tree, &[id]);
                let placed = if live.is_empty() {
                    tree.make_root(NodeId(id))
                } else {
                    let target = NodeId(live[next(live.len())]);
                    match next(4) {
                        0 => tree.append_to(NodeId(id), target),
                        1 => tree.prepend_to(NodeId(id), target),
                        2 => tree.insert_before(NodeId(id), target),
                        _ => tree.insert_after(NodeId(id), target),
                    }
                };
                live.push(id);
                placed.map(|_| ())
            }
            1..=3 => {
                let node = NodeId(live[next(live.len())]);
                let target = NodeId(live[next(live.len())]);
                let moved = match next(5) {
                    0 => tree.append_to(node, target),
                    1 => tree.prepend_to(node, target),
                    2 => tree.insert_before(node, target),
                    3 => tree.insert_after(node, target),
                    _ => tree.make_root(node),
                };
                match moved {
                    Err(Error::InvalidOperation(_)) => Ok(()),
                    other => other.map(|_| ()),
                }
            }
            _ => {
                let node = live[next(live.len())];
                let removed = tree.children(NodeId(node), 0).unwrap();
                tree.delete(NodeId(node)).map(|_| {
                    live.retain(|id| *id != node && !removed.iter().any(|r| r.id.0 == *id));
                })
            }
        };
        result.unwrap();
        assert_invariants(&tree);
    }
}

pub fn run_all<B: Backend>(backend: &mut B) {
    append_assigns_sequential_children(backend);
    insert_before_shifts_following_siblings(backend);
    delete_closes_gap(backend);
    delete_removes_whole_subtree(backend);
    move_subtree_to_first_child(backend);
    move_within_group_keeps_order(backend);
    move_before_own_parent(backend);
    make_root_appends_and_promotes(backend);
    insert_after_in_place_is_noop(backend);
    unplaced_reference_is_rejected(backend);
    moving_into_own_subtree_is_rejected(backend);
    full_group_overflows_before_any_write(backend);
    failed_steps_roll_back(backend);
    reads_follow_paths(backend);
    assembles_flat_query_result(backend);
    random_mutations_keep_invariants(backend, 200);
}
