use proptest::prelude::*;
use ltree_core::{
    Error, MemoryPathStore, MutationCoordinator, NodeId, Path, PathCodec, PathConfig, Placement,
};
use ltree_test_support::assert_invariants;

#[derive(Clone, Debug)]
enum Op {
    Place { node: usize, target: usize, how: u8 },
    Delete { node: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..12, 0usize..12, 0u8..5).prop_map(|(node, target, how)| Op::Place { node, target, how }),
        1 => (0usize..12).prop_map(|node| Op::Delete { node }),
    ]
}

fn placement(how: u8, target: NodeId) -> Placement {
    match how {
        0 => Placement::AppendTo(target),
        1 => Placement::PrependTo(target),
        2 => Placement::Before(target),
        3 => Placement::After(target),
        _ => Placement::Root,
    }
}

proptest! {
    #[test]
    fn labels_round_trip(width in 1usize..=6, octants in prop::collection::vec(1u32..=9, 0..6)) {
        let codec = PathCodec::new(PathConfig::default().with_width(width)).unwrap();
        let path = Path::from_octants(octants);
        let label = codec.encode(&path);
        prop_assert_eq!(codec.level_of_label(&label), path.level());
        prop_assert_eq!(codec.decode(&label).unwrap(), path);
    }

    #[test]
    fn label_order_matches_path_order(
        a in prop::collection::vec(1u32..=9999, 1..5),
        b in prop::collection::vec(1u32..=9999, 1..5),
    ) {
        let codec = PathCodec::default();
        let (a, b) = (Path::from_octants(a), Path::from_octants(b));
        prop_assert_eq!(codec.encode(&a).cmp(&codec.encode(&b)), a.cmp(&b));
        prop_assert_eq!(a.is_ancestor_of(&b), b.is_descendant_of(&a));
        if a.is_ancestor_of(&b) {
            let prefix = format!("{}.", codec.encode(&a));
            prop_assert!(codec.encode(&b).starts_with(&prefix));
        }
    }

    #[test]
    fn mutations_keep_groups_dense(ops in prop::collection::vec(op(), 1..40)) {
        let mut store = MemoryPathStore::default();
        for id in 0..12 {
            store.insert_unplaced(NodeId(id)).unwrap();
        }
        let mut tree = MutationCoordinator::new(store, PathCodec::default());
        tree.make_root(NodeId(0)).unwrap();

        for op in ops {
            match op {
                Op::Place { node, target, how } => {
                    let (node, target) = (NodeId(node as i64), NodeId(target as i64));
                    if tree.store().path_of(node).is_none() {
                        continue;
                    }
                    let before = tree.store().snapshot();
                    match tree.place(node, placement(how, target)) {
                        Ok(path) => prop_assert_eq!(tree.path_of(node).unwrap(), path),
                        Err(Error::HitTargetMissing(_) | Error::InvalidOperation(_)) => {
                            prop_assert_eq!(tree.store().snapshot(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                }
                Op::Delete { node } => {
                    let node = NodeId(node as i64);
                    if tree.store().path_of(node).is_some() {
                        tree.delete(node).unwrap();
                    }
                }
            }
            assert_invariants(&tree);
        }
    }
}
