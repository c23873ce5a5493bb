use ltree_core::{
    Error, MemoryPathStore, MutationCoordinator, NodeId, NodeQuery, Path, PathCodec, PathConfig,
    PathStore, Placement, SortOrder,
};

fn coordinator(ids: &[i64]) -> MutationCoordinator<MemoryPathStore> {
    coordinator_with(PathConfig::default(), ids)
}

fn coordinator_with(config: PathConfig, ids: &[i64]) -> MutationCoordinator<MemoryPathStore> {
    let mut store = MemoryPathStore::default();
    for id in ids {
        store.insert_unplaced(NodeId(*id)).unwrap();
    }
    MutationCoordinator::new(store, PathCodec::new(config).unwrap())
}

fn label(tree: &MutationCoordinator<MemoryPathStore>, id: i64) -> String {
    tree.codec().encode(&tree.path_of(NodeId(id)).unwrap())
}

#[test]
fn placements_return_final_path() {
    let mut tree = coordinator(&[1, 2, 3]);
    let root = tree.place(NodeId(1), Placement::Root).unwrap();
    assert_eq!(root, Path::from_octants(vec![1]));
    tree.place(NodeId(2), Placement::AppendTo(NodeId(1))).unwrap();
    let path = tree.place(NodeId(3), Placement::Before(NodeId(2))).unwrap();
    assert_eq!(tree.codec().encode(&path), "0001.0001");
    assert_eq!(label(&tree, 2), "0001.0002");
}

#[test]
fn custom_width_and_separator() {
    let config = PathConfig::default().with_width(2).with_separator('/');
    let mut tree = coordinator_with(config, &[1, 2, 3, 4]);
    tree.make_root(NodeId(1)).unwrap();
    tree.append_to(NodeId(2), NodeId(1)).unwrap();
    tree.append_to(NodeId(3), NodeId(2)).unwrap();
    tree.prepend_to(NodeId(4), NodeId(1)).unwrap();
    assert_eq!(label(&tree, 4), "01/01");
    assert_eq!(label(&tree, 2), "01/02");
    assert_eq!(label(&tree, 3), "01/02/01");
}

#[test]
fn insert_after_last_child_needs_no_shift() {
    let mut tree = coordinator(&[1, 2, 3]);
    tree.make_root(NodeId(1)).unwrap();
    tree.append_to(NodeId(2), NodeId(1)).unwrap();
    tree.insert_after(NodeId(3), NodeId(2)).unwrap();
    assert_eq!(label(&tree, 3), "0001.0002");
    assert_eq!(label(&tree, 2), "0001.0001");
}

#[test]
fn moving_a_subtree_across_roots() {
    let mut tree = coordinator(&[1, 2, 3, 4, 5]);
    tree.make_root(NodeId(1)).unwrap();
    tree.make_root(NodeId(2)).unwrap();
    tree.append_to(NodeId(3), NodeId(1)).unwrap();
    tree.append_to(NodeId(4), NodeId(3)).unwrap();
    tree.append_to(NodeId(5), NodeId(4)).unwrap();

    tree.prepend_to(NodeId(3), NodeId(2)).unwrap();
    assert_eq!(label(&tree, 3), "0002.0001");
    assert_eq!(label(&tree, 4), "0002.0001.0001");
    assert_eq!(label(&tree, 5), "0002.0001.0001.0001");
    assert!(tree.children(NodeId(1), 0).unwrap().is_empty());
}

#[test]
fn removing_first_root_renumbers_the_forest() {
    let mut tree = coordinator(&[1, 2, 3]);
    tree.make_root(NodeId(1)).unwrap();
    tree.make_root(NodeId(2)).unwrap();
    tree.append_to(NodeId(3), NodeId(2)).unwrap();
    tree.delete(NodeId(1)).unwrap();
    assert_eq!(label(&tree, 2), "0001");
    assert_eq!(label(&tree, 3), "0001.0001");
}

#[test]
fn deleting_unplaced_record_only_removes_it() {
    let mut tree = coordinator(&[1, 2]);
    tree.make_root(NodeId(1)).unwrap();
    assert_eq!(tree.delete(NodeId(2)).unwrap(), 1);
    assert_eq!(tree.store().len(), 1);
    assert_eq!(label(&tree, 1), "0001");
}

#[test]
fn unknown_node_is_invalid() {
    let mut tree = coordinator(&[1]);
    tree.make_root(NodeId(1)).unwrap();
    let err = tree.append_to(NodeId(9), NodeId(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
    assert!(matches!(tree.delete(NodeId(9)), Err(Error::InvalidOperation(_))));
}

#[test]
fn unplaced_nodes_have_empty_reads() {
    let tree = coordinator(&[1]);
    assert_eq!(tree.level(NodeId(1)).unwrap(), 0);
    assert!(!tree.is_root(NodeId(1)).unwrap());
    assert!(tree.children(NodeId(1), 0).unwrap().is_empty());
    assert!(tree.next_sibling(NodeId(1)).unwrap().is_none());
    assert!(tree.subtree(NodeId(1)).unwrap().is_none());
}

#[test]
fn root_query_lists_roots_only() {
    let mut tree = coordinator(&[1, 2, 3]);
    tree.make_root(NodeId(1)).unwrap();
    tree.make_root(NodeId(2)).unwrap();
    tree.append_to(NodeId(3), NodeId(1)).unwrap();
    let roots = tree
        .store()
        .query(&NodeQuery::new().root().sorted(SortOrder::Desc))
        .unwrap();
    let ids: Vec<i64> = roots.iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![2, 1]);
    let deep = tree.store().query(&NodeQuery::new().not_root()).unwrap();
    assert_eq!(deep.len(), 1);
}

#[test]
fn tree_of_partial_query_uses_shallowest_level() {
    let mut tree = coordinator(&[1, 2, 3, 4]);
    tree.make_root(NodeId(1)).unwrap();
    tree.append_to(NodeId(2), NodeId(1)).unwrap();
    tree.append_to(NodeId(3), NodeId(2)).unwrap();
    tree.append_to(NodeId(4), NodeId(1)).unwrap();
    let forest = tree.tree(&NodeQuery::new().not_root()).unwrap();
    let tops: Vec<i64> = forest.iter().map(|n| n.item.id.0).collect();
    assert_eq!(tops, vec![2, 4]);
    assert_eq!(forest[0].children[0].item.id, NodeId(3));
}
