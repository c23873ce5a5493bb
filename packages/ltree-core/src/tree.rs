use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::path::Path;
use crate::query::NodeRecord;

/// Anything carrying a materialized path can be assembled into a tree.
pub trait PathBearing {
    fn path(&self) -> &Path;
}

impl PathBearing for NodeRecord {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// One assembled node: the record plus its children in path order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TreeNode<T> {
    pub item: T,
    pub children: Vec<TreeNode<T>>,
}

impl<T> TreeNode<T> {
    pub fn leaf(item: T) -> Self {
        Self {
            item,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Depth-first, pre-order walk over the items.
    pub fn walk(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.size());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.item);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// Nest a flat list of path-bearing items.
///
/// Items are handled deepest level first, so every node is complete by the time it is
/// attached to its parent. Items at the minimum level become roots; deeper items whose
/// parent path is absent from the input are dropped. Unplaced items are ignored.
pub fn assemble<T: PathBearing>(items: Vec<T>) -> Vec<TreeNode<T>> {
    let mut items: Vec<T> = items.into_iter().filter(|i| !i.path().is_empty()).collect();
    items.sort_by(|a, b| a.path().cmp(b.path()));

    let Some(min_level) = items.iter().map(|i| i.path().level()).min() else {
        return Vec::new();
    };

    let index: HashMap<Path, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.path().clone(), i))
        .collect();
    let parents: Vec<Option<usize>> = items
        .iter()
        .map(|item| index.get(&item.path().parent()).copied())
        .collect();

    // Descending (level, path): children are visited before parents, and siblings in reverse
    // path order, so each children list is built back to front.
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (items[a].path(), items[b].path());
        pb.level().cmp(&pa.level()).then_with(|| pb.cmp(pa))
    });

    let mut slots: Vec<Option<TreeNode<T>>> = items.into_iter().map(|i| Some(TreeNode::leaf(i))).collect();
    let mut roots = Vec::new();
    for idx in order {
        let Some(mut node) = slots[idx].take() else {
            continue;
        };
        node.children.reverse();
        let level = node.item.path().level();
        match parents[idx] {
            Some(parent) => {
                if let Some(parent_node) = slots[parent].as_mut() {
                    parent_node.children.push(node);
                }
            }
            None if level == min_level => roots.push(node),
            None => {}
        }
    }
    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;

    fn rec(id: i64, octants: &[u32]) -> NodeRecord {
        NodeRecord::new(NodeId(id), Path::from_octants(octants.to_vec()))
    }

    fn ids<T: PathBearing>(nodes: &[TreeNode<T>], id: impl Fn(&T) -> i64) -> Vec<i64> {
        nodes.iter().map(|n| id(&n.item)).collect()
    }

    #[test]
    fn one_root_two_children_in_path_order() {
        let tree = assemble(vec![rec(1, &[1]), rec(2, &[1, 1]), rec(3, &[1, 2])]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].item.id, NodeId(1));
        assert_eq!(ids(&tree[0].children, |r| r.id.0), vec![2, 3]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let tree = assemble(vec![
            rec(4, &[1, 2, 1]),
            rec(3, &[1, 2]),
            rec(5, &[2]),
            rec(2, &[1, 1]),
            rec(1, &[1]),
        ]);
        assert_eq!(ids(&tree, |r| r.id.0), vec![1, 5]);
        assert_eq!(ids(&tree[0].children, |r| r.id.0), vec![2, 3]);
        assert_eq!(ids(&tree[0].children[1].children, |r| r.id.0), vec![4]);
        let walked: Vec<i64> = tree[0].walk().iter().map(|r| r.id.0).collect();
        assert_eq!(walked, vec![1, 2, 3, 4]);
    }

    #[test]
    fn subtree_query_result_roots_at_minimum_level() {
        let tree = assemble(vec![rec(2, &[1, 1]), rec(3, &[1, 1, 1]), rec(4, &[1, 2])]);
        assert_eq!(ids(&tree, |r| r.id.0), vec![2, 4]);
        assert_eq!(tree[0].size(), 2);
    }

    #[test]
    fn orphans_below_minimum_level_are_dropped() {
        let tree = assemble(vec![rec(1, &[1]), rec(9, &[2, 1])]);
        assert_eq!(ids(&tree, |r| r.id.0), vec![1]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(assemble(Vec::<NodeRecord>::new()).is_empty());
    }
}
