use crate::ids::NodeId;
use crate::path::{Path, SiblingPattern};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Scan direction relative to a pivot path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Paths strictly greater than the pivot, nearest first.
    After,
    /// Paths strictly less than the pivot, nearest first.
    Before,
}

/// One composable filter/order clause over the path column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryModifier {
    Sorted(SortOrder),
    Root,
    NotRoot,
    /// `recursive`: the path itself plus its whole subtree; otherwise the exact path.
    ByPath { path: Path, recursive: bool },
    /// The path itself plus every ancestor of it.
    AncestorsOf(Path),
    Not(Path),
    Level(usize),
    StartLevel(usize),
    EndLevel(usize),
    Siblings(SiblingPattern),
    After(Path),
    AtOrAfter(Path),
    Before(Path),
    Limit(usize),
    Placed,
}

impl QueryModifier {
    /// Row filter for this clause. Ordering and limit clauses accept everything.
    pub fn accepts(&self, path: &Path) -> bool {
        let level = path.level();
        match self {
            QueryModifier::Sorted(_) | QueryModifier::Limit(_) => true,
            QueryModifier::Root => level == 1,
            QueryModifier::NotRoot => level > 1,
            QueryModifier::ByPath { path: by, recursive } => {
                if *recursive {
                    by.contains(path)
                } else {
                    by == path
                }
            }
            QueryModifier::AncestorsOf(of) => !path.is_empty() && path.contains(of),
            QueryModifier::Not(not) => not != path,
            QueryModifier::Level(n) => level == *n,
            QueryModifier::StartLevel(n) => level >= *n,
            QueryModifier::EndLevel(n) => level <= *n,
            QueryModifier::Siblings(pattern) => pattern.matches(path),
            QueryModifier::After(pivot) => path > pivot,
            QueryModifier::AtOrAfter(pivot) => path >= pivot,
            QueryModifier::Before(pivot) => path < pivot,
            QueryModifier::Placed => !path.is_empty(),
        }
    }
}

/// Ordered list of modifiers composed by the caller; backends either evaluate it directly
/// or compile it into a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeQuery {
    modifiers: Vec<QueryModifier>,
}

impl Default for NodeQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeQuery {
    /// Every placed record.
    pub fn new() -> Self {
        Self {
            modifiers: vec![QueryModifier::Placed],
        }
    }

    pub fn modifiers(&self) -> &[QueryModifier] {
        &self.modifiers
    }

    pub fn with(mut self, modifier: QueryModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn sorted(self, order: SortOrder) -> Self {
        self.with(QueryModifier::Sorted(order))
    }

    pub fn root(self) -> Self {
        self.with(QueryModifier::Root)
    }

    pub fn not_root(self) -> Self {
        self.with(QueryModifier::NotRoot)
    }

    pub fn by_path(self, path: Path, recursive: bool) -> Self {
        self.with(QueryModifier::ByPath { path, recursive })
    }

    pub fn ancestors_of(self, path: Path) -> Self {
        self.with(QueryModifier::AncestorsOf(path))
    }

    pub fn not(self, path: Path) -> Self {
        self.with(QueryModifier::Not(path))
    }

    pub fn level(self, level: usize) -> Self {
        self.with(QueryModifier::Level(level))
    }

    pub fn start_level(self, level: usize) -> Self {
        self.with(QueryModifier::StartLevel(level))
    }

    pub fn end_level(self, level: usize) -> Self {
        self.with(QueryModifier::EndLevel(level))
    }

    pub fn siblings(self, pattern: SiblingPattern) -> Self {
        self.with(QueryModifier::Siblings(pattern))
    }

    pub fn after(self, path: Path) -> Self {
        self.with(QueryModifier::After(path))
    }

    pub fn at_or_after(self, path: Path) -> Self {
        self.with(QueryModifier::AtOrAfter(path))
    }

    pub fn before(self, path: Path) -> Self {
        self.with(QueryModifier::Before(path))
    }

    pub fn limit(self, n: usize) -> Self {
        self.with(QueryModifier::Limit(n))
    }

    /// Effective sort order: the last `Sorted` clause, ascending when none is given.
    pub fn order(&self) -> SortOrder {
        self.modifiers
            .iter()
            .rev()
            .find_map(|m| match m {
                QueryModifier::Sorted(order) => Some(*order),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Smallest `Limit` clause, if any.
    pub fn row_limit(&self) -> Option<usize> {
        self.modifiers
            .iter()
            .filter_map(|m| match m {
                QueryModifier::Limit(n) => Some(*n),
                _ => None,
            })
            .min()
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.modifiers.iter().all(|m| m.accepts(path))
    }

    /// Evaluate over `(path, id)` rows already sorted ascending by path.
    pub fn evaluate<'a, I>(&self, rows: I) -> Vec<NodeRecord>
    where
        I: DoubleEndedIterator<Item = (&'a Path, &'a NodeId)>,
    {
        let limit = self.row_limit().unwrap_or(usize::MAX);
        let keep = |(path, id): (&Path, &NodeId)| {
            self.accepts(path).then(|| NodeRecord::new(*id, path.clone()))
        };
        match self.order() {
            SortOrder::Asc => rows.filter_map(keep).take(limit).collect(),
            SortOrder::Desc => rows.rev().filter_map(keep).take(limit).collect(),
        }
    }
}

/// The slice of a stored record the core reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub path: Path,
}

impl NodeRecord {
    pub fn new(id: NodeId, path: Path) -> Self {
        Self { id, path }
    }

    pub fn is_placed(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn level(&self) -> usize {
        self.path.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(octants: &[u32]) -> Path {
        Path::from_octants(octants.to_vec())
    }

    fn rows() -> Vec<(Path, NodeId)> {
        let mut rows = vec![
            (p(&[1]), NodeId(1)),
            (p(&[1, 1]), NodeId(2)),
            (p(&[1, 2]), NodeId(3)),
            (p(&[1, 2, 1]), NodeId(4)),
            (p(&[2]), NodeId(5)),
        ];
        rows.sort();
        rows
    }

    fn ids(records: &[NodeRecord]) -> Vec<i64> {
        records.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn children_query_composes_by_path_not_and_end_level() {
        let rows = rows();
        let query = NodeQuery::new()
            .by_path(p(&[1]), true)
            .not(p(&[1]))
            .end_level(2)
            .sorted(SortOrder::Asc);
        let out = query.evaluate(rows.iter().map(|(p, id)| (p, id)));
        assert_eq!(ids(&out), vec![2, 3]);
    }

    #[test]
    fn ancestors_query_excludes_self() {
        let rows = rows();
        let query = NodeQuery::new().ancestors_of(p(&[1, 2, 1])).not(p(&[1, 2, 1]));
        let out = query.evaluate(rows.iter().map(|(p, id)| (p, id)));
        assert_eq!(ids(&out), vec![1, 3]);
    }

    #[test]
    fn descending_with_limit_takes_nearest() {
        let rows = rows();
        let query = NodeQuery::new()
            .siblings(SiblingPattern::new(p(&[1])))
            .before(p(&[1, 3]))
            .sorted(SortOrder::Desc)
            .limit(1);
        let out = query.evaluate(rows.iter().map(|(p, id)| (p, id)));
        assert_eq!(ids(&out), vec![3]);
    }

    #[test]
    fn root_and_not_root() {
        let rows = rows();
        let roots = NodeQuery::new().root().evaluate(rows.iter().map(|(p, id)| (p, id)));
        assert_eq!(ids(&roots), vec![1, 5]);
        let rest = NodeQuery::new().not_root().evaluate(rows.iter().map(|(p, id)| (p, id)));
        assert_eq!(ids(&rest), vec![2, 3, 4]);
    }
}
