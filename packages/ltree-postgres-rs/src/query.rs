use ltree_core::{NodeQuery, PathCodec, QueryModifier, SortOrder};

/// Positional parameters are always bound as text and cast server-side.
pub(crate) struct Compiled {
    pub where_sql: String,
    pub params: Vec<String>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl Compiled {
    fn bind(&mut self, value: String) -> String {
        self.params.push(value);
        format!("${}::text", self.params.len())
    }

    pub fn order_sql(&self, column: &str) -> String {
        let direction = match self.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let mut sql = format!(" ORDER BY \"{column}\" {direction}");
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        sql
    }
}

/// Translate a [`NodeQuery`] into `ltree` predicates over `column`.
pub(crate) fn compile(codec: &PathCodec, column: &str, query: &NodeQuery) -> Compiled {
    let col = format!("\"{column}\"");
    let mut out = Compiled {
        where_sql: String::new(),
        params: Vec::new(),
        order: query.order(),
        limit: query.row_limit(),
    };
    let mut clauses: Vec<String> = Vec::new();

    for modifier in query.modifiers() {
        let clause = match modifier {
            QueryModifier::Sorted(_) | QueryModifier::Limit(_) => continue,
            QueryModifier::Placed => format!("{col} IS NOT NULL"),
            QueryModifier::Root => format!("nlevel({col}) = 1"),
            QueryModifier::NotRoot => format!("nlevel({col}) > 1"),
            QueryModifier::ByPath { path, recursive } => match (path.is_empty(), recursive) {
                (true, true) => continue,
                (true, false) => "FALSE".to_string(),
                (false, true) => {
                    let p = out.bind(codec.encode(path));
                    format!("{col} <@ {p}::ltree")
                }
                (false, false) => {
                    let p = out.bind(codec.encode(path));
                    format!("{col} = {p}::ltree")
                }
            },
            QueryModifier::AncestorsOf(path) => {
                if path.is_empty() {
                    "FALSE".to_string()
                } else {
                    let p = out.bind(codec.encode(path));
                    format!("{col} @> {p}::ltree")
                }
            }
            QueryModifier::Not(path) => {
                if path.is_empty() {
                    continue;
                }
                let p = out.bind(codec.encode(path));
                format!("{col} <> {p}::ltree")
            }
            QueryModifier::Level(n) => format!("nlevel({col}) = {n}"),
            QueryModifier::StartLevel(n) => format!("nlevel({col}) >= {n}"),
            QueryModifier::EndLevel(n) => format!("nlevel({col}) <= {n}"),
            QueryModifier::Siblings(pattern) => {
                let lquery = if pattern.parent().is_empty() {
                    "*{1}".to_string()
                } else {
                    format!("{}.*{{1}}", codec.encode(pattern.parent()))
                };
                let p = out.bind(lquery);
                format!("{col} ~ {p}::lquery")
            }
            QueryModifier::After(path) => {
                let p = out.bind(codec.encode(path));
                format!("{col} > {p}::ltree")
            }
            QueryModifier::AtOrAfter(path) => {
                let p = out.bind(codec.encode(path));
                format!("{col} >= {p}::ltree")
            }
            QueryModifier::Before(path) => {
                let p = out.bind(codec.encode(path));
                format!("{col} < {p}::ltree")
            }
        };
        clauses.push(clause);
    }

    out.where_sql = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltree_core::{Path, SiblingPattern};

    #[test]
    fn sibling_groups_use_lquery() {
        let codec = PathCodec::default();
        let query = NodeQuery::new().siblings(SiblingPattern::new(Path::from_octants(vec![1, 2])));
        let compiled = compile(&codec, "path", &query);
        assert_eq!(
            compiled.where_sql,
            "\"path\" IS NOT NULL AND \"path\" ~ $1::text::lquery"
        );
        assert_eq!(compiled.params, vec!["0001.0002.*{1}".to_string()]);
    }

    #[test]
    fn subtree_scan_binds_in_order() {
        let codec = PathCodec::default();
        let parent = Path::from_octants(vec![3]);
        let query = NodeQuery::new()
            .by_path(parent.clone(), true)
            .not(parent)
            .sorted(SortOrder::Desc)
            .limit(2);
        let compiled = compile(&codec, "path", &query);
        assert!(compiled.where_sql.contains("<@ $1::text::ltree"));
        assert!(compiled.where_sql.contains("<> $2::text::ltree"));
        assert_eq!(compiled.order_sql("path"), " ORDER BY \"path\" DESC LIMIT 2");
    }
}
