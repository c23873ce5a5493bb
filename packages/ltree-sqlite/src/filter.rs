use ltree_core::{NodeQuery, Path, PathCodec, QueryModifier, SortOrder};
use rusqlite::types::Value;

/// A [`NodeQuery`] compiled to a WHERE clause with positional `?` parameters.
pub(crate) struct Filter {
    pub where_sql: String,
    pub params: Vec<Value>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn select_sql(&self, table: &str, column: &str) -> String {
        let direction = match self.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let mut sql = format!(
            "SELECT id, \"{column}\" FROM \"{table}\" WHERE {} ORDER BY \"{column}\" {direction}",
            self.where_sql
        );
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        sql
    }

    pub fn count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM \"{table}\" WHERE {}", self.where_sql)
    }
}

/// Label length of a path at `level`: `level` octants plus the separators between them.
fn level_len(codec: &PathCodec, level: usize) -> i64 {
    level as i64 * (codec.width() as i64 + 1) - 1
}

pub(crate) fn compile(codec: &PathCodec, column: &str, query: &NodeQuery) -> Filter {
    let col = format!("\"{column}\"");
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    let sep = codec.separator();

    for modifier in query.modifiers() {
        match modifier {
            QueryModifier::Sorted(_) | QueryModifier::Limit(_) => {}
            QueryModifier::Placed => clauses.push(format!("{col} IS NOT NULL")),
            QueryModifier::Root => clauses.push(format!("length({col}) = {}", level_len(codec, 1))),
            QueryModifier::NotRoot => {
                clauses.push(format!("length({col}) > {}", level_len(codec, 1)))
            }
            QueryModifier::ByPath { path, recursive } => {
                if path.is_empty() {
                    if !recursive {
                        clauses.push("0".into());
                    }
                    continue;
                }
                let label = codec.encode(path);
                if *recursive {
                    let prefix_len = level_len(codec, path.level()) + 1;
                    clauses.push(format!("({col} = ? OR substr({col}, 1, {prefix_len}) = ?)"));
                    let prefix = format!("{label}{sep}");
                    params.push(Value::Text(label));
                    params.push(Value::Text(prefix));
                } else {
                    clauses.push(format!("{col} = ?"));
                    params.push(Value::Text(label));
                }
            }
            QueryModifier::AncestorsOf(path) => {
                if path.is_empty() {
                    clauses.push("0".into());
                    continue;
                }
                let holes = vec!["?"; path.level()].join(", ");
                clauses.push(format!("{col} IN ({holes})"));
                for level in 1..=path.level() {
                    let prefix = Path::from_octants(path.octants()[..level].to_vec());
                    params.push(Value::Text(codec.encode(&prefix)));
                }
            }
            QueryModifier::Not(path) => {
                if !path.is_empty() {
                    clauses.push(format!("{col} <> ?"));
                    params.push(Value::Text(codec.encode(path)));
                }
            }
            QueryModifier::Level(n) => {
                clauses.push(format!("length({col}) = {}", level_len(codec, *n)))
            }
            QueryModifier::StartLevel(n) => {
                clauses.push(format!("length({col}) >= {}", level_len(codec, *n)))
            }
            QueryModifier::EndLevel(n) => {
                clauses.push(format!("length({col}) <= {}", level_len(codec, *n)))
            }
            QueryModifier::Siblings(pattern) => {
                let member_len = level_len(codec, pattern.level());
                if pattern.parent().is_empty() {
                    clauses.push(format!("length({col}) = {member_len}"));
                } else {
                    let prefix_len = level_len(codec, pattern.parent().level()) + 1;
                    clauses.push(format!(
                        "substr({col}, 1, {prefix_len}) = ? AND length({col}) = {member_len}"
                    ));
                    params.push(Value::Text(format!(
                        "{}{sep}",
                        codec.encode(pattern.parent())
                    )));
                }
            }
            QueryModifier::After(path) => {
                clauses.push(format!("{col} > ?"));
                params.push(Value::Text(codec.encode(path)));
            }
            QueryModifier::AtOrAfter(path) => {
                clauses.push(format!("{col} >= ?"));
                params.push(Value::Text(codec.encode(path)));
            }
            QueryModifier::Before(path) => {
                clauses.push(format!("{col} < ?"));
                params.push(Value::Text(codec.encode(path)));
            }
        }
    }

    let where_sql = if clauses.is_empty() {
        "1".to_string()
    } else {
        clauses.join(" AND ")
    };
    Filter {
        where_sql,
        params,
        order: query.order(),
        limit: query.row_limit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltree_core::SiblingPattern;

    fn p(octants: &[u32]) -> Path {
        Path::from_octants(octants.to_vec())
    }

    #[test]
    fn recursive_path_binds_label_then_prefix() {
        let codec = PathCodec::default();
        let filter = compile(&codec, "path", &NodeQuery::new().by_path(p(&[1, 2]), true));
        assert_eq!(
            filter.where_sql,
            "\"path\" IS NOT NULL AND (\"path\" = ? OR substr(\"path\", 1, 10) = ?)"
        );
        assert_eq!(
            filter.params,
            vec![
                Value::Text("0001.0002".into()),
                Value::Text("0001.0002.".into())
            ]
        );
    }

    #[test]
    fn sibling_group_uses_prefix_and_length() {
        let codec = PathCodec::default();
        let query = NodeQuery::new()
            .siblings(SiblingPattern::new(p(&[1])))
            .sorted(SortOrder::Desc)
            .limit(1);
        let filter = compile(&codec, "path", &query);
        assert!(filter.where_sql.ends_with("substr(\"path\", 1, 5) = ? AND length(\"path\") = 9"));
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(filter.limit, Some(1));
        assert!(filter.select_sql("nodes", "path").ends_with("DESC LIMIT 1"));
    }

    #[test]
    fn root_siblings_and_ancestors() {
        let codec = PathCodec::default();
        let roots = compile(&codec, "path", &NodeQuery::new().siblings(SiblingPattern::new(Path::empty())));
        assert!(roots.where_sql.ends_with("length(\"path\") = 4"));
        let ancestors = compile(&codec, "path", &NodeQuery::new().ancestors_of(p(&[1, 2, 3])));
        assert_eq!(ancestors.params.len(), 3);
        assert_eq!(ancestors.params[0], Value::Text("0001".into()));
    }
}
