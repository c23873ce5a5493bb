use std::cell::RefCell;
use std::rc::Rc;

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::Client;
use tracing::trace;

use ltree_core::{
    Error, NodeId, NodeQuery, NodeRecord, Path, PathCodec, PathConfig, PathStore, ReparentPlan,
    Result, ShiftDelta, ShiftPlan,
};

use crate::query::compile;

fn storage_debug<E: std::fmt::Debug>(e: E) -> Error {
    Error::Storage(format!("{e:?}"))
}

fn as_params(values: &[String]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// [`PathStore`] over one Postgres table with an `ltree` path column.
///
/// The client is shared so callers can keep issuing their own statements on the same
/// connection (and inside the same transaction).
pub struct PgPathStore {
    client: Rc<RefCell<Client>>,
    codec: PathCodec,
    table: String,
}

impl PgPathStore {
    /// Fails with `InvalidConfig` unless the separator is `'.'`, the only one `ltree` knows.
    pub fn new(client: Rc<RefCell<Client>>, config: PathConfig) -> Result<Self> {
        if config.separator != '.' {
            return Err(Error::InvalidConfig(format!(
                "ltree paths are '.'-separated, got {:?}",
                config.separator
            )));
        }
        let table = format!("\"{}\".\"{}\"", config.schema, config.table);
        let codec = PathCodec::new(config)?;
        Ok(Self {
            client,
            codec,
            table,
        })
    }

    pub fn client(&self) -> &Rc<RefCell<Client>> {
        &self.client
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    fn column(&self) -> &str {
        &self.codec.config().column
    }

    pub fn insert_unplaced(&mut self, id: NodeId) -> Result<()> {
        let sql = format!("INSERT INTO {} (id) VALUES ($1)", self.table);
        self.client
            .borrow_mut()
            .execute(&sql, &[&id.0])
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn decode(&self, label: Option<String>) -> Result<Path> {
        match label {
            Some(label) => self.codec.decode(&label),
            None => Ok(Path::empty()),
        }
    }
}

impl PathStore for PgPathStore {
    fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>> {
        let col = self.column();
        let compiled = compile(&self.codec, col, query);
        let sql = format!(
            "SELECT id, \"{col}\"::text FROM {} WHERE {}{}",
            self.table,
            compiled.where_sql,
            compiled.order_sql(col)
        );
        let rows = self
            .client
            .borrow_mut()
            .query(&sql, &as_params(&compiled.params))
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get(0);
            let label: Option<String> = row.get(1);
            out.push(NodeRecord::new(NodeId(id), self.decode(label)?));
        }
        Ok(out)
    }

    fn count(&self, query: &NodeQuery) -> Result<u64> {
        let compiled = compile(&self.codec, self.column(), query);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", self.table, compiled.where_sql);
        let row = self
            .client
            .borrow_mut()
            .query_one(&sql, &as_params(&compiled.params))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    fn find_by_id(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        let sql = format!(
            "SELECT \"{}\"::text FROM {} WHERE id = $1",
            self.column(),
            self.table
        );
        let row = self
            .client
            .borrow_mut()
            .query_opt(&sql, &[&id.0])
            .map_err(|e| Error::Storage(e.to_string()))?;
        match row {
            Some(row) => Ok(Some(NodeRecord::new(id, self.decode(row.get(0))?))),
            None => Ok(None),
        }
    }

    /// One UPDATE over an ordered subquery. Each row's octant at the group level is parsed,
    /// moved by one and re-padded; prefix and descendant suffix are spliced back around it.
    fn bulk_shift(&mut self, plan: &ShiftPlan) -> Result<u64> {
        let col = self.column();
        let compiled = compile(&self.codec, col, &plan.scan_query());
        let index = plan.octant_index();
        let delta = match plan.delta() {
            ShiftDelta::Up => "+ 1",
            ShiftDelta::Down => "- 1",
        };
        let head = if index > 0 {
            format!("subpath(\"{col}\", 0, {index})")
        } else {
            "''::ltree".to_string()
        };
        let sql = format!(
            "UPDATE {table} AS t SET \"{col}\" = s.new_path
             FROM (
               SELECT id,
                 {head}
                 || text2ltree(lpad((ltree2text(subpath(\"{col}\", {index}, 1))::int {delta})::text, {width}, '0'))
                 || (CASE WHEN nlevel(\"{col}\") > {next} THEN subpath(\"{col}\", {next}) ELSE ''::ltree END)
                 AS new_path
               FROM {table}
               WHERE {filter}{order}
             ) AS s
             WHERE t.id = s.id",
            table = self.table,
            width = self.codec.width(),
            next = index + 1,
            filter = compiled.where_sql,
            order = compiled.order_sql(col),
        );
        let rows = self
            .client
            .borrow_mut()
            .execute(&sql, &as_params(&compiled.params))
            .map_err(storage_debug)?;
        trace!(rows, pivot = %self.codec.encode(&plan.pivot()), "postgres shift applied");
        Ok(rows)
    }

    fn bulk_reparent(&mut self, plan: &ReparentPlan) -> Result<u64> {
        let col = self.column();
        let sql = format!(
            "UPDATE {table}
             SET \"{col}\" = $1::text::ltree || subpath(\"{col}\", nlevel($2::text::ltree))
             WHERE \"{col}\" <@ $2::text::ltree AND \"{col}\" <> $2::text::ltree",
            table = self.table,
        );
        let old = self.codec.encode(plan.old_prefix());
        let new = self.codec.encode(plan.new_prefix());
        self.client
            .borrow_mut()
            .execute(&sql, &[&new, &old])
            .map_err(storage_debug)
    }

    fn assign_path(&mut self, id: NodeId, path: &Path) -> Result<()> {
        let label = (!path.is_empty()).then(|| self.codec.encode(path));
        let sql = format!(
            "UPDATE {} SET \"{}\" = $1::text::ltree WHERE id = $2",
            self.table,
            self.column()
        );
        let res = self.client.borrow_mut().execute(&sql, &[&label, &id.0]);
        match res {
            Ok(0) => Err(Error::Storage(format!("unknown record {id}"))),
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(Error::Validation {
                path: label.unwrap_or_default(),
                reason: e
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| e.to_string()),
            }),
            Err(e) => Err(storage_debug(e)),
        }
    }

    fn delete_subtree(&mut self, node: &NodeRecord) -> Result<u64> {
        let mut client = self.client.borrow_mut();
        let removed = client
            .execute(&format!("DELETE FROM {} WHERE id = $1", self.table), &[&node.id.0])
            .map_err(storage_debug)?;
        if removed == 0 || !node.is_placed() {
            return Ok(removed);
        }
        let label = self.codec.encode(&node.path);
        let descendants = client
            .execute(
                &format!(
                    "DELETE FROM {} WHERE \"{}\" <@ $1::text::ltree",
                    self.table,
                    self.column()
                ),
                &[&label],
            )
            .map_err(storage_debug)?;
        Ok(removed + descendants)
    }

    fn begin(&mut self) -> Result<()> {
        self.client
            .borrow_mut()
            .batch_execute("BEGIN")
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn commit(&mut self) -> Result<()> {
        self.client
            .borrow_mut()
            .batch_execute("COMMIT")
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn rollback(&mut self) -> Result<()> {
        self.client
            .borrow_mut()
            .batch_execute("ROLLBACK")
            .map_err(|e| Error::Storage(e.to_string()))
    }
}
