use ltree_core::{
    Error, NodeId, NodeQuery, NodeRecord, Path, PathCodec, PathConfig, PathStore, ReparentPlan,
    Result, ShiftPlan,
};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, trace};

use crate::filter::compile;

/// SQLite-backed [`PathStore`]: one row per record, `id INTEGER PRIMARY KEY` plus a unique,
/// nullable TEXT path column (NULL while unplaced).
pub struct SqlitePathStore {
    conn: Connection,
    codec: PathCodec,
}

impl SqlitePathStore {
    pub fn new_in_memory(config: PathConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn, config)
    }

    pub fn new(path: &str, config: PathConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn, config)
    }

    pub fn with_connection(conn: Connection, config: PathConfig) -> Result<Self> {
        let codec = PathCodec::new(config)?;
        let mut storage = Self { conn, codec };
        storage.ensure_schema()?;
        Ok(storage)
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    fn table(&self) -> &str {
        &self.codec.config().table
    }

    fn column(&self) -> &str {
        &self.codec.config().column
    }

    pub fn ensure_schema(&mut self) -> Result<()> {
        let (table, column) = (self.table(), self.column());
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    id INTEGER PRIMARY KEY,
                    \"{column}\" TEXT UNIQUE
                );"
            ))
            .map_err(|e| Error::Storage(e.to_string()))?;
        debug!(table, column, "sqlite path schema ready");
        Ok(())
    }

    /// Add a record with no path yet.
    pub fn insert_unplaced(&mut self, id: NodeId) -> Result<()> {
        let sql = format!("INSERT INTO \"{}\" (id) VALUES (?1)", self.table());
        self.conn
            .execute(&sql, params![id.0])
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn reset_for_tests(&mut self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DELETE FROM \"{}\";", self.table()))
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn decode(&self, label: Option<String>) -> Result<Path> {
        match label {
            Some(label) => self.codec.decode(&label),
            None => Ok(Path::empty()),
        }
    }

    fn load(&self, query: &NodeQuery) -> Result<Vec<(i64, String)>> {
        let filter = compile(&self.codec, self.column(), query);
        let mut stmt = self
            .conn
            .prepare(&filter.select_sql(self.table(), self.column()))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    fn set_path(&self, id: i64, label: Option<&str>) -> rusqlite::Result<usize> {
        let sql = format!(
            "UPDATE \"{}\" SET \"{}\" = ?1 WHERE id = ?2",
            self.table(),
            self.column()
        );
        self.conn.execute(&sql, params![label, id])
    }
}

impl PathStore for SqlitePathStore {
    fn query(&self, query: &NodeQuery) -> Result<Vec<NodeRecord>> {
        self.load(query)?
            .into_iter()
            .map(|(id, label)| Ok(NodeRecord::new(NodeId(id), self.codec.decode(&label)?)))
            .collect()
    }

    fn count(&self, query: &NodeQuery) -> Result<u64> {
        let filter = compile(&self.codec, self.column(), query);
        let count: i64 = self
            .conn
            .query_row(
                &filter.count_sql(self.table()),
                params_from_iter(filter.params.iter()),
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    fn find_by_id(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE id = ?1",
            self.column(),
            self.table()
        );
        let label: Option<Option<String>> = self
            .conn
            .query_row(&sql, params![id.0], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        match label {
            Some(label) => Ok(Some(NodeRecord::new(id, self.decode(label)?))),
            None => Ok(None),
        }
    }

    /// UNIQUE is checked per row and SQLite leaves multi-row UPDATE order unspecified, so
    /// the rows are rewritten one statement at a time in the plan's order.
    fn bulk_shift(&mut self, plan: &ShiftPlan) -> Result<u64> {
        let rows = self.load(&plan.scan_query())?;
        let mut touched = 0u64;
        for (id, label) in rows {
            let new = self.codec.encode(&plan.rewrite(&self.codec.decode(&label)?));
            touched += self
                .set_path(id, Some(&new))
                .map_err(|e| Error::Storage(format!("shift {label} -> {new}: {e}")))?
                as u64;
        }
        trace!(rows = touched, "sqlite shift applied");
        Ok(touched)
    }

    fn bulk_reparent(&mut self, plan: &ReparentPlan) -> Result<u64> {
        let old = self.codec.encode(plan.old_prefix());
        let new = self.codec.encode(plan.new_prefix());
        let old_len = old.chars().count();
        let sql = format!(
            "UPDATE \"{table}\" SET \"{col}\" = ?1 || substr(\"{col}\", {tail})
             WHERE substr(\"{col}\", 1, {prefix_len}) = ?2",
            table = self.table(),
            col = self.column(),
            tail = old_len + 1,
            prefix_len = old_len + 1,
        );
        let rows = self
            .conn
            .execute(&sql, params![new, format!("{old}{}", self.codec.separator())])
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(rows as u64)
    }

    fn assign_path(&mut self, id: NodeId, path: &Path) -> Result<()> {
        let label = (!path.is_empty()).then(|| self.codec.encode(path));
        match self.set_path(id.0, label.as_deref()) {
            Ok(0) => Err(Error::Storage(format!("unknown record {id}"))),
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, message))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::Validation {
                    path: label.unwrap_or_default(),
                    reason: message.unwrap_or_else(|| "unique constraint failed".into()),
                })
            }
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }

    fn delete_subtree(&mut self, node: &NodeRecord) -> Result<u64> {
        let table = self.table();
        let removed = self
            .conn
            .execute(&format!("DELETE FROM \"{table}\" WHERE id = ?1"), params![node.id.0])
            .map_err(|e| Error::Storage(e.to_string()))?;
        if removed == 0 || !node.is_placed() {
            return Ok(removed as u64);
        }
        let label = self.codec.encode(&node.path);
        let sql = format!(
            "DELETE FROM \"{table}\" WHERE substr(\"{col}\", 1, {len}) = ?1",
            col = self.column(),
            len = label.chars().count() + 1,
        );
        let descendants = self
            .conn
            .execute(&sql, params![format!("{label}{}", self.codec.separator())])
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok((removed + descendants) as u64)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::Storage(e.to_string()))
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::Storage(e.to_string()))
    }
}
