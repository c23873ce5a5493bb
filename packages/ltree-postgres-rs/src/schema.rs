use postgres::Client;
use ltree_core::{Error, PathConfig, Result};
use tracing::debug;

const SCHEMA_LOCK_KEY: i64 = 0x6c74_7265_655f_6964; // "ltree_id"

fn schema_sql(config: &PathConfig) -> String {
    let PathConfig {
        schema,
        table,
        column,
        ..
    } = config;
    format!(
        r#"
CREATE EXTENSION IF NOT EXISTS ltree;
CREATE SCHEMA IF NOT EXISTS "{schema}";

CREATE TABLE IF NOT EXISTS "{schema}"."{table}" (
  id BIGINT PRIMARY KEY,
  "{column}" ltree,
  CONSTRAINT "{table}_{column}_key" UNIQUE ("{column}") DEFERRABLE INITIALLY IMMEDIATE
);

CREATE INDEX IF NOT EXISTS "{table}_{column}_gist"
  ON "{schema}"."{table}" USING GIST ("{column}");
"#
    )
}

/// Create the extension, table, unique constraint and GiST index for `config`.
///
/// The unique constraint is deferrable, so Postgres checks it at the end of each statement
/// instead of row by row; set-based sibling shifts depend on that.
pub fn ensure_schema(client: &mut Client, config: &PathConfig) -> Result<()> {
    config.validate()?;
    // Concurrent `CREATE ... IF NOT EXISTS` can still race on the catalog.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(|e| Error::Storage(format!("{e:?}")))?;

    let res = client
        .batch_execute(&schema_sql(config))
        .map_err(|e| Error::Storage(format!("{e:?}")));

    // Locks are also released when the connection is dropped.
    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    if res.is_ok() {
        debug!(schema = %config.schema, table = %config.table, "postgres path schema ready");
    }
    res
}

pub fn reset_for_tests(client: &mut Client, config: &PathConfig) -> Result<()> {
    client
        .execute(
            &format!("DELETE FROM \"{}\".\"{}\"", config.schema, config.table),
            &[],
        )
        .map_err(|e| Error::Storage(format!("{e:?}")))?;
    Ok(())
}
