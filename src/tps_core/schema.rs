//! Idempotent schema setup for block and metrics tables
//!
//! Block tables are normally owned by the chain scanner; creating them here
//! with `IF NOT EXISTS` is harmless and lets a fresh database start cleanly.
//! Table names come from validated config, so quoting them is enough.

use crate::config::TpsConfig;
use rusqlite::Connection;

pub fn ensure_schema(conn: &Connection, config: &TpsConfig) -> Result<(), rusqlite::Error> {
    for table in [&config.confirmed_table, &config.unconfirmed_table] {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                block_hash   TEXT PRIMARY KEY,
                block_height INTEGER NOT NULL,
                time         INTEGER NOT NULL,
                tx_count     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS "idx_{table}_time" ON "{table}"(time);
            CREATE INDEX IF NOT EXISTS "idx_{table}_height" ON "{table}"(block_height);
            "#,
            table = table
        ))?;
    }

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            "start" INTEGER NOT NULL,
            "end"   INTEGER NOT NULL,
            txs     INTEGER,
            blocks  INTEGER,
            tps     REAL,
            tpm     REAL,
            "type"  INTEGER NOT NULL,
            UNIQUE ("start", "end", "type")
        );
        CREATE INDEX IF NOT EXISTS "idx_{table}_end" ON "{table}"("type", "end" DESC);
        "#,
        table = config.table_name
    ))?;

    log::info!(
        "✅ Schema ready: {}, {}, {}",
        config.confirmed_table,
        config.unconfirmed_table,
        config.table_name
    );

    Ok(())
}
