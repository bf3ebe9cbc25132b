//! Shared SQLite connection tuning
//!
//! Every connection (read pool and writer) goes through here so the
//! database runs in WAL mode with consistent checkpointing.

use rusqlite::Connection;
use std::time::Duration;

/// Apply WAL, NORMAL sync, in-memory temp store, mmap, cache and autocheckpoint
pub fn apply_optimized_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    // journal_mode returns a row, pragma_update handles that
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "cache_size", -64_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000i64)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}
