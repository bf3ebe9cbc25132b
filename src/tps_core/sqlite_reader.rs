//! SQLite block reader with a small pool of read-only connections
//!
//! rusqlite is blocking, so every query runs on `spawn_blocking`. One
//! connection per concurrent sub-window query lets WAL readers proceed in
//! parallel instead of queueing on a single handle.

use super::error::FetchError;
use super::source::BlockSource;
use super::types::{BlockOrigin, BlockRecord, Timestamp, Window};
use crate::config::TpsConfig;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct ReadPool {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl ReadPool {
    fn open(db_path: &Path, size: usize) -> Result<Self, FetchError> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            let conn = Connection::open(db_path)?;
            apply_optimized_pragmas(&conn)?;
            // Must come after the PRAGMAs
            conn.execute_batch("PRAGMA query_only = ON")?;
            conns.push(Mutex::new(conn));
        }
        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, FetchError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let conn = self.conns[idx]
            .lock()
            .map_err(|_| FetchError::Task("read connection mutex poisoned".to_string()))?;
        Ok(f(&conn)?)
    }
}

pub struct SqliteBlockSource {
    pool: Arc<ReadPool>,
    confirmed_sql: Arc<str>,
    unconfirmed_sql: Arc<str>,
    earliest_sql: String,
    at_height_sql: String,
    last_end_sql: String,
}

impl SqliteBlockSource {
    /// Open `config.max_query_concurrency` read connections to `config.db_path`
    ///
    /// Tables must already exist (see `schema::ensure_schema`).
    pub fn new(config: &TpsConfig) -> Result<Self, FetchError> {
        let pool = ReadPool::open(Path::new(&config.db_path), config.max_query_concurrency)?;

        let range_sql = |table: &str| -> Arc<str> {
            format!(
                r#"SELECT block_hash, block_height, time, tx_count FROM "{}"
                   WHERE time >= ?1 AND time < ?2
                   ORDER BY time ASC"#,
                table
            )
            .into()
        };

        log::info!(
            "📥 SQLite block reader initialized: {} read connections",
            pool.conns.len()
        );

        Ok(Self {
            pool: Arc::new(pool),
            confirmed_sql: range_sql(&config.confirmed_table),
            unconfirmed_sql: range_sql(&config.unconfirmed_table),
            earliest_sql: format!(r#"SELECT MIN(time) FROM "{}""#, config.confirmed_table),
            at_height_sql: format!(
                r#"SELECT time FROM "{}" WHERE block_height = ?1 LIMIT 1"#,
                config.confirmed_table
            ),
            last_end_sql: format!(
                r#"SELECT MAX("end") FROM "{}" WHERE "type" = ?1"#,
                config.table_name
            ),
        })
    }

    async fn fetch_range(
        &self,
        sql: Arc<str>,
        window: Window,
        origin: BlockOrigin,
    ) -> Result<Vec<BlockRecord>, FetchError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_conn(|conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![window.start, window.end], |row| {
                    let tx_count: i64 = row.get(3)?;
                    Ok(BlockRecord {
                        hash: row.get(0)?,
                        height: row.get(1)?,
                        timestamp: row.get(2)?,
                        tx_count: tx_count.max(0) as u64,
                        origin,
                    })
                })?;
                let blocks = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(blocks)
            })
        })
        .await
        .map_err(|e| FetchError::Task(e.to_string()))?
    }

    async fn query_scalar(&self, sql: String, param: Option<i64>) -> Result<Option<i64>, FetchError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.with_conn(|conn| {
                let value: Option<Option<i64>> = match param {
                    Some(p) => conn.query_row(&sql, params![p], |row| row.get(0)).optional()?,
                    None => conn.query_row(&sql, [], |row| row.get(0)).optional()?,
                };
                Ok(value.flatten())
            })
        })
        .await
        .map_err(|e| FetchError::Task(e.to_string()))?
    }
}

#[async_trait]
impl BlockSource for SqliteBlockSource {
    async fn fetch_confirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.fetch_range(self.confirmed_sql.clone(), window, BlockOrigin::Confirmed)
            .await
    }

    async fn fetch_unconfirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.fetch_range(self.unconfirmed_sql.clone(), window, BlockOrigin::Unconfirmed)
            .await
    }

    async fn first_block_time(&self, height: Option<i64>) -> Result<Option<Timestamp>, FetchError> {
        match height {
            Some(h) => self.query_scalar(self.at_height_sql.clone(), Some(h)).await,
            None => self.query_scalar(self.earliest_sql.clone(), None).await,
        }
    }

    async fn last_window_end(&self, kind: i64) -> Result<Option<Timestamp>, FetchError> {
        self.query_scalar(self.last_end_sql.clone(), Some(kind)).await
    }
}
