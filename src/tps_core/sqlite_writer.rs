//! SQLite writer for TPS metrics
//!
//! Insert-or-ignore on the `(start, end, type)` unique key: replaying a window
//! never changes a row that is already stored. Rows go out in multi-row
//! statements of at most `max_insert_batch_size`.

use super::error::{TpsError, WriteError};
use super::types::MetricsRecord;
use super::writer_backend::MetricsSink;
use crate::config::{MetricsColumn, TpsConfig};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn column_value(column: MetricsColumn, record: &MetricsRecord) -> Value {
    match column {
        MetricsColumn::Start => Value::Integer(record.start),
        MetricsColumn::End => Value::Integer(record.end),
        MetricsColumn::Txs => Value::Integer(record.txs as i64),
        MetricsColumn::Blocks => Value::Integer(record.blocks as i64),
        MetricsColumn::Tps => Value::Real(record.tps),
        MetricsColumn::Tpm => Value::Real(record.tpm),
        MetricsColumn::Kind => Value::Integer(record.kind),
    }
}

pub struct SqliteMetricsWriter {
    conn: Arc<Mutex<Connection>>,
    table: String,
    columns: Vec<MetricsColumn>,
    max_batch: usize,
}

impl SqliteMetricsWriter {
    /// Open the writer connection. The metrics table must already exist.
    ///
    /// An unknown entry in `table_columns` fails with `TpsError::Config`.
    pub fn new(config: &TpsConfig) -> Result<Self, TpsError> {
        let columns = config.metrics_columns()?;

        let conn = Connection::open(&config.db_path).map_err(WriteError::from)?;
        apply_optimized_pragmas(&conn).map_err(WriteError::from)?;

        log::info!(
            "✅ SQLite metrics writer initialized: table={} columns={:?} max_batch={}",
            config.table_name,
            config.table_columns,
            config.max_insert_batch_size
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: config.table_name.clone(),
            columns,
            max_batch: config.max_insert_batch_size.max(1),
        })
    }

    fn insert_sql(&self, rows: usize) -> String {
        let keys = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let blank = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![blank; rows].join(", ");

        format!(
            "INSERT OR IGNORE INTO \"{}\" ({}) VALUES {}",
            self.table, keys, values
        )
    }

    /// One `(sql, params)` pair per chunk of at most `max_batch` records
    fn insert_statements(&self, records: &[MetricsRecord]) -> Vec<(String, Vec<Value>)> {
        records
            .chunks(self.max_batch)
            .map(|chunk| {
                let values = chunk
                    .iter()
                    .flat_map(|record| self.columns.iter().map(move |&c| column_value(c, record)))
                    .collect();
                (self.insert_sql(chunk.len()), values)
            })
            .collect()
    }
}

#[async_trait]
impl MetricsSink for SqliteMetricsWriter {
    async fn write_batch(&self, records: &[MetricsRecord]) -> Result<(), WriteError> {
        if records.is_empty() {
            return Ok(());
        }

        let statements = self.insert_statements(records);
        let conn = self.conn.clone();
        let total = records.len();

        tokio::task::spawn_blocking(move || -> Result<usize, WriteError> {
            let conn = conn
                .lock()
                .map_err(|_| WriteError::Task("writer connection mutex poisoned".to_string()))?;

            let mut inserted = 0;
            // One statement per chunk; a failure leaves earlier chunks committed
            for (sql, values) in &statements {
                inserted += conn.execute(sql, rusqlite::params_from_iter(values.iter()))?;
            }
            Ok(inserted)
        })
        .await
        .map_err(|e| WriteError::Task(e.to_string()))?
        .map(|inserted| {
            log::debug!(
                "✅ Wrote {} metrics rows ({} new, {} already present)",
                total,
                inserted,
                total - inserted
            );
        })
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
