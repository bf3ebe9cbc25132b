//! In-memory block source and metrics sink for unit tests
//!
//! Same contracts as the SQLite backends, no I/O, plus failure injection.

use super::error::{FetchError, WriteError};
use super::source::BlockSource;
use super::types::{BlockOrigin, BlockRecord, MetricsRecord, Timestamp, Window};
use super::writer_backend::MetricsSink;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<Vec<BlockRecord>>,
    rows: Mutex<BTreeMap<(Timestamp, Timestamp, i64), MetricsRecord>>,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    unconfirmed_queries: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn push_block(&self, hash: &str, height: i64, timestamp: Timestamp, tx_count: u64, origin: BlockOrigin) {
        let block = BlockRecord {
            hash: hash.to_string(),
            height,
            timestamp,
            tx_count,
            origin,
        };
        self.blocks.lock().unwrap_or_else(|e| e.into_inner()).push(block);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn unconfirmed_queries(&self) -> usize {
        self.unconfirmed_queries.load(Ordering::SeqCst)
    }

    /// Number of non-empty `write_batch` calls
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Persisted rows ordered by `(start, end, kind)`
    pub fn rows(&self) -> Vec<MetricsRecord> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn range(&self, window: Window, origin: BlockOrigin) -> Result<Vec<BlockRecord>, FetchError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(FetchError::Task("injected fetch failure".to_string()));
        }
        let mut blocks: Vec<BlockRecord> = self
            .blocks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|b| b.origin == origin && b.timestamp >= window.start && b.timestamp < window.end)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.timestamp);
        Ok(blocks)
    }
}

#[async_trait]
impl BlockSource for MemoryStore {
    async fn fetch_confirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.range(window, BlockOrigin::Confirmed)
    }

    async fn fetch_unconfirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.unconfirmed_queries.fetch_add(1, Ordering::SeqCst);
        self.range(window, BlockOrigin::Unconfirmed)
    }

    async fn first_block_time(&self, height: Option<i64>) -> Result<Option<Timestamp>, FetchError> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        let confirmed = blocks.iter().filter(|b| b.origin == BlockOrigin::Confirmed);
        Ok(match height {
            Some(h) => confirmed.filter(|b| b.height == h).map(|b| b.timestamp).next(),
            None => confirmed.map(|b| b.timestamp).min(),
        })
    }

    async fn last_window_end(&self, kind: i64) -> Result<Option<Timestamp>, FetchError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.keys().filter(|(_, _, k)| *k == kind).map(|(_, end, _)| *end).max())
    }
}

#[async_trait]
impl MetricsSink for MemoryStore {
    async fn write_batch(&self, records: &[MetricsRecord]) -> Result<(), WriteError> {
        if records.is_empty() {
            return Ok(());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WriteError::Task("injected write failure".to_string()));
        }
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            rows.entry((record.start, record.end, record.kind))
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
