//! TPS Core - Windowed Throughput Aggregation
//!
//! Turns block records into fixed-width windows with transactions-per-second
//! and transactions-per-minute metrics, and persists them idempotently.
//!
//! # Architecture
//!
//! ```text
//! SQLite blocks_0 / blocks_unconfirmed → SqliteBlockSource
//!     ↓
//! WindowPlanner (baseline, mode, interval-aligned windows)
//!     ↓
//! BlockFetcher (confirmed, + unconfirmed in follow mode)
//!     ↓
//! reconcile (dedupe by block hash)
//!     ↓
//! Aggregator (txs, blocks, tps, tpm per window; bounded fan-out)
//!     ↓
//! SqliteMetricsWriter → tps_0 (insert-or-ignore on start, end, type)
//! ```

pub mod aggregator;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod planner;
pub mod reconciler;
pub mod schema;
pub mod source;
pub mod sqlite_reader;
pub mod sqlite_writer;
pub mod types;
pub mod writer_backend;

pub use aggregator::Aggregator;
pub use error::{FetchError, TpsError, WriteError};
#[cfg(test)]
pub use memory::MemoryStore;
pub use planner::{align_end, choose_mode, WindowPlanner};
pub use reconciler::reconcile;
pub use source::{BlockFetcher, BlockSource};
pub use sqlite_reader::SqliteBlockSource;
pub use sqlite_writer::SqliteMetricsWriter;
pub use types::{BlockOrigin, BlockRecord, MetricsRecord, Mode, Phase, RunState, Timestamp, Window};
pub use writer_backend::MetricsSink;
