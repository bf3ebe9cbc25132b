//! Writer backend trait for TPS metrics
//!
//! Defines the interface for persisting aggregated windows.

use super::error::WriteError;
use super::types::MetricsRecord;
use async_trait::async_trait;

/// Backend trait for writing metrics rows
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Upsert keyed on `(start, end, kind)`; existing rows are left untouched.
    /// Empty input is a no-op.
    async fn write_batch(&self, records: &[MetricsRecord]) -> Result<(), WriteError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
