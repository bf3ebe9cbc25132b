//! Per-window throughput metrics and the sub-window fan-out

use super::error::FetchError;
use super::planner::slice;
use super::source::BlockFetcher;
use super::types::{format_ts, BlockRecord, MetricsRecord, Mode, Window};
use crate::config::TpsConfig;
use futures_util::future::try_join_all;

/// Reduces a block set to one metrics row
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    interval_secs: i64,
    kind: i64,
}

impl Aggregator {
    pub fn new(config: &TpsConfig) -> Self {
        Self {
            interval_secs: config.interval_secs,
            kind: config.metric_kind,
        }
    }

    pub fn aggregate(&self, window: Window, blocks: &[BlockRecord]) -> MetricsRecord {
        let txs: u64 = blocks.iter().map(|b| b.tx_count).sum();
        let interval = self.interval_secs as f64;

        MetricsRecord {
            start: window.start,
            end: window.end,
            blocks: blocks.len() as u64,
            txs,
            tps: txs as f64 / interval,
            tpm: txs as f64 * 60.0 / interval,
            kind: self.kind,
        }
    }

    /// Fetch and aggregate every interval-wide sub-window of `span`
    ///
    /// Sub-windows run in groups of at most `max_concurrency`; a group starts
    /// only after the previous one has finished. Output is in time order.
    pub async fn aggregate_span(
        &self,
        fetcher: &BlockFetcher,
        span: Window,
        mode: Mode,
        max_concurrency: usize,
    ) -> Result<Vec<MetricsRecord>, FetchError> {
        let windows = slice(span, self.interval_secs);
        let mut results = Vec::with_capacity(windows.len());

        for group in windows.chunks(max_concurrency.max(1)) {
            let records = try_join_all(group.iter().map(|&window| async move {
                let blocks = fetcher.fetch_window(window, mode).await?;
                Ok::<_, FetchError>(self.aggregate(window, &blocks))
            }))
            .await?;

            if let (Some(first), Some(last)) = (group.first(), group.last()) {
                log::debug!(
                    "📊 {} group {} → {} ({} windows)",
                    mode.as_str(),
                    format_ts(first.start),
                    format_ts(last.end),
                    group.len()
                );
            }

            results.extend(records);
        }

        Ok(results)
    }
}
