//! Window planning: baseline, mode choice and interval-aligned boundaries

use super::error::TpsError;
use super::source::BlockSource;
use super::types::{Mode, Timestamp, Window};
use crate::config::TpsConfig;
use std::sync::Arc;

/// Floor `raw_end` onto the interval grid anchored at `start`.
///
/// The result is `start + k * interval` for the largest `k >= 0` that does
/// not pass `raw_end`. Every window boundary in the crate comes from here.
pub fn align_end(start: Timestamp, raw_end: Timestamp, interval: i64) -> Timestamp {
    if raw_end <= start {
        return start;
    }
    start + interval * ((raw_end - start) / interval)
}

/// Backfill when the gap to `now` is at least `batch_limit`
pub fn choose_mode(start: Timestamp, now: Timestamp, batch_limit: i64) -> Mode {
    if start <= now - batch_limit {
        Mode::Backfill
    } else {
        Mode::Follow
    }
}

/// Contiguous interval-wide sub-windows covering `span`
///
/// `span` must already be aligned; a trailing partial interval is never emitted.
pub fn slice(span: Window, interval: i64) -> Vec<Window> {
    let end = align_end(span.start, span.end, interval);
    (span.start..end)
        .step_by(interval as usize)
        .map(|start| Window::new(start, start + interval))
        .collect()
}

pub struct WindowPlanner {
    source: Arc<dyn BlockSource>,
    interval: i64,
    batch_limit: i64,
    chunk: i64,
    metric_kind: i64,
    baseline_height: Option<i64>,
}

impl WindowPlanner {
    pub fn new(source: Arc<dyn BlockSource>, config: &TpsConfig) -> Self {
        Self {
            source,
            interval: config.interval_secs,
            batch_limit: config.batch_limit_secs,
            chunk: config.batch_day_interval_secs,
            metric_kind: config.metric_kind,
            baseline_height: config.baseline_height,
        }
    }

    /// `max(first block time, last persisted window end)`
    pub async fn plan_start(&self) -> Result<Timestamp, TpsError> {
        let first_block = self
            .source
            .first_block_time(self.baseline_height)
            .await?
            .ok_or(TpsError::NoBaseline)?;

        let last_end = self.source.last_window_end(self.metric_kind).await?;

        let start = match last_end {
            Some(end) => first_block.max(end),
            None => first_block,
        };

        log::info!(
            "📐 Planned start: first block={} last persisted end={:?} → start={}",
            first_block,
            last_end,
            start
        );

        Ok(start)
    }

    pub fn choose_mode(&self, start: Timestamp, now: Timestamp) -> Mode {
        choose_mode(start, now, self.batch_limit)
    }

    pub fn align_end(&self, start: Timestamp, raw_end: Timestamp) -> Timestamp {
        align_end(start, raw_end, self.interval)
    }

    /// Next backfill chunk starting at `mark`, or `None` once caught up
    ///
    /// Backfill stops `batch_limit` short of `now`; that trailing span belongs to
    /// follow mode, which also reads unconfirmed blocks.
    pub fn next_backfill_chunk(&self, mark: Timestamp, now: Timestamp) -> Option<Window> {
        let cutoff = self.align_end(mark, now - self.batch_limit);
        let end = cutoff.min(mark + self.chunk);
        if end <= mark {
            None
        } else {
            Some(Window::new(mark, end))
        }
    }

    /// Span for a follow tick, or `None` when no full interval has elapsed
    pub fn follow_span(&self, mark: Timestamp, now: Timestamp) -> Option<Window> {
        let end = self.align_end(mark, now);
        if end == mark {
            None
        } else {
            Some(Window::new(mark, end))
        }
    }
}
