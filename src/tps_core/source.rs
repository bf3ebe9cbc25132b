//! Block source trait and the per-window fetcher

use super::error::FetchError;
use super::reconciler::reconcile;
use super::types::{BlockRecord, Mode, Timestamp, Window};
use async_trait::async_trait;
use std::sync::Arc;

/// Read side of storage
///
/// All range queries are half-open: `start <= time < end`.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_confirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError>;

    async fn fetch_unconfirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError>;

    /// Time of the baseline block: the block at `height` if given, else the earliest confirmed block
    async fn first_block_time(&self, height: Option<i64>) -> Result<Option<Timestamp>, FetchError>;

    /// Highest persisted window end for metrics rows of `kind`
    async fn last_window_end(&self, kind: i64) -> Result<Option<Timestamp>, FetchError>;
}

/// Fetches one window's blocks and reconciles the two sources
#[derive(Clone)]
pub struct BlockFetcher {
    source: Arc<dyn BlockSource>,
}

impl BlockFetcher {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        Self { source }
    }

    pub async fn fetch_confirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.source.fetch_confirmed(window).await
    }

    pub async fn fetch_unconfirmed(&self, window: Window) -> Result<Vec<BlockRecord>, FetchError> {
        self.source.fetch_unconfirmed(window).await
    }

    /// Deduplicated blocks for `window`. Unconfirmed is only read in follow mode.
    pub async fn fetch_window(&self, window: Window, mode: Mode) -> Result<Vec<BlockRecord>, FetchError> {
        if !mode.reads_unconfirmed() {
            return self.fetch_confirmed(window).await;
        }

        let (confirmed, unconfirmed) =
            tokio::try_join!(self.fetch_confirmed(window), self.fetch_unconfirmed(window))?;

        log::debug!(
            "📥 {} confirmed={} unconfirmed={}",
            window,
            confirmed.len(),
            unconfirmed.len()
        );

        Ok(reconcile(confirmed, unconfirmed))
    }
}
