//! Driver: Init → Backfilling → Following
//!
//! `RunState` is passed into and returned from every cycle. A cycle fetches,
//! aggregates and writes a span; the mark only moves after the write succeeds.

use super::scheduler::Tick;
use crate::config::{FollowFailurePolicy, TpsConfig};
use crate::tps_core::{
    types::format_ts, Aggregator, BlockFetcher, BlockSource, MetricsSink, Mode, Phase, RunState,
    Timestamp, TpsError, Window, WindowPlanner,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Source of "now" in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Less than one interval elapsed since the mark
    Idle,
    Written { window: Window, rows: usize },
}

pub struct Driver {
    planner: WindowPlanner,
    fetcher: BlockFetcher,
    aggregator: Aggregator,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    max_query_concurrency: usize,
    failure_policy: FollowFailurePolicy,
}

impl Driver {
    pub fn new(
        config: &TpsConfig,
        source: Arc<dyn BlockSource>,
        sink: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            planner: WindowPlanner::new(source.clone(), config),
            fetcher: BlockFetcher::new(source),
            aggregator: Aggregator::new(config),
            sink,
            clock,
            max_query_concurrency: config.max_query_concurrency,
            failure_policy: config.follow_failure_policy,
        }
    }

    pub fn planner(&self) -> &WindowPlanner {
        &self.planner
    }

    /// Establish the baseline. `NoBaseline` is fatal.
    pub async fn init(&self) -> Result<RunState, TpsError> {
        let start = self.planner.plan_start().await?;
        log::info!("🚀 Init: start time {}", format_ts(start));
        Ok(RunState::new(start))
    }

    /// Init, then backfill if the gap to now warrants it
    ///
    /// Returns a state in `Following`, ready for ticks.
    pub async fn start(&self) -> Result<RunState, TpsError> {
        let state = self.init().await?;
        let now = self.clock.now();

        match self.planner.choose_mode(state.last_mark, now) {
            Mode::Backfill => {
                log::info!("📦 Starting backfill from {}", format_ts(state.last_mark));
                self.backfill(state).await
            }
            Mode::Follow => {
                log::info!("🔄 Starting follow from {}", format_ts(state.last_mark));
                Ok(state.in_phase(Phase::Following))
            }
        }
    }

    /// Process chunks until no full interval fits before `now - batch_limit`
    ///
    /// "Now" is re-read every chunk so a long backfill keeps chasing the head.
    /// Any failure aborts without advancing past the failed chunk.
    pub async fn backfill(&self, state: RunState) -> Result<RunState, TpsError> {
        let mut state = state.in_phase(Phase::Backfilling);
        let mut chunks = 0usize;

        while let Some(chunk) = self.planner.next_backfill_chunk(state.last_mark, self.clock.now()) {
            log::info!("   ├─ Backfill chunk {}", chunk);
            let rows = self.run_cycle(chunk, Mode::Backfill).await.map_err(|e| {
                log::error!("❌ Backfill chunk {} failed: {}", chunk, e);
                e
            })?;
            log::debug!("   │  wrote {} rows", rows);

            state = state.advanced_to(chunk.end);
            chunks += 1;
        }

        log::info!(
            "   └─ ✅ Backfill caught up at {} after {} chunks",
            format_ts(state.last_mark),
            chunks
        );

        Ok(state.in_phase(Phase::Following))
    }

    /// One follow tick at `now`
    ///
    /// A tick before a full interval has elapsed is a no-op and writes nothing.
    pub async fn follow_tick(
        &self,
        state: RunState,
        now: Timestamp,
    ) -> Result<(RunState, TickOutcome), TpsError> {
        let span = match self.planner.follow_span(state.last_mark, now) {
            Some(span) => span,
            None => {
                log::debug!("⏸️  Tick at {}: no full interval since {}", format_ts(now), format_ts(state.last_mark));
                return Ok((state, TickOutcome::Idle));
            }
        };

        let rows = self.run_cycle(span, Mode::Follow).await?;
        log::info!("🔄 Follow {} → {} rows", span, rows);

        Ok((
            state.advanced_to(span.end),
            TickOutcome::Written { window: span, rows },
        ))
    }

    /// Consume ticks strictly one at a time until the channel closes
    ///
    /// With `RetryNextTick`, a failed tick leaves the mark where it was so the
    /// next tick re-covers the same span.
    pub async fn follow(&self, state: RunState, ticks: mpsc::Receiver<Tick>) -> Result<RunState, TpsError> {
        self.follow_until(state, ticks, std::future::pending::<()>()).await
    }

    /// Like `follow`, but also stops once `shutdown` completes
    ///
    /// `shutdown` is only checked between ticks, so a cycle in progress
    /// finishes its write first. The returned state carries the mark reached.
    pub async fn follow_until<F>(
        &self,
        mut state: RunState,
        mut ticks: mpsc::Receiver<Tick>,
        shutdown: F,
    ) -> Result<RunState, TpsError>
    where
        F: Future<Output = ()>,
    {
        state = state.in_phase(Phase::Following);
        log::info!("🔄 Following from {}", format_ts(state.last_mark));

        tokio::pin!(shutdown);

        loop {
            let tick = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, follow loop stopped at {}", format_ts(state.last_mark));
                    return Ok(state);
                }
                tick = ticks.recv() => tick,
            };

            let Some(tick) = tick else {
                break;
            };

            match self.follow_tick(state, tick.now).await {
                Ok((next, _)) => state = next,
                Err(e) => match self.failure_policy {
                    FollowFailurePolicy::Fatal => {
                        log::error!("❌ Follow tick failed, stopping: {}", e);
                        return Err(e);
                    }
                    FollowFailurePolicy::RetryNextTick => {
                        log::error!(
                            "❌ Follow tick failed, will retry from {}: {}",
                            format_ts(state.last_mark),
                            e
                        );
                    }
                },
            }
        }

        log::info!("Tick channel closed, follow loop stopped at {}", format_ts(state.last_mark));
        Ok(state)
    }

    /// Fetch, reconcile, aggregate and write every sub-window of `span`
    async fn run_cycle(&self, span: Window, mode: Mode) -> Result<usize, TpsError> {
        let records = self
            .aggregator
            .aggregate_span(&self.fetcher, span, mode, self.max_query_concurrency)
            .await?;

        self.sink.write_batch(&records).await?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tps_core::{BlockOrigin, MemoryStore};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to
    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn new(now: Timestamp) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(now)))
        }

        fn set(&self, now: Timestamp) {
            self.0.store(now, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn driver(config: &TpsConfig, store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> Driver {
        Driver::new(config, store.clone(), store.clone(), clock.clone())
    }

    #[tokio::test]
    async fn test_init_without_blocks_is_fatal() {
        let store = Arc::new(MemoryStore::default());
        let clock = ManualClock::new(1_000);
        let result = driver(&TpsConfig::default(), &store, &clock).start().await;
        assert!(matches!(result, Err(TpsError::NoBaseline)));
    }

    #[tokio::test]
    async fn test_backfill_then_following() {
        let config = TpsConfig {
            batch_day_interval_secs: 3_600,
            ..TpsConfig::default()
        };
        let store = Arc::new(MemoryStore::default());
        store.push_block("h0", 0, 0, 10, BlockOrigin::Confirmed);
        store.push_block("h1", 1, 7_250, 4, BlockOrigin::Confirmed);
        store.push_block("hu", 2, 7_260, 9, BlockOrigin::Unconfirmed);
        let clock = ManualClock::new(10_000);

        let state = driver(&config, &store, &clock).start().await.unwrap();

        assert_eq!(state.phase, Phase::Following);
        assert_eq!(state.last_mark, 9_360);

        let rows = store.rows();
        assert_eq!(rows.len(), 9_360 / 60);
        for pair in rows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(rows[0].txs, 10);
        // Backfill never reads unconfirmed blocks
        assert_eq!(store.unconfirmed_queries(), 0);
        let window = rows.iter().find(|r| r.start == 7_200).unwrap();
        assert_eq!(window.txs, 4);
    }

    #[tokio::test]
    async fn test_recent_start_goes_straight_to_follow() {
        let store = Arc::new(MemoryStore::default());
        store.push_block("h0", 0, 9_700, 1, BlockOrigin::Confirmed);
        let clock = ManualClock::new(10_000);

        let state = driver(&TpsConfig::default(), &store, &clock).start().await.unwrap();

        assert_eq!(state.phase, Phase::Following);
        assert_eq!(state.last_mark, 9_700);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_follow_tick_reconciles_sources() {
        let store = Arc::new(MemoryStore::default());
        store.push_block("h1", 1, 6_010, 5, BlockOrigin::Confirmed);
        store.push_block("h1", 1, 6_010, 5, BlockOrigin::Unconfirmed);
        store.push_block("h3", 2, 6_020, 3, BlockOrigin::Unconfirmed);
        let clock = ManualClock::new(6_000);
        let driver = driver(&TpsConfig::default(), &store, &clock);

        let state = RunState::new(6_000).in_phase(Phase::Following);
        let (state, outcome) = driver.follow_tick(state, 6_075).await.unwrap();

        assert_eq!(outcome, TickOutcome::Written { window: Window::new(6_000, 6_060), rows: 1 });
        assert_eq!(state.last_mark, 6_060);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].blocks, 2);
        assert_eq!(rows[0].txs, 8);
    }

    #[tokio::test]
    async fn test_early_tick_is_noop() {
        let store = Arc::new(MemoryStore::default());
        let clock = ManualClock::new(0);
        let driver = driver(&TpsConfig::default(), &store, &clock);

        let state = RunState::new(6_000).in_phase(Phase::Following);
        let (next, outcome) = driver.follow_tick(state, 6_059).await.unwrap();

        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(next, state);
        assert_eq!(store.write_calls(), 0);
        assert_eq!(store.unconfirmed_queries(), 0);
    }

    #[tokio::test]
    async fn test_failed_backfill_chunk_does_not_advance() {
        let config = TpsConfig {
            batch_day_interval_secs: 3_600,
            ..TpsConfig::default()
        };
        let store = Arc::new(MemoryStore::default());
        store.push_block("h0", 0, 0, 1, BlockOrigin::Confirmed);
        store.fail_writes(true);
        let clock = ManualClock::new(100_000);

        let result = driver(&config, &store, &clock).start().await;

        assert!(matches!(result, Err(TpsError::Write(_))));
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_follow_loop_fatal_policy() {
        let store = Arc::new(MemoryStore::default());
        store.fail_fetches(true);
        let clock = ManualClock::new(0);
        let driver = driver(&TpsConfig::default(), &store, &clock);

        let (tx, rx) = mpsc::channel(4);
        tx.send(Tick { now: 120 }).await.unwrap();
        drop(tx);

        let result = driver.follow(RunState::new(0), rx).await;
        assert!(matches!(result, Err(TpsError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_follow_loop_retry_policy_recovers_span() {
        let config = TpsConfig {
            follow_failure_policy: FollowFailurePolicy::RetryNextTick,
            ..TpsConfig::default()
        };
        let store = Arc::new(MemoryStore::default());
        store.push_block("h1", 1, 30, 2, BlockOrigin::Confirmed);
        store.fail_fetches(true);
        let clock = ManualClock::new(0);
        let driver = driver(&config, &store, &clock);

        // First tick fails and keeps the mark
        let (tx, rx) = mpsc::channel(4);
        tx.send(Tick { now: 120 }).await.unwrap();
        drop(tx);
        let state = driver.follow(RunState::new(0), rx).await.unwrap();
        assert_eq!(state.last_mark, 0);

        // Next tick covers the whole span including the failed one
        store.fail_fetches(false);
        clock.set(200);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Tick { now: clock.now() }).await.unwrap();
        drop(tx);
        let state = driver.follow(state, rx).await.unwrap();

        assert_eq!(state.last_mark, 180);
        let rows = store.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].txs, 2);
    }

    #[tokio::test]
    async fn test_shutdown_returns_mark_reached() {
        let store = Arc::new(MemoryStore::default());
        store.push_block("h1", 1, 10, 6, BlockOrigin::Confirmed);
        let clock = ManualClock::new(0);
        let driver = driver(&TpsConfig::default(), &store, &clock);

        // Sender stays alive, so only the shutdown signal can end the loop
        let (tx, rx) = mpsc::channel(4);
        tx.send(Tick { now: 130 }).await.unwrap();

        let written = store.clone();
        let shutdown = async move {
            while written.write_calls() == 0 {
                tokio::task::yield_now().await;
            }
        };

        let state = driver.follow_until(RunState::new(0), rx, shutdown).await.unwrap();

        assert_eq!(state.last_mark, 120);
        assert_eq!(state.phase, Phase::Following);
        assert_eq!(store.rows().len(), 2);
        drop(tx);
    }

    #[tokio::test]
    async fn test_replayed_tick_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        store.push_block("h1", 1, 10, 6, BlockOrigin::Confirmed);
        let clock = ManualClock::new(0);
        let driver = driver(&TpsConfig::default(), &store, &clock);

        let state = RunState::new(0);
        driver.follow_tick(state, 60).await.unwrap();
        let before = store.rows();

        // Same span recomputed after a new unconfirmed block shows up
        store.push_block("h2", 2, 20, 50, BlockOrigin::Unconfirmed);
        driver.follow_tick(state, 60).await.unwrap();

        assert_eq!(store.rows(), before);
    }
}
