//! Follow-mode tick producer
//!
//! A background task fires on a fixed cadence and pushes `Tick`s into a
//! channel of capacity 1. The driver drains it one tick at a time, so two
//! cycles never overlap. A tick that finds the channel full is dropped; the
//! next one's aligned end covers whatever elapsed meanwhile.

use super::driver::Clock;
use crate::tps_core::Timestamp;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub now: Timestamp,
}

/// Spawn the ticker task
///
/// The task stops once the receiver is dropped.
pub fn spawn_ticker(period: Duration, clock: Arc<dyn Clock>) -> (JoinHandle<()>, mpsc::Receiver<Tick>) {
    let (tx, rx) = mpsc::channel::<Tick>(1);

    let handle = tokio::spawn(async move {
        log::info!("⏰ Starting follow scheduler (interval: {}s)", period.as_secs());

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            match tx.try_send(Tick { now: clock.now() }) {
                Ok(()) => {}
                Err(TrySendError::Full(tick)) => {
                    log::debug!("⏭️  Previous cycle still running, dropping tick at {}", tick.now);
                }
                Err(TrySendError::Closed(_)) => {
                    log::info!("Follow scheduler stopped (receiver closed)");
                    break;
                }
            }
        }
    });

    (handle, rx)
}
