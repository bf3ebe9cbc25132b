//! # TPS Pipeline Runtime
//!
//! Orchestrates the aggregation core:
//! - `Driver` runs `Init → Backfilling → Following`, threading `RunState`
//!   through each cycle and advancing it only after a successful write
//! - `scheduler` produces follow-mode ticks into a channel that the driver
//!   drains strictly one at a time
//!
//! ## Modes
//!
//! - **Backfill**: catch up over history in `batch_day_interval_secs` chunks,
//!   confirmed blocks only, stopping `batch_limit_secs` short of now
//! - **Follow**: on each tick, cover every full interval since the mark,
//!   reading confirmed and unconfirmed blocks

pub mod driver;
pub mod scheduler;

pub use driver::{Clock, Driver, SystemClock, TickOutcome};
pub use scheduler::{spawn_ticker, Tick};
