//! Core data types for TPS aggregation

/// Unix timestamp in seconds
pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockOrigin {
    Confirmed,
    Unconfirmed,
}

/// A block as read from storage. Identity is `hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub hash: String,
    pub height: i64,
    pub timestamp: Timestamp,
    pub tx_count: u64,
    pub origin: BlockOrigin,
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", format_ts(self.start), format_ts(self.end))
    }
}

/// One persisted row of the metrics table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub start: Timestamp,
    pub end: Timestamp,
    pub blocks: u64,
    pub txs: u64,
    pub tps: f64,
    pub tpm: f64,
    /// Category tag, stored in the `type` column
    pub kind: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Backfill,
    Follow,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Backfill => "backfill",
            Mode::Follow => "follow",
        }
    }

    /// Unconfirmed blocks are only read while following the chain head
    pub fn reads_unconfirmed(&self) -> bool {
        matches!(self, Mode::Follow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Backfilling,
    Following,
}

/// High-water mark threaded through driver cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    pub last_mark: Timestamp,
    pub phase: Phase,
}

impl RunState {
    pub fn new(last_mark: Timestamp) -> Self {
        Self {
            last_mark,
            phase: Phase::Init,
        }
    }

    pub fn advanced_to(self, mark: Timestamp) -> Self {
        Self {
            last_mark: mark,
            ..self
        }
    }

    pub fn in_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }
}

/// RFC 3339 rendering for log lines
pub fn format_ts(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
