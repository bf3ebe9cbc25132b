//! Error taxonomy for the aggregation cycle

use crate::config::ConfigError;

/// Storage read failure. Not retried; aborts the current cycle.
#[derive(Debug)]
pub enum FetchError {
    Database(rusqlite::Error),
    Task(String),
}

impl From<rusqlite::Error> for FetchError {
    fn from(err: rusqlite::Error) -> Self {
        FetchError::Database(err)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Database(e) => write!(f, "Database error: {}", e),
            FetchError::Task(e) => write!(f, "Query task failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// Storage write failure. Earlier chunks of the batch stay committed.
#[derive(Debug)]
pub enum WriteError {
    Database(rusqlite::Error),
    Task(String),
}

impl From<rusqlite::Error> for WriteError {
    fn from(err: rusqlite::Error) -> Self {
        WriteError::Database(err)
    }
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Database(e) => write!(f, "Database error: {}", e),
            WriteError::Task(e) => write!(f, "Write task failed: {}", e),
        }
    }
}

impl std::error::Error for WriteError {}

#[derive(Debug)]
pub enum TpsError {
    /// No block data to anchor windows on
    NoBaseline,
    Fetch(FetchError),
    Write(WriteError),
    Config(ConfigError),
}

impl From<FetchError> for TpsError {
    fn from(err: FetchError) -> Self {
        TpsError::Fetch(err)
    }
}

impl From<WriteError> for TpsError {
    fn from(err: WriteError) -> Self {
        TpsError::Write(err)
    }
}

impl From<ConfigError> for TpsError {
    fn from(err: ConfigError) -> Self {
        TpsError::Config(err)
    }
}

impl std::fmt::Display for TpsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TpsError::NoBaseline => write!(f, "No baseline block found in database"),
            TpsError::Fetch(e) => write!(f, "Fetch failed: {}", e),
            TpsError::Write(e) => write!(f, "Write failed: {}", e),
            TpsError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TpsError::NoBaseline => None,
            TpsError::Fetch(e) => Some(e),
            TpsError::Write(e) => Some(e),
            TpsError::Config(e) => Some(e),
        }
    }
}
