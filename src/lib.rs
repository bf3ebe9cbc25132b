pub mod config;
pub mod pipeline;
pub mod sqlite_pragma;
pub mod tps_core;
