pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{CsvLogTable, CsvTableSink, HttpEntityFetcher, JsonStateStore, LocalStorage};
pub use app::{build_local_engine, LocalSyncEngine};
pub use config::SyncConfig;
pub use core::{engine::SyncEngine, log_buffer::LogBuffer, orchestrator::SyncOrchestrator};
pub use domain::model::{LogEntry, LogLevel, SyncResult, SyncStatus};
pub use utils::error::{Result, SyncError};
