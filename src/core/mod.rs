pub mod engine;
pub mod listing;
pub mod log_buffer;
pub mod orchestrator;
pub mod pacing;

pub use crate::domain::ports::{DurableStore, EntityFetcher, LogTable, Storage, TabularSink};
pub use crate::utils::error::Result;
