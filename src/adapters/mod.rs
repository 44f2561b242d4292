// Adapters layer: concrete implementations of the domain ports (storage, http, tables, state)

pub mod http;
pub mod log_table;
pub mod state_store;
pub mod storage;
pub mod table_sink;

pub use http::HttpEntityFetcher;
pub use log_table::CsvLogTable;
pub use state_store::JsonStateStore;
pub use storage::LocalStorage;
pub use table_sink::CsvTableSink;
