//! 本機執行時的組裝：HTTP 擷取、CSV 表格、CSV 日誌表與 JSON 狀態檔

use crate::adapters::{CsvLogTable, CsvTableSink, HttpEntityFetcher, JsonStateStore, LocalStorage};
use crate::config::SyncConfig;
use crate::core::engine::SyncEngine;
use crate::core::log_buffer::LogBuffer;
use crate::core::orchestrator::{last_sync_key, SyncOrchestrator};
use crate::domain::ports::DurableStore;
use crate::utils::error::Result;
use std::sync::Arc;

pub type LocalSyncEngine = SyncEngine<
    HttpEntityFetcher,
    CsvTableSink<LocalStorage>,
    JsonStateStore<LocalStorage>,
    CsvLogTable<LocalStorage>,
>;

pub fn build_local_engine(config: &SyncConfig, monitor: bool) -> Result<LocalSyncEngine> {
    let storage = LocalStorage::new(config.output_path());

    let fetcher = HttpEntityFetcher::new(&config.source)?;
    let sink = CsvTableSink::new(storage.clone());
    let store = JsonStateStore::new(storage.clone(), config.state_file(), config.principal());
    let log = Arc::new(LogBuffer::new(CsvLogTable::new(storage, config.log_table())));

    let orchestrator = SyncOrchestrator::new(fetcher, sink, store, log)
        .with_pacing(config.sync.pacing_policy());

    Ok(SyncEngine::new_with_monitoring(orchestrator, monitor))
}

/// 各 domain 最後一次成功同步的時間（未同步過為 None）
pub async fn last_sync_times<D: DurableStore>(
    store: &D,
    domains: &[String],
) -> Result<Vec<(String, Option<String>)>> {
    let mut times = Vec::with_capacity(domains.len());
    for name in domains {
        let value = store.get_value(&last_sync_key(name)).await?;
        times.push((name.clone(), value));
    }
    Ok(times)
}
