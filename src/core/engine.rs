use crate::config::DomainConfig;
use crate::core::log_buffer::LogBuffer;
use crate::core::orchestrator::SyncOrchestrator;
use crate::domain::model::SyncResult;
use crate::domain::ports::{DurableStore, EntityFetcher, LogTable, TabularSink};
use crate::utils::error::Result;
use crate::utils::monitor::ResourceMonitor;
use std::sync::Arc;

/// 依序同步多個 domain，並在每個 domain 結束後 flush 日誌
pub struct SyncEngine<F, T, D, L>
where
    F: EntityFetcher,
    T: TabularSink,
    D: DurableStore,
    L: LogTable,
{
    orchestrator: SyncOrchestrator<F, T, D, L>,
    monitor: ResourceMonitor,
}

impl<F, T, D, L> SyncEngine<F, T, D, L>
where
    F: EntityFetcher,
    T: TabularSink,
    D: DurableStore,
    L: LogTable,
{
    pub fn new(orchestrator: SyncOrchestrator<F, T, D, L>) -> Self {
        Self::new_with_monitoring(orchestrator, false)
    }

    pub fn new_with_monitoring(orchestrator: SyncOrchestrator<F, T, D, L>, monitor: bool) -> Self {
        Self {
            orchestrator,
            monitor: ResourceMonitor::new(monitor),
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator<F, T, D, L> {
        &self.orchestrator
    }

    pub fn log(&self) -> &Arc<LogBuffer<L>> {
        self.orchestrator.log()
    }

    pub async fn run_domain(&self, domain: &DomainConfig) -> SyncResult {
        self.monitor.log_phase(&format!("Before {}", domain.name));
        let result = self.orchestrator.run_sync(domain).await;
        self.monitor.log_phase(&format!("After {}", domain.name));

        // 日誌寫入失敗不影響同步結果
        if let Err(e) = self.log().flush().await {
            tracing::warn!(
                "⚠️ Log flush after '{}' failed, {} entries pending: {}",
                domain.name,
                self.log().len(),
                e
            );
        }

        result
    }

    pub async fn run_domains<'a, I>(&self, domains: I) -> Vec<SyncResult>
    where
        I: IntoIterator<Item = &'a DomainConfig>,
    {
        let mut results = Vec::new();
        for domain in domains {
            if !domain.is_enabled() {
                tracing::info!("⏭️ Skipping disabled domain: {}", domain.name);
                continue;
            }
            results.push(self.run_domain(domain).await);
        }
        results
    }

    pub async fn run_cleanup(&self, retention_days: u32) -> Result<usize> {
        tracing::info!("🧹 Cleaning log entries older than {} days", retention_days);
        let deleted = self.log().cleanup_older_than(retention_days).await?;
        tracing::info!("🧹 Removed {} log entries", deleted);
        Ok(deleted)
    }

    pub async fn flush_logs(&self) -> Result<usize> {
        self.log().flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListingConfig, PrimaryListing};
    use crate::core::pacing::PacingPolicy;
    use crate::domain::model::LogEntry;
    use crate::domain::ports::FetchRequest;
    use crate::utils::error::{FetchError, SyncError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    struct StaticFetcher(Value);

    #[async_trait]
    impl EntityFetcher for StaticFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> std::result::Result<Value, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct NoopSink;

    #[async_trait]
    impl TabularSink for NoopSink {
        async fn write_table(
            &self,
            _table: &str,
            _header: &[String],
            _rows: &[Vec<String>],
            _overwrite: bool,
        ) -> Result<()> {
            Ok(())
        }

        async fn write_error_marker(&self, _table: &str, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoopStore;

    #[async_trait]
    impl DurableStore for NoopStore {
        async fn get_value(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn set_value(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakyLogTable {
        rows: Mutex<Vec<LogEntry>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl LogTable for FlakyLogTable {
        async fn append_rows(&self, entries: &[LogEntry]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SyncError::sink("Logs", "unavailable"));
            }
            self.rows.lock().await.extend_from_slice(entries);
            Ok(())
        }

        async fn read_all_rows(&self) -> Result<Vec<LogEntry>> {
            Ok(self.rows.lock().await.clone())
        }

        async fn delete_rows(&self, start: usize, count: usize) -> Result<()> {
            self.rows.lock().await.drain(start..start + count);
            Ok(())
        }

        async fn clear_rows(&self, start: usize, count: usize) -> Result<()> {
            self.delete_rows(start, count).await
        }
    }

    fn domain(name: &str, enabled: bool) -> DomainConfig {
        DomainConfig {
            name: name.to_string(),
            description: None,
            enabled: Some(enabled),
            pacing_delay_ms: None,
            pacing_mode: None,
            primary: PrimaryListing {
                category: "properties".to_string(),
                table: format!("{} Properties", name),
                label: Some("Property".to_string()),
                listing: ListingConfig {
                    endpoint: "https://api.test/properties".to_string(),
                    method: None,
                    body: None,
                    items_field: Some("properties".to_string()),
                    next_page_token_field: None,
                    page_token_param: None,
                    max_pages: None,
                },
                id_field: None,
                display_field: None,
                columns: Vec::new(),
            },
            dependents: Vec::new(),
        }
    }

    fn engine(log_table: FlakyLogTable) -> SyncEngine<StaticFetcher, NoopSink, NoopStore, FlakyLogTable> {
        let fetcher = StaticFetcher(json!({"properties": [{"id": "p1", "displayName": "Site"}]}));
        let orchestrator =
            SyncOrchestrator::new(fetcher, NoopSink, NoopStore, Arc::new(LogBuffer::new(log_table)))
                .with_pacing(PacingPolicy::Disabled);
        SyncEngine::new(orchestrator)
    }

    #[tokio::test]
    async fn test_run_domains_skips_disabled_and_flushes() {
        let engine = engine(FlakyLogTable::default());
        let domains = vec![domain("analytics", true), domain("legacy", false)];

        let results = engine.run_domains(&domains).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].domain, "analytics");
        assert!(results[0].is_success());
        assert!(engine.log().is_empty());
        assert!(!engine.log().table().rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_failure_does_not_fail_sync() {
        let table = FlakyLogTable::default();
        table.failing.store(true, Ordering::SeqCst);
        let engine = engine(table);

        let result = engine.run_domain(&domain("analytics", true)).await;

        assert!(result.is_success());
        assert!(!engine.log().is_empty());

        engine.log().table().failing.store(false, Ordering::SeqCst);
        assert!(engine.flush_logs().await.unwrap() > 0);
        assert!(engine.log().is_empty());
    }
}
