//! Fan-out synchronisation for one domain.
//!
//! A run lists the primary entities once, then fetches every configured
//! dependent listing per primary entity. A failing primary listing aborts the
//! run; a failing dependent listing only empties that entity's share of the
//! collection. Every notable step is recorded into the shared [`LogBuffer`].

use crate::config::{DependentListing, DomainConfig};
use crate::core::listing::{self, PagedListing};
use crate::core::log_buffer::LogBuffer;
use crate::core::pacing::{Pacer, PacingPolicy};
use crate::domain::model::{
    AnnotatedDependent, DependentCollection, DependentEntity, LogLevel, PrimaryEntity, SyncResult,
};
use crate::domain::ports::{DurableStore, EntityFetcher, LogTable, TabularSink};
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::Validate;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub const LAST_SYNC_KEY_PREFIX: &str = "last_sync:";

pub fn last_sync_key(domain: &str) -> String {
    format!("{}{}", LAST_SYNC_KEY_PREFIX, domain)
}

pub struct SyncOrchestrator<F, T, D, L>
where
    F: EntityFetcher,
    T: TabularSink,
    D: DurableStore,
    L: LogTable,
{
    fetcher: F,
    sink: T,
    store: D,
    log: Arc<LogBuffer<L>>,
    default_pacing: PacingPolicy,
}

impl<F, T, D, L> SyncOrchestrator<F, T, D, L>
where
    F: EntityFetcher,
    T: TabularSink,
    D: DurableStore,
    L: LogTable,
{
    pub fn new(fetcher: F, sink: T, store: D, log: Arc<LogBuffer<L>>) -> Self {
        Self {
            fetcher,
            sink,
            store,
            log,
            default_pacing: PacingPolicy::default(),
        }
    }

    /// domain 未指定 pacing_delay_ms 時使用的節流策略
    pub fn with_pacing(mut self, policy: PacingPolicy) -> Self {
        self.default_pacing = policy;
        self
    }

    pub fn log(&self) -> &Arc<LogBuffer<L>> {
        &self.log
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    fn pacer_for(&self, domain: &DomainConfig) -> Pacer {
        Pacer::new(domain.pacing_policy(self.default_pacing))
    }

    /// 執行一個 domain 的同步；錯誤一律轉為 `SyncResult`，不向呼叫端拋出
    pub async fn run_sync(&self, domain: &DomainConfig) -> SyncResult {
        let started = Instant::now();
        let module = domain.name.as_str();

        tracing::info!("🚀 Starting sync for domain '{}'", module);
        self.log.info(module, format!("Sync started for domain '{}'", module));

        if let Err(e) = domain.validate() {
            return self.fail(domain, started, e).await;
        }

        // 1. primary 列舉失敗即中止
        let primaries = match self.list_primaries(domain).await {
            Ok(primaries) => primaries,
            Err(e) => return self.fail(domain, started, e).await,
        };

        // 2. 空 domain 不是錯誤
        if primaries.is_empty() {
            self.log.warning(
                module,
                format!("No {} found; nothing to sync", domain.primary.category),
                None,
            );
            let counts = domain
                .categories()
                .into_iter()
                .map(|category| (category.to_string(), 0))
                .collect();
            return SyncResult::success(&domain.name, counts, elapsed_ms(started));
        }

        // 3. primary 表格整份覆寫
        let (header, rows) = listing::primary_table(&primaries, &domain.primary.columns);
        self.persist(module, &domain.primary.table, &header, &rows).await;

        // 4. fan-out
        let collections = self.fan_out(domain, &primaries).await;

        // 5. dependent 表格各自覆寫
        for (config, collection) in domain.dependents.iter().zip(&collections) {
            let (header, rows) =
                listing::dependent_table(&collection.items, domain.primary.label(), &config.columns);
            self.persist(module, &config.table, &header, &rows).await;
        }

        // 6. 統計、摘要與 last sync 標記
        let mut counts = BTreeMap::new();
        counts.insert(domain.primary.category.clone(), primaries.len());
        for collection in &collections {
            counts.insert(collection.category.clone(), collection.items.len());
        }
        let result = SyncResult::success(&domain.name, counts, elapsed_ms(started));

        let failed: usize = collections.iter().map(|c| c.failed_owners.len()).sum();
        self.log.record(
            LogLevel::Info,
            module,
            format!("Sync completed: {}", result.summary()),
            (failed > 0).then(|| format!("{} dependent listings failed and were skipped", failed)),
        );
        self.mark_last_sync(module).await;

        tracing::info!("✅ Domain '{}' synced: {}", module, result.summary());
        result
    }

    async fn list_primaries(&self, domain: &DomainConfig) -> Result<Vec<PrimaryEntity>> {
        let config = &domain.primary;
        let paged =
            listing::fetch_all_pages(&self.fetcher, &config.listing.endpoint, &config.listing)
                .await?;
        self.note_truncation(&domain.name, &config.category, &paged, None);

        let mut primaries = Vec::with_capacity(paged.items.len());
        for fields in paged.items {
            match listing::build_primary(fields, config) {
                Some(primary) => primaries.push(primary),
                None => self.log.warning(
                    &domain.name,
                    format!(
                        "Skipped a {} entry without '{}'",
                        config.category,
                        config.id_field()
                    ),
                    None,
                ),
            }
        }

        tracing::info!("📡 {}: listed {} {}", domain.name, primaries.len(), config.category);
        Ok(primaries)
    }

    async fn fan_out(
        &self,
        domain: &DomainConfig,
        primaries: &[PrimaryEntity],
    ) -> Vec<DependentCollection> {
        let mut collections: Vec<DependentCollection> = domain
            .dependents
            .iter()
            .map(|d| DependentCollection::new(&d.category))
            .collect();

        if domain.dependents.is_empty() {
            return collections;
        }

        let pacer = self.pacer_for(domain);
        for (index, primary) in primaries.iter().enumerate() {
            for (config, collection) in domain.dependents.iter().zip(collections.iter_mut()) {
                // 失敗隔離：單一 entity 的錯誤不影響其他 entity
                match self.list_dependents(domain, config, primary).await {
                    Ok(entities) => {
                        let owner = primary.reference();
                        collection
                            .items
                            .extend(entities.into_iter().map(|entity| AnnotatedDependent {
                                owner: owner.clone(),
                                entity,
                            }));
                    }
                    Err(e) => {
                        tracing::warn!(
                            "⚠️ {}: {} for '{}' failed: {}",
                            domain.name,
                            config.category,
                            primary.display_name,
                            e
                        );
                        self.log.warning(
                            &domain.name,
                            format!(
                                "Failed to fetch {} for {} '{}' ({})",
                                config.category,
                                domain.primary.label(),
                                primary.display_name,
                                primary.id
                            ),
                            Some(e.user_friendly_message()),
                        );
                        collection.failed_owners.push(primary.id.clone());
                    }
                }
            }

            if index + 1 < primaries.len() {
                pacer.pause().await;
            }
        }

        collections
    }

    async fn list_dependents(
        &self,
        domain: &DomainConfig,
        config: &DependentListing,
        primary: &PrimaryEntity,
    ) -> Result<Vec<DependentEntity>> {
        let url = listing::render_template(&config.listing.endpoint, primary)?;
        let paged = listing::fetch_all_pages(&self.fetcher, &url, &config.listing).await?;
        self.note_truncation(&domain.name, &config.category, &paged, Some(primary));

        tracing::debug!(
            "📡 {}: {} {} for '{}'",
            domain.name,
            paged.items.len(),
            config.category,
            primary.display_name
        );
        Ok(paged
            .items
            .into_iter()
            .map(|fields| DependentEntity { fields })
            .collect())
    }

    fn note_truncation(
        &self,
        module: &str,
        category: &str,
        paged: &PagedListing,
        owner: Option<&PrimaryEntity>,
    ) {
        if !paged.truncated {
            return;
        }
        let scope = owner
            .map(|p| format!(" for '{}'", p.display_name))
            .unwrap_or_default();
        self.log.warning(
            module,
            format!(
                "Stopped listing {}{} after {} pages; remaining pages were not fetched",
                category, scope, paged.pages
            ),
            None,
        );
    }

    /// 輸出表格失敗只記錄，不讓同步失敗
    async fn persist(&self, module: &str, table: &str, header: &[String], rows: &[Vec<String>]) {
        match self.sink.write_table(table, header, rows, true).await {
            Ok(()) => tracing::debug!("💾 Wrote {} rows to '{}'", rows.len(), table),
            Err(e) => {
                tracing::error!("❌ Failed to write table '{}': {}", table, e);
                self.log.error(
                    module,
                    format!("Failed to write table '{}'", table),
                    Some(e.to_string()),
                );
            }
        }
    }

    async fn mark_last_sync(&self, module: &str) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(e) = self.store.set_value(&last_sync_key(module), &now).await {
            tracing::error!("❌ Failed to store last sync marker for '{}': {}", module, e);
            self.log.error(
                module,
                "Failed to store last sync marker",
                Some(e.to_string()),
            );
        }
    }

    async fn fail(&self, domain: &DomainConfig, started: Instant, error: SyncError) -> SyncResult {
        let module = domain.name.as_str();
        let message = error.user_friendly_message();

        tracing::error!(
            "❌ Sync for '{}' failed: {} (Category: {:?}, Severity: {:?})",
            module,
            error,
            error.category(),
            error.severity()
        );
        self.log.error(
            module,
            format!("Sync failed: {}", message),
            Some(error.recovery_suggestion().to_string()),
        );

        if !domain.primary.table.trim().is_empty() {
            if let Err(e) = self
                .sink
                .write_error_marker(&domain.primary.table, &message)
                .await
            {
                tracing::error!("❌ Failed to write error marker: {}", e);
                self.log.error(
                    module,
                    format!("Failed to write error marker to '{}'", domain.primary.table),
                    Some(e.to_string()),
                );
            }
        }

        SyncResult::error(&domain.name, message, elapsed_ms(started))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
