//! Batched audit log.
//!
//! Entries accumulate in memory and are persisted with one bulk append per
//! [`LogBuffer::flush`]. Every entry is also emitted immediately as a
//! `tracing` event (target [`AUDIT_TARGET`]) for live visibility.
//!
//! Delivery is at-least-once: a failed flush leaves the buffer untouched and
//! the next flush retries the same entries plus anything recorded since.

use crate::domain::model::{LogEntry, LogLevel};
use crate::domain::ports::LogTable;
use crate::utils::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard};

pub const AUDIT_TARGET: &str = "fanout_sync::audit";

const CLEANUP_MODULE: &str = "log_cleanup";

#[derive(Debug, Default)]
struct BufferState {
    entries: Vec<LogEntry>,
    // 已記錄過的最新時間戳，buffer 清空後仍保留以維持單調遞增
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct LogBuffer<L: LogTable> {
    table: L,
    state: Mutex<BufferState>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl<L: LogTable> LogBuffer<L> {
    pub fn new(table: L) -> Self {
        Self {
            table,
            state: Mutex::new(BufferState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn table(&self) -> &L {
        &self.table
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        // 只有 Vec push/drain 在鎖內，poison 時資料仍一致
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(
        &self,
        level: LogLevel,
        module: &str,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        self.record_entry(LogEntry::new(Utc::now(), level, module, message, details));
    }

    pub fn info(&self, module: &str, message: impl Into<String>) {
        self.record(LogLevel::Info, module, message, None);
    }

    pub fn warning(&self, module: &str, message: impl Into<String>, details: Option<String>) {
        self.record(LogLevel::Warning, module, message, details);
    }

    pub fn error(&self, module: &str, message: impl Into<String>, details: Option<String>) {
        self.record(LogLevel::Error, module, message, details);
    }

    /// 取得 entry 的所有權並附加；時間戳不會早於前一筆
    pub fn record_entry(&self, mut entry: LogEntry) {
        {
            let mut state = self.lock_state();
            if let Some(last) = state.last_timestamp {
                if entry.timestamp < last {
                    entry.timestamp = last;
                }
            }
            state.last_timestamp = Some(entry.timestamp);
            emit_realtime(&entry);
            state.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock_state().entries.clone()
    }

    /// 將整個 buffer 一次寫入日誌表；成功才清除，回傳寫入筆數
    pub async fn flush(&self) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> Result<usize> {
        let pending = self.snapshot();
        if pending.is_empty() {
            return Ok(0);
        }

        match self.table.append_rows(&pending).await {
            Ok(()) => {
                // flush 期間新增的 entry 留待下次
                let mut state = self.lock_state();
                state.entries.drain(..pending.len());
                tracing::debug!("Flushed {} log entries", pending.len());
                Ok(pending.len())
            }
            Err(e) => {
                tracing::error!(
                    target: AUDIT_TARGET,
                    pending = pending.len(),
                    error = %e,
                    "Failed to flush log buffer; entries kept for the next flush"
                );
                Err(e)
            }
        }
    }

    /// 刪除早於 `now - retention_days` 的日誌列，回傳刪除筆數
    pub async fn cleanup_older_than(&self, retention_days: u32) -> Result<usize> {
        self.cleanup_older_than_at(retention_days, Utc::now()).await
    }

    pub async fn cleanup_older_than_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;

        if let Err(e) = self.flush_locked().await {
            tracing::warn!("Cleanup continues without flushing pending entries: {}", e);
        }

        let outcome = self.delete_expired(retention_days, now).await;
        match &outcome {
            Ok(deleted) => self.info(
                CLEANUP_MODULE,
                format!(
                    "Removed {} log entries older than {} days",
                    deleted, retention_days
                ),
            ),
            Err(e) => self.error(
                CLEANUP_MODULE,
                "Log retention cleanup failed",
                Some(e.to_string()),
            ),
        }

        if let Err(e) = self.flush_locked().await {
            tracing::warn!("Cleanup log entries remain buffered: {}", e);
        }

        outcome
    }

    async fn delete_expired(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let entries = self.table.read_all_rows().await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let cutoff = now - Duration::days(i64::from(retention_days));
        let first_kept = entries.iter().position(|entry| entry.timestamp > cutoff);

        match first_kept {
            Some(0) => Ok(0),
            Some(k) => {
                self.table.delete_rows(0, k).await?;
                Ok(k)
            }
            None => {
                self.table.clear_rows(0, entries.len()).await?;
                Ok(entries.len())
            }
        }
    }
}

fn emit_realtime(entry: &LogEntry) {
    let module = entry.module.as_str();
    let details = entry.details.as_deref().unwrap_or_default();
    match entry.level {
        LogLevel::Info => {
            tracing::info!(target: AUDIT_TARGET, module, details, "{}", entry.message)
        }
        LogLevel::Warning => {
            tracing::warn!(target: AUDIT_TARGET, module, details, "{}", entry.message)
        }
        LogLevel::Error => {
            tracing::error!(target: AUDIT_TARGET, module, details, "{}", entry.message)
        }
    }
}
