use crate::adapters::storage::{read_optional, table_file_name};
use crate::adapters::table_sink::encode_csv;
use crate::domain::model::{LogEntry, TableRow, LOG_HEADER};
use crate::domain::ports::{LogTable, Storage};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// 以 CSV 檔保存的日誌表
///
/// 列索引從標題列之後起算，空白列不計入。讀寫都在同一把鎖內完成。
pub struct CsvLogTable<S: Storage> {
    storage: S,
    table: String,
    lock: Mutex<()>,
}

impl<S: Storage> CsvLogTable<S> {
    pub fn new(storage: S, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_name(&self) -> String {
        table_file_name(&self.table)
    }

    fn header() -> Vec<String> {
        LOG_HEADER.iter().map(|h| h.to_string()).collect()
    }

    async fn read_raw(&self) -> Result<Vec<TableRow>> {
        let Some(data) = read_optional(&self.storage, &self.file_name()).await? else {
            return Ok(Vec::new());
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_slice());

        let mut rows = Vec::new();
        for record in reader.records() {
            let row: TableRow = record?.iter().map(str::to_string).collect();
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn write_raw(&self, rows: &[TableRow]) -> Result<()> {
        let data = encode_csv(&self.table, Some(&Self::header()), rows)?;
        self.storage.write_file(&self.file_name(), &data).await
    }

    async fn remove_range(&self, start: usize, count: usize) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_raw().await?;

        let end = start.saturating_add(count);
        if end > rows.len() {
            return Err(SyncError::sink(
                &self.table,
                format!("row range {}..{} out of bounds ({} rows)", start, end, rows.len()),
            ));
        }

        rows.drain(start..end);
        self.write_raw(&rows).await
    }
}

#[async_trait]
impl<S: Storage> LogTable for CsvLogTable<S> {
    async fn append_rows(&self, entries: &[LogEntry]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_raw().await?;
        rows.extend(entries.iter().map(LogEntry::to_row));
        self.write_raw(&rows).await
    }

    async fn read_all_rows(&self) -> Result<Vec<LogEntry>> {
        let _guard = self.lock.lock().await;
        self.read_raw()
            .await?
            .iter()
            .enumerate()
            .map(|(index, row)| {
                LogEntry::from_row(row).map_err(|message| SyncError::ProcessingError {
                    message: format!("{} row {}: {}", self.table, index + 1, message),
                })
            })
            .collect()
    }

    async fn delete_rows(&self, start: usize, count: usize) -> Result<()> {
        self.remove_range(start, count).await
    }

    // CSV 沒有「清空但保留列」的概念，與刪除相同
    async fn clear_rows(&self, start: usize, count: usize) -> Result<()> {
        self.remove_range(start, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::domain::model::LogLevel;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn entry(days_ago: i64, message: &str) -> LogEntry {
        LogEntry::new(
            Utc::now() - Duration::days(days_ago),
            LogLevel::Info,
            "test",
            message,
            None,
        )
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");

        table.append_rows(&[entry(2, "first")]).await.unwrap();
        table
            .append_rows(&[entry(1, "second, with comma")])
            .await
            .unwrap();

        let rows = table.read_all_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "first");
        assert_eq!(rows[1].message, "second, with comma");

        let content = std::fs::read_to_string(dir.path().join("Logs.csv")).unwrap();
        assert!(content.starts_with("Timestamp,Level,Module,Message,Details\n"));
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");

        assert!(table.read_all_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let dir = TempDir::new().unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");
        table
            .append_rows(&[entry(3, "a"), entry(2, "b"), entry(1, "c")])
            .await
            .unwrap();

        table.delete_rows(0, 2).await.unwrap();

        let rows = table.read_all_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "c");
    }

    #[tokio::test]
    async fn test_clear_all_leaves_header() {
        let dir = TempDir::new().unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");
        table.append_rows(&[entry(3, "a"), entry(2, "b")]).await.unwrap();

        table.clear_rows(0, 2).await.unwrap();

        assert!(table.read_all_rows().await.unwrap().is_empty());
        let content = std::fs::read_to_string(dir.path().join("Logs.csv")).unwrap();
        assert_eq!(content, "Timestamp,Level,Module,Message,Details\n");
    }

    #[tokio::test]
    async fn test_blank_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let valid = entry(1, "kept").to_row().join(",");
        std::fs::write(
            dir.path().join("Logs.csv"),
            format!("Timestamp,Level,Module,Message,Details\n,,,,\n{}\n", valid),
        )
        .unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");

        let rows = table.read_all_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "kept");
    }

    #[tokio::test]
    async fn test_out_of_range_delete_fails() {
        let dir = TempDir::new().unwrap();
        let table = CsvLogTable::new(LocalStorage::new(dir.path()), "Logs");
        table.append_rows(&[entry(1, "a")]).await.unwrap();

        assert!(table.delete_rows(0, 5).await.is_err());
    }
}
