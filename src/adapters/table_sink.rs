use crate::adapters::storage::{read_optional, table_file_name};
use crate::domain::model::TableRow;
use crate::domain::ports::{Storage, TabularSink};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

pub const ERROR_MARKER_HEADER: [&str; 3] = ["Status", "Message", "Timestamp"];

/// 每個表格對應一個 CSV 檔
pub struct CsvTableSink<S: Storage> {
    storage: S,
}

impl<S: Storage> CsvTableSink<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

/// 將標題列（可省略）與資料列編碼成 CSV
pub fn encode_csv(table: &str, header: Option<&[String]>, rows: &[TableRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| SyncError::sink(table, e.to_string()))
}

#[async_trait]
impl<S: Storage> TabularSink for CsvTableSink<S> {
    async fn write_table(
        &self,
        table: &str,
        header: &[String],
        rows: &[TableRow],
        overwrite: bool,
    ) -> Result<()> {
        let file = table_file_name(table);

        let existing = if overwrite {
            None
        } else {
            read_optional(&self.storage, &file).await?.filter(|data| !data.is_empty())
        };

        let data = match existing {
            // 附加模式：已有檔案時不重複寫標題列
            Some(mut data) => {
                if !data.ends_with(b"\n") {
                    data.push(b'\n');
                }
                data.extend(encode_csv(table, None, rows)?);
                data
            }
            None => encode_csv(table, Some(header), rows)?,
        };

        self.storage.write_file(&file, &data).await?;
        tracing::debug!("💾 Wrote {} rows to {}", rows.len(), file);
        Ok(())
    }

    async fn write_error_marker(&self, table: &str, message: &str) -> Result<()> {
        let header: Vec<String> = ERROR_MARKER_HEADER.iter().map(|h| h.to_string()).collect();
        let row = vec![
            "ERROR".to_string(),
            message.to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ];
        let data = encode_csv(table, Some(&header), &[row])?;
        self.storage.write_file(&table_file_name(table), &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use tempfile::TempDir;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn row(cols: &[&str]) -> TableRow {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn read(dir: &TempDir, file: &str) -> String {
        std::fs::read_to_string(dir.path().join(file)).unwrap()
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let sink = CsvTableSink::new(LocalStorage::new(dir.path()));

        sink.write_table("Accounts", &header(&["id"]), &[row(&["a1"])], true)
            .await
            .unwrap();
        sink.write_table("Accounts", &header(&["id"]), &[row(&["a2"])], true)
            .await
            .unwrap();

        assert_eq!(read(&dir, "Accounts.csv"), "id\na2\n");
    }

    #[tokio::test]
    async fn test_append_keeps_single_header() {
        let dir = TempDir::new().unwrap();
        let sink = CsvTableSink::new(LocalStorage::new(dir.path()));

        sink.write_table("Events", &header(&["id", "name"]), &[row(&["1", "a"])], false)
            .await
            .unwrap();
        sink.write_table("Events", &header(&["id", "name"]), &[row(&["2", "b, c"])], false)
            .await
            .unwrap();

        assert_eq!(read(&dir, "Events.csv"), "id,name\n1,a\n2,\"b, c\"\n");
    }

    #[tokio::test]
    async fn test_header_only_table() {
        let dir = TempDir::new().unwrap();
        let sink = CsvTableSink::new(LocalStorage::new(dir.path()));

        sink.write_table("Empty", &header(&["id"]), &[], true).await.unwrap();

        assert_eq!(read(&dir, "Empty.csv"), "id\n");
    }

    #[tokio::test]
    async fn test_error_marker() {
        let dir = TempDir::new().unwrap();
        let sink = CsvTableSink::new(LocalStorage::new(dir.path()));

        sink.write_error_marker("Accounts", "quota exceeded").await.unwrap();

        let content = read(&dir, "Accounts.csv");
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("Status,Message,Timestamp"));
        assert!(lines.next().unwrap().starts_with("ERROR,quota exceeded,"));
    }
}
