use crate::domain::model::{LogEntry, TableRow};
use crate::utils::error::{FetchError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 單次 API 呼叫的描述
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// 執行一次已驗證的 HTTP 呼叫；重試在實作內部完成，回傳即為最終結果
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<serde_json::Value, FetchError>;
}

/// 具名表格的輸出端
#[async_trait]
pub trait TabularSink: Send + Sync {
    async fn write_table(
        &self,
        table: &str,
        header: &[String],
        rows: &[TableRow],
        overwrite: bool,
    ) -> Result<()>;

    /// 沒有資料列時的錯誤標記寫入
    async fn write_error_marker(&self, table: &str, message: &str) -> Result<()>;
}

/// 以執行者（principal）為範圍的持久化鍵值儲存
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;
}

/// 持久化的日誌表；列索引從第一筆資料列（不含標題列）起算
#[async_trait]
pub trait LogTable: Send + Sync {
    async fn append_rows(&self, entries: &[LogEntry]) -> Result<()>;
    async fn read_all_rows(&self) -> Result<Vec<LogEntry>>;
    async fn delete_rows(&self, start: usize, count: usize) -> Result<()>;
    async fn clear_rows(&self, start: usize, count: usize) -> Result<()>;
}
