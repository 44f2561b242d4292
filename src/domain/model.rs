use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// API 回傳的單一實體 JSON 物件
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// 表格的一列，已轉為字串儲存格
pub type TableRow = Vec<String>;

/// 第一層列舉的資源（例如帳號）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryEntity {
    pub id: String,
    pub display_name: String,
    pub fields: Fields,
}

impl PrimaryEntity {
    pub fn reference(&self) -> PrimaryRef {
        PrimaryRef {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// 依附於某個 PrimaryEntity 的資源，僅保存 API 原始欄位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentEntity {
    pub fields: Fields,
}

/// 指回所屬 PrimaryEntity 的弱參照，只用於顯示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryRef {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDependent {
    pub owner: PrimaryRef,
    pub entity: DependentEntity,
}

/// 一種 dependent 資源在本次執行中的彙總結果
#[derive(Debug, Clone, PartialEq)]
pub struct DependentCollection {
    pub category: String,
    pub items: Vec<AnnotatedDependent>,
    /// 抓取失敗而以空集合代替的 primary id
    pub failed_owners: Vec<String>,
}

impl DependentCollection {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            items: Vec::new(),
            failed_owners: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Success,
    Error,
}

/// 單次 RunSync 的結果，回傳後不再變動
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub domain: String,
    pub record_counts: BTreeMap<String, usize>,
    pub total_duration_ms: u64,
    pub status: SyncStatus,
    pub error_message: Option<String>,
}

impl SyncResult {
    pub fn success(
        domain: impl Into<String>,
        record_counts: BTreeMap<String, usize>,
        total_duration_ms: u64,
    ) -> Self {
        Self {
            domain: domain.into(),
            record_counts,
            total_duration_ms,
            status: SyncStatus::Success,
            error_message: None,
        }
    }

    pub fn error(
        domain: impl Into<String>,
        message: impl Into<String>,
        total_duration_ms: u64,
    ) -> Self {
        Self {
            domain: domain.into(),
            record_counts: BTreeMap::new(),
            total_duration_ms,
            status: SyncStatus::Error,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    pub fn total_records(&self) -> usize {
        self.record_counts.values().sum()
    }

    /// 一行摘要，例如 `accounts: 3, locations: 12 (15 records in 842ms)`
    pub fn summary(&self) -> String {
        match self.status {
            SyncStatus::Success => {
                let counts = self
                    .record_counts
                    .iter()
                    .map(|(category, count)| format!("{}: {}", category, count))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{} ({} records in {}ms)",
                    counts,
                    self.total_records(),
                    self.total_duration_ms
                )
            }
            SyncStatus::Error => format!(
                "failed after {}ms: {}",
                self.total_duration_ms,
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

pub const LOG_HEADER: [&str; 5] = ["Timestamp", "Level", "Module", "Message", "Details"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
    pub details: Option<String>,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        module: impl Into<String>,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            module: module.into(),
            message: message.into(),
            details,
        }
    }

    pub fn to_row(&self) -> TableRow {
        vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.as_str().to_string(),
            self.module.clone(),
            self.message.clone(),
            self.details.clone().unwrap_or_default(),
        ]
    }

    /// 從持久化的一列還原；格式不符時回傳說明
    pub fn from_row(row: &[String]) -> Result<Self, String> {
        if row.len() < 4 {
            return Err(format!("expected at least 4 columns, got {}", row.len()));
        }

        let timestamp = DateTime::parse_from_rfc3339(row[0].trim())
            .map_err(|e| format!("invalid timestamp '{}': {}", row[0], e))?
            .with_timezone(&Utc);
        let level = row[1].parse::<LogLevel>()?;
        let details = row.get(4).filter(|d| !d.is_empty()).cloned();

        Ok(Self {
            timestamp,
            level,
            module: row[2].clone(),
            message: row[3].clone(),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_entry_row_conversion() {
        let entry = LogEntry::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            LogLevel::Warning,
            "merchant_center",
            "Failed to fetch data sources",
            Some("HTTP 500".to_string()),
        );

        let row = entry.to_row();
        assert_eq!(row[0], "2024-05-01T08:30:00.000Z");
        assert_eq!(row[1], "WARNING");
        assert_eq!(LogEntry::from_row(&row).unwrap(), entry);
    }

    #[test]
    fn test_log_entry_from_row_without_details() {
        let row = vec![
            "2024-05-01T08:30:00Z".to_string(),
            "info".to_string(),
            "engine".to_string(),
            "done".to_string(),
            String::new(),
        ];
        let entry = LogEntry::from_row(&row).unwrap();
        assert_eq!(entry.level, LogLevel::Info);
        assert!(entry.details.is_none());

        assert!(LogEntry::from_row(&["bad".to_string()]).is_err());
    }

    #[test]
    fn test_sync_result_summary() {
        let mut counts = BTreeMap::new();
        counts.insert("accounts".to_string(), 2);
        counts.insert("locations".to_string(), 5);
        let result = SyncResult::success("business_profile", counts, 1200);

        assert!(result.is_success());
        assert_eq!(result.total_records(), 7);
        assert_eq!(
            result.summary(),
            "accounts: 2, locations: 5 (7 records in 1200ms)"
        );

        let failed = SyncResult::error("business_profile", "quota", 15);
        assert!(!failed.is_success());
        assert_eq!(failed.total_records(), 0);
        assert_eq!(failed.summary(), "failed after 15ms: quota");
    }

    #[test]
    fn test_sync_status_serialization() {
        let json = serde_json::to_string(&SyncStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
    }
}
