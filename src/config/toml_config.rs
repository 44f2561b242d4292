use crate::core::pacing::{PacingMode, PacingPolicy};
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_OUTPUT_PATH: &str = "./output";
const DEFAULT_STATE_FILE: &str = ".sync_state.json";
const DEFAULT_LOG_TABLE: &str = "Logs";
const DEFAULT_RETENTION_DAYS: u32 = 30;
const DEFAULT_PACING_DELAY_MS: u64 = 200;
const DEFAULT_MAX_PAGES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub sync: SyncSettings,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub name: String,
    pub principal: Option<String>,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    pub state_file: Option<String>,
    #[serde(default = "default_log_table")]
    pub log_table: String,
    #[serde(default = "default_retention_days")]
    pub log_retention_days: u32,
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
    #[serde(default)]
    pub pacing_mode: PacingMode,
}

impl SyncSettings {
    /// domain 未覆寫時使用的節流策略
    pub fn pacing_policy(&self) -> PacingPolicy {
        PacingPolicy::new(self.pacing_mode, self.pacing_delay_ms)
    }
}

/// HTTP 傳輸設定，所有 domain 共用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(30)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(2)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms.unwrap_or(500)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub pacing_delay_ms: Option<u64>,
    pub pacing_mode: Option<PacingMode>,
    pub primary: PrimaryListing,
    #[serde(default)]
    pub dependents: Vec<DependentListing>,
}

/// 一次列舉呼叫（可分頁）的設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub endpoint: String,
    pub method: Option<String>,
    pub body: Option<serde_json::Value>,
    /// 回應中實體陣列的位置（dot path）；未設定時回應本身須為陣列
    pub items_field: Option<String>,
    pub next_page_token_field: Option<String>,
    pub page_token_param: Option<String>,
    pub max_pages: Option<usize>,
}

impl ListingConfig {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    pub fn page_token_param(&self) -> &str {
        self.page_token_param.as_deref().unwrap_or("pageToken")
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES)
    }

    fn validate(&self, prefix: &str) -> Result<()> {
        validation::validate_endpoint_template(&format!("{}.endpoint", prefix), &self.endpoint)?;
        validation::validate_http_method(&format!("{}.method", prefix), self.method())?;
        if let Some(max_pages) = self.max_pages {
            validation::validate_range(&format!("{}.max_pages", prefix), max_pages, 1, 10_000)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub header: String,
    pub path: String,
}

impl ColumnSpec {
    pub fn new(header: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryListing {
    pub category: String,
    pub table: String,
    pub label: Option<String>,
    #[serde(flatten)]
    pub listing: ListingConfig,
    pub id_field: Option<String>,
    pub display_field: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl PrimaryListing {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("Account")
    }

    pub fn id_field(&self) -> &str {
        self.id_field.as_deref().unwrap_or("id")
    }

    pub fn display_field(&self) -> &str {
        self.display_field.as_deref().unwrap_or("displayName")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependentListing {
    pub category: String,
    pub table: String,
    #[serde(flatten)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

fn default_output_path() -> String {
    DEFAULT_OUTPUT_PATH.to_string()
}

fn default_log_table() -> String {
    DEFAULT_LOG_TABLE.to_string()
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_pacing_delay_ms() -> u64 {
    DEFAULT_PACING_DELAY_MS
}

impl SyncConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SyncError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_TOKEN})；未設定的保留原樣，交由驗證拒絕
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
    }

    /// 狀態（last sync 標記）以此 principal 為範圍
    pub fn principal(&self) -> String {
        self.sync
            .principal
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn output_path(&self) -> &str {
        &self.sync.output_path
    }

    /// 相對於 output_path 的狀態檔路徑
    pub fn state_file(&self) -> &str {
        self.sync.state_file.as_deref().unwrap_or(DEFAULT_STATE_FILE)
    }

    pub fn log_table(&self) -> &str {
        &self.sync.log_table
    }

    pub fn retention_days(&self) -> u32 {
        self.sync.log_retention_days
    }

    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn enabled_domains(&self) -> Vec<&DomainConfig> {
        self.domains.iter().filter(|d| d.is_enabled()).collect()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("sync.name", &self.sync.name)?;
        validation::validate_path("sync.output_path", &self.sync.output_path)?;
        validation::validate_path("sync.state_file", self.state_file())?;
        validation::validate_non_empty_string("sync.log_table", &self.sync.log_table)?;
        validation::validate_range(
            "sync.log_retention_days",
            self.sync.log_retention_days,
            1,
            3650,
        )?;
        validation::validate_range("sync.pacing_delay_ms", self.sync.pacing_delay_ms, 0, 60_000)?;

        if let Some(timeout) = self.source.timeout_seconds {
            validation::validate_range("source.timeout_seconds", timeout, 1, 600)?;
        }
        validation::validate_range("source.max_retries", self.source.max_retries(), 0, 10)?;
        validation::validate_range("source.retry_delay_ms", self.source.retry_delay_ms(), 0, 60_000)?;
        for (name, value) in &self.source.headers {
            validation::validate_no_unresolved_env(&format!("source.headers.{}", name), value)?;
        }

        if self.domains.is_empty() {
            return Err(SyncError::MissingConfigError {
                field: "domains".to_string(),
            });
        }
        validation::validate_unique("domains.name", self.domains.iter().map(|d| d.name.as_str()))?;

        for domain in &self.domains {
            domain.validate()?;
        }

        Ok(())
    }
}

impl DomainConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn pacing_policy(&self, default: PacingPolicy) -> PacingPolicy {
        default.overridden(self.pacing_mode, self.pacing_delay_ms)
    }

    /// 所有輸出類別，primary 在前
    pub fn categories(&self) -> Vec<&str> {
        std::iter::once(self.primary.category.as_str())
            .chain(self.dependents.iter().map(|d| d.category.as_str()))
            .collect()
    }
}

impl Validate for DomainConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("domains.name", &self.name)?;
        let prefix = format!("domains.{}", self.name);

        if let Some(delay) = self.pacing_delay_ms {
            validation::validate_range(&format!("{}.pacing_delay_ms", prefix), delay, 0, 60_000)?;
        }

        let primary = &self.primary;
        validation::validate_non_empty_string(&format!("{}.primary.category", prefix), &primary.category)?;
        validation::validate_non_empty_string(&format!("{}.primary.table", prefix), &primary.table)?;
        validation::validate_non_empty_string(&format!("{}.primary.id_field", prefix), primary.id_field())?;
        primary.listing.validate(&format!("{}.primary", prefix))?;

        let placeholders = validation::template_placeholders(&primary.listing.endpoint);
        if let Some(placeholder) = placeholders.first() {
            return Err(SyncError::TemplateError {
                template: primary.listing.endpoint.clone(),
                placeholder: placeholder.clone(),
            });
        }

        for dependent in &self.dependents {
            let dep_prefix = format!("{}.dependents.{}", prefix, dependent.category);
            validation::validate_non_empty_string(&format!("{}.category", dep_prefix), &dependent.category)?;
            validation::validate_non_empty_string(&format!("{}.table", dep_prefix), &dependent.table)?;
            dependent.listing.validate(&dep_prefix)?;
        }

        validation::validate_unique(&format!("{}.category", prefix), self.categories())?;
        validation::validate_unique(
            &format!("{}.table", prefix),
            std::iter::once(primary.table.as_str())
                .chain(self.dependents.iter().map(|d| d.table.as_str())),
        )?;

        Ok(())
    }
}

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC_CONFIG: &str = r#"
[sync]
name = "google-sync"
principal = "ops@example.com"
output_path = "./sync-output"

[source]
timeout_seconds = 10
[source.headers]
Authorization = "Bearer static-token"

[[domains]]
name = "business_profile"

[domains.primary]
category = "accounts"
table = "GBP Accounts"
endpoint = "https://api.example.com/v1/accounts"
items_field = "accounts"
next_page_token_field = "nextPageToken"
id_field = "name"
display_field = "accountName"
columns = [
  { header = "Account", path = "name" },
  { header = "Verification", path = "verificationState" },
]

[[domains.dependents]]
category = "locations"
table = "GBP Locations"
endpoint = "https://api.example.com/v1/{id}/locations"
items_field = "locations"
columns = [{ header = "Title", path = "title" }]
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = SyncConfig::from_toml_str(BASIC_CONFIG).unwrap();

        assert_eq!(config.sync.name, "google-sync");
        assert_eq!(config.principal(), "ops@example.com");
        assert_eq!(config.log_table(), "Logs");
        assert_eq!(config.retention_days(), 30);
        assert_eq!(config.state_file(), ".sync_state.json");
        assert_eq!(config.source.timeout_seconds(), 10);
        assert_eq!(config.source.max_retries(), 2);

        let domain = config.domain("business_profile").unwrap();
        assert!(domain.is_enabled());
        assert_eq!(domain.primary.id_field(), "name");
        assert_eq!(domain.primary.label(), "Account");
        assert_eq!(domain.primary.listing.method(), "GET");
        assert_eq!(domain.primary.listing.page_token_param(), "pageToken");
        assert_eq!(domain.primary.columns.len(), 2);
        assert_eq!(domain.dependents[0].listing.items_field.as_deref(), Some("locations"));
        assert_eq!(domain.categories(), vec!["accounts", "locations"]);
        assert_eq!(
            domain.pacing_policy(config.sync.pacing_policy()),
            PacingPolicy::FixedDelay(std::time::Duration::from_millis(200))
        );

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FANOUT_TEST_TOKEN", "secret-123");
        let content = BASIC_CONFIG.replace("static-token", "${FANOUT_TEST_TOKEN}");

        let config = SyncConfig::from_toml_str(&content).unwrap();
        assert_eq!(
            config.source.headers.get("Authorization").unwrap(),
            "Bearer secret-123"
        );

        std::env::remove_var("FANOUT_TEST_TOKEN");
    }

    #[test]
    fn test_unresolved_env_var_fails_validation() {
        let content = BASIC_CONFIG.replace("static-token", "${FANOUT_SURELY_UNSET_VAR}");
        let config = SyncConfig::from_toml_str(&content).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("FANOUT_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_invalid_endpoint_fails_validation() {
        let content = BASIC_CONFIG.replace("https://api.example.com/v1/accounts", "not-a-url");
        let config = SyncConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_category_fails_validation() {
        let content = BASIC_CONFIG.replace("category = \"locations\"", "category = \"accounts\"");
        let config = SyncConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_primary_endpoint_cannot_use_placeholders() {
        let content = BASIC_CONFIG.replace(
            "https://api.example.com/v1/accounts\"",
            "https://api.example.com/v1/{region}/accounts\"",
        );
        let config = SyncConfig::from_toml_str(&content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SyncError::TemplateError { .. })
        ));
    }

    #[test]
    fn test_config_without_domains_fails_validation() {
        let config = SyncConfig::from_toml_str("[sync]\nname = \"empty\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(SyncError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_pacing_mode_and_domain_override() {
        let content = BASIC_CONFIG
            .replace(
                "output_path = \"./sync-output\"",
                "output_path = \"./sync-output\"\npacing_mode = \"min_interval\"\npacing_delay_ms = 300",
            )
            .replace(
                "name = \"business_profile\"",
                "name = \"business_profile\"\npacing_delay_ms = 1000",
            );
        let config = SyncConfig::from_toml_str(&content).unwrap();

        let default = config.sync.pacing_policy();
        assert_eq!(default, PacingPolicy::MinInterval(std::time::Duration::from_millis(300)));

        let domain = config.domain("business_profile").unwrap();
        assert_eq!(
            domain.pacing_policy(default),
            PacingPolicy::MinInterval(std::time::Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_retry_delay_out_of_range_fails_validation() {
        let content = BASIC_CONFIG.replace(
            "timeout_seconds = 10",
            "timeout_seconds = 10\nretry_delay_ms = 120000",
        );
        let config = SyncConfig::from_toml_str(&content).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("source.retry_delay_ms"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC_CONFIG.as_bytes()).unwrap();

        let config = SyncConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.enabled_domains().len(), 1);
    }
}
