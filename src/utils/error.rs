use std::fmt;
use thiserror::Error;

/// 傳輸層在邊界上決定的錯誤種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    RateLimited,
    Unauthorized,
    NotFound,
    Client,
    Server,
    Timeout,
    Network,
    Decode,
}

impl FetchErrorKind {
    /// 從 HTTP 狀態碼分類（僅用於非成功回應）
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Server,
            _ => Self::Client,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server | Self::Timeout | Self::Network
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate limited",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::Client => "client error",
            Self::Server => "server error",
            Self::Timeout => "timeout",
            Self::Network => "network error",
            Self::Decode => "decode error",
        };
        f.write_str(label)
    }
}

/// EntityFetcher 回傳的分類錯誤，重試策略已在傳輸層用盡
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}: {message}", .http_status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub http_status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::from_status(status),
            http_status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_decode() {
            FetchErrorKind::Decode
        } else if let Some(status) = err.status() {
            FetchErrorKind::from_status(status.as_u16())
        } else {
            FetchErrorKind::Network
        };

        Self {
            kind,
            http_status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Unresolved placeholder '{placeholder}' in endpoint template: {template}")]
    TemplateError {
        template: String,
        placeholder: String,
    },

    #[error("Failed to write table '{table}': {message}")]
    SinkError { table: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Configuration,
    Storage,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn sink(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkError {
            table: table.into(),
            message: message.into(),
        }
    }

    /// 傳輸層判定的 rate limit（不做字串比對）
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_rate_limited())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) if e.is_rate_limited() => ErrorCategory::RateLimit,
            Self::Fetch(e) if e.kind == FetchErrorKind::Decode => ErrorCategory::Data,
            Self::Fetch(_) | Self::HttpError(_) => ErrorCategory::Network,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::TemplateError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::CsvError(_) | Self::SinkError { .. } => {
                ErrorCategory::Storage
            }
            Self::SerializationError(_) | Self::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Fetch(e) => match e.kind {
                FetchErrorKind::RateLimited
                | FetchErrorKind::Server
                | FetchErrorKind::Timeout
                | FetchErrorKind::Network => ErrorSeverity::Medium,
                _ => ErrorSeverity::High,
            },
            Self::HttpError(_) => ErrorSeverity::Medium,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::Critical,
            Self::IoError(_) => ErrorSeverity::Critical,
            Self::TemplateError { .. }
            | Self::CsvError(_)
            | Self::SinkError { .. }
            | Self::SerializationError(_)
            | Self::ProcessingError { .. } => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::RateLimit => {
                "Request a higher API quota for this project, or lower the sync frequency and increase pacing_delay_ms"
            }
            ErrorCategory::Network => match self {
                Self::Fetch(e) if e.kind == FetchErrorKind::Unauthorized => {
                    "Check that the credentials in [source.headers] are valid and have access to this API"
                }
                Self::Fetch(e) if e.kind == FetchErrorKind::NotFound => {
                    "Check the endpoint URL configured for this domain"
                }
                _ => "Check network connectivity and the upstream API status, then retry",
            },
            ErrorCategory::Configuration => {
                "Fix the configuration file and run `fanout-sync validate` before syncing again"
            }
            ErrorCategory::Storage => {
                "Check that the output directory exists and is writable"
            }
            ErrorCategory::Data => {
                "The API returned data in an unexpected shape; check items_field and columns"
            }
        }
    }

    /// 呈現給使用者的訊息；rate limit 需明確說明可能需要申請配額
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Fetch(e) if e.is_rate_limited() => format!(
                "The upstream API rejected the request because the rate limit was exceeded (HTTP 429). \
                 This API may require elevated quota approval before it can be synced. Details: {}",
                e.message
            ),
            Self::Fetch(e) => format!("The upstream API request failed: {}", e),
            other => other.to_string(),
        }
    }
}
