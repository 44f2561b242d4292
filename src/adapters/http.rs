//! reqwest 實作的 [`EntityFetcher`]。
//!
//! 狀態碼在這裡分類成 [`FetchErrorKind`]，上層只依 kind 判斷，不解析訊息文字。
//! 可重試的錯誤（429、5xx、逾時、連線）依 `max_retries` 線性退避後重送，
//! 429 的 `Retry-After` 較長時以它為準。

use crate::config::SourceConfig;
use crate::domain::ports::{EntityFetcher, FetchRequest};
use crate::utils::error::{FetchError, FetchErrorKind, Result, SyncError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const MAX_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct HttpEntityFetcher {
    client: Client,
    default_headers: BTreeMap<String, String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpEntityFetcher {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(source.timeout_seconds()))
            .user_agent(concat!("fanout-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_headers: source.headers.clone(),
            max_retries: source.max_retries(),
            retry_delay: Duration::from_millis(source.retry_delay_ms()),
        })
    }

    fn build_headers(&self, request: &FetchRequest) -> std::result::Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        // 個別請求的標頭覆蓋預設值
        for (key, value) in self.default_headers.iter().chain(request.headers.iter()) {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                FetchError::new(FetchErrorKind::Client, format!("invalid header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                FetchError::new(FetchErrorKind::Client, format!("invalid value for header '{}': {}", key, e))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn send_once(
        &self,
        request: &FetchRequest,
        headers: HeaderMap,
    ) -> std::result::Result<Value, (FetchError, Option<Duration>)> {
        let method = match request.method.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => {
                let message = format!("unsupported HTTP method '{}' for {}", other, request.url);
                return Err((FetchError::new(FetchErrorKind::Client, message), None));
            }
        };

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("🌐 {} {}", request.method, request.url);
        let response = builder.send().await.map_err(|e| (FetchError::from(e), None))?;
        tracing::debug!("📥 {} -> {}", request.url, response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err((FetchError::from_status(status, error_message(status, &body)), retry_after));
        }

        let text = response.text().await.map_err(|e| (FetchError::from(e), None))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            (
                FetchError::new(FetchErrorKind::Decode, format!("invalid JSON from {}: {}", request.url, e)),
                None,
            )
        })
    }
}

#[async_trait]
impl EntityFetcher for HttpEntityFetcher {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Value, FetchError> {
        let headers = self.build_headers(request)?;
        let mut attempt = 0;

        loop {
            match self.send_once(request, headers.clone()).await {
                Ok(value) => return Ok(value),
                Err((error, retry_after)) => {
                    if !error.kind.is_retryable() || attempt >= self.max_retries {
                        return Err(error);
                    }
                    attempt += 1;
                    let linear = self.retry_delay.saturating_mul(attempt);
                    let delay = retry_after.map_or(linear, |wait| wait.max(linear));
                    tracing::warn!(
                        "🔁 Retry {}/{} for {} in {:?}: {}",
                        attempt,
                        self.max_retries,
                        request.url,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// 從錯誤回應中取出 API 的說明文字
fn error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match detail {
        Some(message) => message,
        None if body.trim().is_empty() => format!("request failed with status {}", status),
        None => body.chars().take(500).collect(),
    }
}
