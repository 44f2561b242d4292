use crate::utils::error::{Result, SyncError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 端點模板的 `{placeholder}` 語法
pub fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("valid placeholder regex"))
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"))
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(SyncError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

/// 驗證含 `{placeholder}` 的端點模板：佔位符以樣本值代入後需為合法 URL
pub fn validate_endpoint_template(field_name: &str, template: &str) -> Result<()> {
    validate_no_unresolved_env(field_name, template)?;
    let sample = placeholder_regex().replace_all(template, "placeholder");
    validate_url(field_name, &sample).map_err(|_| SyncError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: template.to_string(),
        reason: "Endpoint must be an http(s) URL".to_string(),
    })
}

/// 取出模板中的佔位符名稱
pub fn template_placeholders(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// `${VAR}` 未被環境變數替換時拒絕
pub fn validate_no_unresolved_env(field_name: &str, value: &str) -> Result<()> {
    if let Some(caps) = env_var_regex().captures(value) {
        return Err(SyncError::ConfigValidationError {
            field: field_name.to_string(),
            message: format!("Environment variable '{}' is not set", &caps[1]),
        });
    }
    Ok(())
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_unique<'a, I>(field_name: &str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(SyncError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: value.to_string(),
                reason: "Value must be unique".to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_http_method(field_name: &str, method: &str) -> Result<()> {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "POST" => Ok(()),
        _ => Err(SyncError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: method.to_string(),
            reason: "Only GET and POST listings are supported".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("endpoint", "https://example.com").is_ok());
        assert!(validate_url("endpoint", "http://example.com").is_ok());
        assert!(validate_url("endpoint", "").is_err());
        assert!(validate_url("endpoint", "invalid-url").is_err());
        assert!(validate_url("endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_endpoint_template() {
        assert!(validate_endpoint_template(
            "dependents.endpoint",
            "https://api.example.com/v1/accounts/{id}/locations"
        )
        .is_ok());
        assert!(validate_endpoint_template("dependents.endpoint", "{id}/locations").is_err());
        assert!(validate_endpoint_template(
            "dependents.endpoint",
            "https://${API_HOST}/accounts/{id}"
        )
        .is_err());
    }

    #[test]
    fn test_template_placeholders() {
        assert_eq!(
            template_placeholders("https://x/{id}/items/{region.code}"),
            vec!["id".to_string(), "region.code".to_string()]
        );
        assert!(template_placeholders("https://x/items").is_empty());
    }

    #[test]
    fn test_validate_unique() {
        assert!(validate_unique("categories", ["a", "b"]).is_ok());
        assert!(validate_unique("categories", ["a", "b", "a"]).is_err());
    }

    #[test]
    fn test_validate_range_and_method() {
        assert!(validate_range("retention", 30, 1, 3650).is_ok());
        assert!(validate_range("retention", 0, 1, 3650).is_err());
        assert!(validate_http_method("method", "get").is_ok());
        assert!(validate_http_method("method", "DELETE").is_err());
    }
}
