use crate::config::{ColumnSpec, ListingConfig, PrimaryListing};
use crate::domain::model::{AnnotatedDependent, Fields, PrimaryEntity, TableRow};
use crate::domain::ports::{EntityFetcher, FetchRequest};
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::placeholder_regex;
use regex::Captures;
use serde_json::Value;
use std::collections::BTreeSet;

/// 分頁列舉的結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagedListing {
    pub items: Vec<Fields>,
    pub pages: usize,
    /// 達到 max_pages 仍有下一頁
    pub truncated: bool,
}

/// 以 dot path 取值，數字片段可索引陣列（例如 `addresses.0.city`）
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn lookup_field<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = fields.get(head)?;
    match rest {
        Some(rest) => lookup_path(value, rest),
        None => Some(value),
    }
}

/// 儲存格字串：字串原樣、null/缺值為空、其餘用 JSON 表示
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 以 primary entity 代入端點模板中的 `{placeholder}`；語法與設定驗證共用
pub fn render_template(template: &str, primary: &PrimaryEntity) -> Result<String> {
    let mut unresolved: Option<String> = None;

    let rendered = placeholder_regex().replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        let value = match name {
            "id" => Some(primary.id.clone()),
            "display_name" => Some(primary.display_name.clone()),
            _ => lookup_field(&primary.fields, name).and_then(scalar_text),
        };
        value.unwrap_or_else(|| {
            unresolved.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });

    match unresolved {
        Some(placeholder) => Err(SyncError::TemplateError {
            template: template.to_string(),
            placeholder,
        }),
        None => Ok(rendered.into_owned()),
    }
}

/// 取出實體陣列；API 在沒有資料時常省略欄位，視為零筆
pub fn extract_items(response: &Value, items_field: Option<&str>) -> Result<Vec<Fields>> {
    let items = match items_field {
        Some(path) => match lookup_path(response, path) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(items) => items,
        },
        None if response.is_null() => return Ok(Vec::new()),
        None => response,
    };

    let Value::Array(items) = items else {
        return Err(SyncError::ProcessingError {
            message: format!(
                "expected an array at '{}', got {}",
                items_field.unwrap_or("<root>"),
                json_type(items)
            ),
        });
    };

    Ok(items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Fields::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        })
        .collect())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn next_page_token(response: &Value, field: Option<&str>) -> Option<String> {
    let field = field?;
    match lookup_path(response, field)? {
        Value::String(token) if !token.is_empty() => Some(token.clone()),
        _ => None,
    }
}

pub fn with_query_param(url: &str, name: &str, value: &str) -> Result<String> {
    let mut parsed = url::Url::parse(url).map_err(|e| SyncError::InvalidConfigValueError {
        field: "endpoint".to_string(),
        value: url.to_string(),
        reason: format!("Invalid URL format: {}", e),
    })?;
    parsed.query_pairs_mut().append_pair(name, value);
    Ok(parsed.to_string())
}

pub fn listing_request(url: String, listing: &ListingConfig) -> FetchRequest {
    FetchRequest {
        url,
        method: listing.method().to_ascii_uppercase(),
        headers: Default::default(),
        body: listing.body.clone(),
    }
}

/// 依 next page token 逐頁抓取直到沒有下一頁或達到 max_pages
pub async fn fetch_all_pages<F>(
    fetcher: &F,
    url: &str,
    listing: &ListingConfig,
) -> Result<PagedListing>
where
    F: EntityFetcher + ?Sized,
{
    let mut result = PagedListing::default();
    let mut page_token: Option<String> = None;

    loop {
        let page_url = match &page_token {
            Some(token) => with_query_param(url, listing.page_token_param(), token)?,
            None => url.to_string(),
        };

        tracing::debug!("📡 Fetching page {} from {}", result.pages + 1, page_url);
        let response = fetcher.fetch(&listing_request(page_url, listing)).await?;
        result.pages += 1;
        result
            .items
            .extend(extract_items(&response, listing.items_field.as_deref())?);

        page_token = next_page_token(&response, listing.next_page_token_field.as_deref());
        if page_token.is_none() {
            break;
        }
        if result.pages >= listing.max_pages() {
            result.truncated = true;
            break;
        }
    }

    Ok(result)
}

/// 由原始欄位建立 PrimaryEntity；缺少 id 時回傳 None
pub fn build_primary(fields: Fields, config: &PrimaryListing) -> Option<PrimaryEntity> {
    let id = lookup_field(&fields, config.id_field()).and_then(scalar_text)?;
    let display_name = lookup_field(&fields, config.display_field())
        .and_then(scalar_text)
        .unwrap_or_else(|| id.clone());

    Some(PrimaryEntity {
        id,
        display_name,
        fields,
    })
}

fn resolve_columns<'a, I>(columns: &[ColumnSpec], records: I) -> Vec<ColumnSpec>
where
    I: IntoIterator<Item = &'a Fields>,
{
    if !columns.is_empty() {
        return columns.to_vec();
    }

    let keys: BTreeSet<&String> = records.into_iter().flat_map(|fields| fields.keys()).collect();
    keys.into_iter()
        .map(|key| ColumnSpec::new(key.clone(), key.clone()))
        .collect()
}

/// primary 表格：標題列與資料列
pub fn primary_table(entities: &[PrimaryEntity], columns: &[ColumnSpec]) -> (TableRow, Vec<TableRow>) {
    let columns = resolve_columns(columns, entities.iter().map(|e| &e.fields));
    let header = columns.iter().map(|c| c.header.clone()).collect();
    let rows = entities
        .iter()
        .map(|entity| {
            columns
                .iter()
                .map(|c| render_cell(lookup_field(&entity.fields, &c.path)))
                .collect()
        })
        .collect();

    (header, rows)
}

/// dependent 表格：前兩欄為所屬 primary 的 id 與名稱
pub fn dependent_table(
    items: &[AnnotatedDependent],
    owner_label: &str,
    columns: &[ColumnSpec],
) -> (TableRow, Vec<TableRow>) {
    let columns = resolve_columns(columns, items.iter().map(|i| &i.entity.fields));

    let mut header = vec![format!("{} ID", owner_label), format!("{} Name", owner_label)];
    header.extend(columns.iter().map(|c| c.header.clone()));

    let rows = items
        .iter()
        .map(|item| {
            let mut row = vec![item.owner.id.clone(), item.owner.display_name.clone()];
            row.extend(
                columns
                    .iter()
                    .map(|c| render_cell(lookup_field(&item.entity.fields, &c.path))),
            );
            row
        })
        .collect();

    (header, rows)
}
