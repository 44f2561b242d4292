use crate::adapters::storage::read_optional;
use crate::domain::ports::{DurableStore, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

type StateFile = BTreeMap<String, BTreeMap<String, String>>;

/// JSON 檔案保存的鍵值狀態，依 principal 分開存放
pub struct JsonStateStore<S: Storage> {
    storage: S,
    file: String,
    principal: String,
    lock: Mutex<()>,
}

impl<S: Storage> JsonStateStore<S> {
    pub fn new(storage: S, file: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            storage,
            file: file.into(),
            principal: principal.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    async fn load(&self) -> Result<StateFile> {
        match read_optional(&self.storage, &self.file).await? {
            Some(data) if !data.is_empty() => Ok(serde_json::from_slice(&data)?),
            _ => Ok(StateFile::new()),
        }
    }
}

#[async_trait]
impl<S: Storage> DurableStore for JsonStateStore<S> {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let state = self.load().await?;
        Ok(state
            .get(&self.principal)
            .and_then(|values| values.get(key))
            .cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        state
            .entry(self.principal.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());

        let data = serde_json::to_vec_pretty(&state)?;
        self.storage.write_file(&self.file, &data).await
    }
}
