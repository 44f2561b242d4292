use crate::domain::ports::Storage;
use crate::utils::error::{Result, SyncError};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// 本機檔案系統，所有路徑相對於 base_path
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }
}

/// 檔案不存在時回傳 None，其他錯誤照常傳遞
pub async fn read_optional<S: Storage>(storage: &S, path: &str) -> Result<Option<Vec<u8>>> {
    match storage.read_file(path).await {
        Ok(data) => Ok(Some(data)),
        Err(SyncError::IoError(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// 表格名稱轉為安全的檔名
pub fn table_file_name(table: &str) -> String {
    let sanitized: String = table
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{}.csv", sanitized)
}
