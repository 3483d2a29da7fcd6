use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{CredentialStore, StoreError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialFile {
    items: BTreeMap<String, Value>,
    updated_at: Option<DateTime<Utc>>,
}

/// Credentials persisted as a single pretty-printed JSON file.
///
/// Every operation reloads the file so values written by another process are
/// picked up on the next read.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.items)
    }

    async fn load(&self) -> Result<CredentialFile, StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(CredentialFile::default());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(CredentialFile::default());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Malformed {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn save(&self, mut file: CredentialFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        file.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        write_private(&self.path, content.as_bytes()).await
    }
}

/// Write `bytes` to `path`, readable by the owner only on Unix
async fn write_private(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;

    // `mode` only applies on creation; tighten files left by older versions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        file.items.insert(key.to_string(), value);
        self.save(file).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if file.items.remove(key).is_some() {
            self.save(file).await?;
        }
        Ok(())
    }
}
