//! 凭证持久化
//!
//! 凭证以固定键名保存在一个小型 JSON 键值文件中，进程重启后仍然有效。

use async_trait::async_trait;
use cxr_core::{CxrError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// 凭证保存时使用的固定键名
pub const CREDENTIAL_KEY: &str = "access_token";

/// 凭证存储接口
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// 内存存储，用于测试和演示
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), value.to_string());
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// 文件存储
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    // 串行化读-改-写
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<HashMap<String, String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(CxrError::Storage(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(
                    "Credential file {} is corrupt, ignoring it: {}",
                    self.path.display(),
                    e
                );
                Ok(HashMap::new())
            }
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CxrError::Storage(format!(
                    "cannot remove {}: {}",
                    self.path.display(),
                    e
                ))),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CxrError::Storage(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let payload = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| CxrError::Storage(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CxrError::Storage(format!("cannot replace {}: {}", self.path.display(), e)))?;

        debug!("Credential file {} updated", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries().await?.remove(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileCredentialStore::new(&path);
        store.save(CREDENTIAL_KEY, "token-1").await.unwrap();

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(
            reopened.load(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("token-1")
        );

        reopened.remove(CREDENTIAL_KEY).await.unwrap();
        assert!(reopened.load(CREDENTIAL_KEY).await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(store.load(CREDENTIAL_KEY).await.unwrap().is_none());

        store.save(CREDENTIAL_KEY, "token-2").await.unwrap();
        assert_eq!(
            store.load(CREDENTIAL_KEY).await.unwrap().as_deref(),
            Some("token-2")
        );
    }

    #[tokio::test]
    async fn test_remove_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileCredentialStore::new(&path);
        store.save(CREDENTIAL_KEY, "token").await.unwrap();
        store.save("locale", "es-ES").await.unwrap();
        store.remove(CREDENTIAL_KEY).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.load("locale").await.unwrap().as_deref(), Some("es-ES"));
    }
}
