pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::auth::AuthScheme;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store has not been initialized")]
    NotInitialized,

    #[error("credential store backend error: {0}")]
    Backend(String),

    #[error("stored value for '{key}' is malformed: {message}")]
    Malformed { key: String, message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Asynchronous key/value store holding credentials.
///
/// Written by login/session-refresh code; the dispatcher only reads from it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed access on top of the JSON-valued store
#[async_trait]
pub trait CredentialStoreExt: CredentialStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_item(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set_item(key, value).await
    }
}

impl<S: CredentialStore + ?Sized> CredentialStoreExt for S {}

/// A token as persisted in the store.
///
/// Older writers store the bare token string and leave the scheme to be
/// inferred; newer ones record the scheme next to the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredCredential {
    Explicit { scheme: AuthScheme, value: String },
    Raw(String),
}

impl StoredCredential {
    pub fn raw(token: impl Into<String>) -> Self {
        StoredCredential::Raw(token.into())
    }

    pub fn explicit(scheme: AuthScheme, value: impl Into<String>) -> Self {
        StoredCredential::Explicit {
            scheme,
            value: value.into(),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            StoredCredential::Explicit { value, .. } => value,
            StoredCredential::Raw(value) => value,
        }
    }

    pub fn scheme(&self) -> Option<AuthScheme> {
        match self {
            StoredCredential::Explicit { scheme, .. } => Some(*scheme),
            StoredCredential::Raw(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.token().trim().is_empty()
    }
}

static INSTALLED: OnceLock<Arc<dyn CredentialStore>> = OnceLock::new();

/// Install the process-wide store. Returns false if one was already installed.
pub fn install(store: Arc<dyn CredentialStore>) -> bool {
    INSTALLED.set(store).is_ok()
}

/// The process-wide store, for call sites that cannot be handed one
pub fn installed() -> Result<Arc<dyn CredentialStore>, StoreError> {
    INSTALLED.get().cloned().ok_or(StoreError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_credential_shapes() {
        let raw: StoredCredential = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(raw, StoredCredential::raw("abc"));
        assert_eq!(raw.scheme(), None);

        let explicit: StoredCredential =
            serde_json::from_value(json!({"scheme": "Bearer", "value": "abc"})).unwrap();
        assert_eq!(explicit.scheme(), Some(AuthScheme::Bearer));
        assert_eq!(explicit.token(), "abc");
    }

    #[test]
    fn test_blank_detection() {
        assert!(StoredCredential::raw("   ").is_blank());
        assert!(StoredCredential::explicit(AuthScheme::Token, "").is_blank());
        assert!(!StoredCredential::raw("x").is_blank());
    }

    #[tokio::test]
    async fn test_typed_access() {
        let store = MemoryStore::new();
        store.set("dm_token", &StoredCredential::raw("tok")).await.unwrap();

        let value: Option<StoredCredential> = store.get("dm_token").await.unwrap();
        assert_eq!(value, Some(StoredCredential::raw("tok")));

        store.set_item("bad", json!(42)).await.unwrap();
        let err = store.get::<StoredCredential>("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
