use super::types::{StoreConfig, Visitor};
use crate::errors::StorageError;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// One namespaced key/value storage instance.
///
/// Every operation may suspend on the backing medium. Entries written through
/// one instance are never visible through an instance with a different
/// [`StoreConfig`], whatever the medium.
#[async_trait]
pub trait StorageArea: Send + Sync {
    /// The config this instance was opened with.
    fn config(&self) -> &StoreConfig;

    /// Retrieves the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key` and returns the value accepted.
    async fn set(&self, key: &str, value: Value) -> Result<Value>;

    /// Removes `key`. Absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes every entry of this instance's namespace.
    async fn clear(&self) -> Result<()>;

    /// All keys of this namespace, in the medium's enumeration order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Number of keys in this namespace.
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// The `n`-th key (0-indexed) in enumeration order.
    async fn key(&self, n: usize) -> Result<Option<String>> {
        Ok(self.keys().await?.into_iter().nth(n))
    }

    /// Calls `visitor` for every entry, stopping at the first `Some` it returns.
    async fn iterate(&self, visitor: Visitor<'_>) -> Result<Option<Value>> {
        let mut ordinal = 0;
        for key in self.keys().await? {
            // Entries removed since `keys()` was taken are skipped.
            let Some(value) = self.get(&key).await? else { continue };
            ordinal += 1;
            if let Some(result) = visitor(value, &key, ordinal) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Deletes every entry of the namespace addressed by `options`, or of this
    /// instance when `None`. The namespace does not have to be open anywhere.
    async fn drop_instance(&self, options: Option<&StoreConfig>) -> Result<()>;
}

impl dyn StorageArea {
    /// Reads `key` and deserializes it into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| anyhow::Error::from(StorageError::Malformed { key: key.to_string(), source })),
            None => Ok(None),
        }
    }

    /// Serializes `value` and stores it under `key`. `None` is stored as null.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<Value> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

/// A storage backend that opens [`StorageArea`]s.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Name under which the driver is registered with a factory.
    fn name(&self) -> &str;

    /// Whether the medium is usable in the current context.
    fn supported(&self) -> bool {
        true
    }

    /// Opens (initializes) the instance addressed by `config`.
    async fn open(&self, config: &StoreConfig) -> Result<Arc<dyn StorageArea>>;
}
