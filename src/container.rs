//! Permission-gated item storage for a relying origin.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::errors::MediatorError;
use crate::permissions::{PermissionDescriptor, PermissionManager};
use crate::storage::{coerce_key, StorageArea, StorageFactory, StoreConfig};

/// Items of one type, stored in the instance `<itemType>_<origin>`.
///
/// Every operation requires the configured permission to be granted. Item ids
/// arrive as untrusted JSON and are coerced to string keys.
pub struct SimpleContainer {
    item_type: String,
    permission: PermissionDescriptor,
    permissions: Arc<PermissionManager>,
    factory: Arc<StorageFactory>,
    driver: Option<String>,
    storage: OnceCell<Arc<dyn StorageArea>>,
}

impl SimpleContainer {
    pub fn new(
        item_type: impl Into<String>,
        permission: impl Into<String>,
        permissions: Arc<PermissionManager>,
        factory: Arc<StorageFactory>,
    ) -> Result<Self, MediatorError> {
        let item_type = item_type.into();
        if item_type.is_empty() {
            return Err(MediatorError::Validation("item type must not be empty".to_string()));
        }
        Ok(Self {
            item_type,
            permission: PermissionDescriptor::new(permission),
            permissions,
            factory,
            driver: None,
            storage: OnceCell::new(),
        })
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn storage_name(&self) -> String {
        format!("{}_{}", self.item_type, self.permissions.origin())
    }

    pub async fn get(&self, id: &Value) -> Result<Option<Value>, MediatorError> {
        let storage = self.authorized().await?;
        Ok(storage.get(&coerce_key(id)).await?)
    }

    /// Stores `item` under `id` and returns the stored item.
    pub async fn set(&self, id: &Value, item: Value) -> Result<Value, MediatorError> {
        let storage = self.authorized().await?;
        Ok(storage.set(&coerce_key(id), item).await?)
    }

    /// Removes `id`; returns whether it was present.
    pub async fn delete(&self, id: &Value) -> Result<bool, MediatorError> {
        let storage = self.authorized().await?;
        let key = coerce_key(id);
        if storage.get(&key).await?.is_none() {
            return Ok(false);
        }
        storage.remove(&key).await?;
        Ok(true)
    }

    pub async fn has(&self, id: &Value) -> Result<bool, MediatorError> {
        Ok(self.get(id).await?.is_some())
    }

    pub async fn keys(&self) -> Result<Vec<String>, MediatorError> {
        let storage = self.authorized().await?;
        Ok(storage.keys().await?)
    }

    pub async fn clear(&self) -> Result<(), MediatorError> {
        let storage = self.authorized().await?;
        Ok(storage.clear().await?)
    }

    async fn authorized(&self) -> Result<Arc<dyn StorageArea>, MediatorError> {
        self.permissions.ensure_granted(&self.permission).await?;
        let storage = self
            .storage
            .get_or_try_init(|| async {
                let mut config = StoreConfig::new(self.storage_name());
                config.driver = self.driver.clone();
                self.factory.create_instance(config).await
            })
            .await?;
        Ok(storage.clone())
    }
}
