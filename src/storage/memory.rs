use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::storage::area::{StorageArea, StorageDriver};
use crate::storage::types::StoreConfig;

/// `(name, store name)` of a namespace.
type Namespace = (String, String);
type Medium = Arc<RwLock<HashMap<Namespace, Vec<(String, Value)>>>>;

/// In-memory driver (no persistence). Instances opened from clones of the
/// same driver share one medium, so reopening a config sees earlier writes.
#[derive(Clone, Default)]
pub struct InMemoryDriver {
    data: Medium,
}

impl InMemoryDriver {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageDriver for InMemoryDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn open(&self, config: &StoreConfig) -> Result<Arc<dyn StorageArea>> {
        config.validate()?;
        Ok(Arc::new(InMemoryArea {
            data: Arc::clone(&self.data),
            namespace: (config.name.clone(), config.store_name_or_default().to_string()),
            config: config.clone(),
        }))
    }
}

struct InMemoryArea {
    data: Medium,
    namespace: Namespace,
    config: StoreConfig,
}

#[async_trait]
impl StorageArea for InMemoryArea {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .data
            .read()
            .unwrap()
            .get(&self.namespace)
            .and_then(|entries| entries.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let mut guard = self.data.write().unwrap();
        let entries = guard.entry(self.namespace.clone()).or_default();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.clone(),
            None => entries.push((key.to_string(), value.clone())),
        }
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if let Some(entries) = self.data.write().unwrap().get_mut(&self.namespace) {
            entries.retain(|(k, _)| k != key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().unwrap().remove(&self.namespace);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .data
            .read()
            .unwrap()
            .get(&self.namespace)
            .map(|entries| entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default())
    }

    async fn drop_instance(&self, options: Option<&StoreConfig>) -> Result<()> {
        let target = options.unwrap_or(&self.config);
        target.validate()?;

        let mut guard = self.data.write().unwrap();
        match target.nested_store_name() {
            Some(store_name) => {
                guard.remove(&(target.name.clone(), store_name.to_string()));
            }
            None => guard.retain(|(name, _), _| *name != target.name),
        }
        Ok(())
    }
}
