use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store name used when a config does not set one.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";

/// Addressing information for one storage instance.
///
/// Serialized with camelCase field names (`storeName`) so that configs kept
/// inside other stores stay readable by other implementations.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_name: None,
            driver: None,
        }
    }

    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// The store name, falling back to [`DEFAULT_STORE_NAME`].
    pub fn store_name_or_default(&self) -> &str {
        self.store_name.as_deref().unwrap_or(DEFAULT_STORE_NAME)
    }

    /// The store name when it addresses a store nested under `name`, i.e. is
    /// neither absent nor [`DEFAULT_STORE_NAME`]. Dropping a config without a
    /// nested store name drops every store under `name`.
    pub fn nested_store_name(&self) -> Option<&str> {
        self.store_name.as_deref().filter(|s| *s != DEFAULT_STORE_NAME)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.is_empty() {
            return Err(StorageError::MissingConfig("name"));
        }
        if self.store_name.as_deref() == Some("") {
            return Err(StorageError::MissingConfig("storeName"));
        }
        Ok(())
    }
}

/// Callback for [`StorageArea::iterate`](crate::storage::StorageArea::iterate).
///
/// Receives `(value, key, ordinal)` with ordinals starting at 1. Returning
/// `Some` stops the iteration and becomes its result.
pub type Visitor<'a> = &'a mut (dyn FnMut(Value, &str, usize) -> Option<Value> + Send);

/// Turns a JSON key into the string key the storage contract expects.
///
/// Non-string keys are converted to their JSON text and a warning is logged.
pub fn coerce_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => {
            let coerced = other.to_string();
            log::warn!("{coerced} used as a key, but it is not a string");
            coerced
        }
    }
}
