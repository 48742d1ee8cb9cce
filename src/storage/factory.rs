use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::config::MediatorConfig;
use crate::cookies::CookieJarHandle;
use crate::errors::StorageError;
use crate::storage::area::{StorageArea, StorageDriver};
use crate::storage::cookie_driver::CookieDriver;
use crate::storage::memory::InMemoryDriver;
use crate::storage::types::StoreConfig;

/// Registry of storage drivers that opens instances by [`StoreConfig`].
///
/// Opening the same config twice yields two independent instance objects over
/// the same namespace.
pub struct StorageFactory {
    drivers: RwLock<HashMap<String, Arc<dyn StorageDriver>>>,
    default_driver: String,
}

impl Debug for StorageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let drivers: Vec<String> = self.drivers.read().unwrap().keys().cloned().collect();
        f.debug_struct("StorageFactory")
            .field("drivers", &drivers)
            .field("default_driver", &self.default_driver)
            .finish()
    }
}

impl StorageFactory {
    /// Creates an empty factory. `default_driver` is used for configs that do
    /// not name a driver.
    pub fn new(default_driver: impl Into<String>) -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            default_driver: default_driver.into(),
        }
    }

    /// Creates a factory with the standard drivers: cookie (on `jar`), memory,
    /// and sqlite when a database path is configured.
    pub fn from_config(config: &MediatorConfig, jar: CookieJarHandle) -> Result<Self> {
        config.cookie.validate()?;
        let factory = Self::new(config.default_driver.clone());
        factory.define_driver(Arc::new(CookieDriver::new(jar, config.cookie.clone())));
        factory.define_driver(Arc::new(InMemoryDriver::new()));

        #[cfg(feature = "sqlite_store")]
        if let Some(path) = &config.sqlite_path {
            let driver = crate::storage::SqliteDriver::new(path)?;
            factory.define_driver(Arc::new(driver));
        }

        Ok(factory)
    }

    /// Registers `driver` under its name, replacing any driver with that name.
    pub fn define_driver(&self, driver: Arc<dyn StorageDriver>) {
        log::debug!("Defining storage driver {}", driver.name());
        self.drivers
            .write()
            .unwrap()
            .insert(driver.name().to_string(), driver);
    }

    pub fn driver(&self, name: &str) -> Option<Arc<dyn StorageDriver>> {
        self.drivers.read().unwrap().get(name).cloned()
    }

    pub fn default_driver(&self) -> &str {
        &self.default_driver
    }

    /// Opens the instance addressed by `config`.
    ///
    /// The returned instance's config always names the driver that opened it,
    /// so it can be stored and reopened later.
    pub async fn create_instance(&self, mut config: StoreConfig) -> Result<Arc<dyn StorageArea>> {
        config.validate()?;
        let name = config
            .driver
            .get_or_insert_with(|| self.default_driver.clone())
            .clone();

        let driver = self
            .driver(&name)
            .ok_or_else(|| StorageError::UnknownDriver(name.clone()))?;
        if !driver.supported() {
            return Err(StorageError::NoStorageAvailable(format!("driver {name} is not supported here")).into());
        }

        driver.open(&config).await
    }
}
