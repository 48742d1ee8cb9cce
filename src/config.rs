use crate::cookies::SameSite;
use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the driver used when a store config does not pick one.
pub const DEFAULT_DRIVER: &str = "cookie";

/// Default expiry horizon for cookies written by the cookie driver.
const DEFAULT_COOKIE_EXPIRY_DAYS: i64 = 3650;

/// Attributes applied to every cookie the cookie driver writes or removes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieWriteOptions {
    /// Send only over HTTPS. Required by browsers for `SameSite=None`.
    pub secure: bool,
    /// Cross-site policy. `None` keeps the cookie visible to embedded contexts.
    pub same_site: SameSite,
    /// Cookie path scope.
    pub path: String,
    /// How many days from the time of writing a cookie stays alive.
    pub expiry_days: i64,
}

impl Default for CookieWriteOptions {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::None,
            path: "/".to_string(),
            expiry_days: DEFAULT_COOKIE_EXPIRY_DAYS,
        }
    }
}

impl CookieWriteOptions {
    /// A non-positive expiry would write cookies that are already expired.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.expiry_days <= 0 {
            return Err(StorageError::InvalidConfig(format!(
                "cookie expiry_days must be positive, got {}",
                self.expiry_days
            )));
        }
        Ok(())
    }
}

/// Main mediator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Driver used for stores that do not name one explicitly
    pub default_driver: String,
    /// Database file for the sqlite driver. `None` disables that driver.
    pub sqlite_path: Option<PathBuf>,
    /// Attributes for cookies written by the cookie driver
    pub cookie: CookieWriteOptions,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            default_driver: DEFAULT_DRIVER.to_string(),
            sqlite_path: None,
            cookie: CookieWriteOptions::default(),
        }
    }
}
