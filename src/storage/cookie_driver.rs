//! Storage driver on top of the browser cookie jar.
//!
//! The jar is one flat collection shared by everything running in the
//! context. Namespaces are emulated by prefixing every cookie name with a
//! per-instance prefix and filtering enumeration by that prefix:
//!
//! - an instance with the default store name uses `_lf_<name>__`
//! - any other store name uses `_lf_<name>__<storeName>__`
//!
//! Values are stored as JSON text. Every write and removal carries the same
//! [`CookieWriteOptions`] (secure, `SameSite=None`, long expiry) so entries
//! survive in third-party embedded contexts.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::config::CookieWriteOptions;
use crate::cookies::{Cookie, CookieJar, CookieJarHandle};
use crate::errors::StorageError;
use crate::storage::area::{StorageArea, StorageDriver};
use crate::storage::types::{StoreConfig, Visitor, DEFAULT_STORE_NAME};

const SECONDS_PER_DAY: i64 = 86_400;

/// Cookie name prefix of the instance opened with `config`.
pub fn instance_prefix(config: &StoreConfig) -> String {
    match config.store_name.as_deref() {
        Some(store_name) if store_name != DEFAULT_STORE_NAME => {
            format!("_lf_{}__{}__", config.name, store_name)
        }
        _ => format!("_lf_{}__", config.name),
    }
}

/// Cookie name prefix cleared by `drop_instance(config)`.
///
/// Without a store name this is the bare `_lf_<name>__`, which also covers
/// every store nested under that name.
pub fn drop_prefix(config: &StoreConfig) -> String {
    match config.store_name {
        Some(_) => instance_prefix(config),
        None => format!("_lf_{}__", config.name),
    }
}

/// Driver that keeps instances in a [`CookieJar`](crate::cookies::CookieJar).
pub struct CookieDriver {
    jar: CookieJarHandle,
    options: CookieWriteOptions,
}

impl CookieDriver {
    pub const NAME: &'static str = "cookie";

    pub fn new(jar: CookieJarHandle, options: CookieWriteOptions) -> Self {
        Self { jar, options }
    }
}

#[async_trait]
impl StorageDriver for CookieDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported(&self) -> bool {
        self.jar.read().unwrap().is_enabled()
    }

    async fn open(&self, config: &StoreConfig) -> Result<Arc<dyn StorageArea>> {
        config.validate()?;
        self.options.validate()?;
        let area = CookieArea {
            jar: Arc::clone(&self.jar),
            options: self.options.clone(),
            prefix: instance_prefix(config),
            config: config.clone(),
        };
        area.ensure_enabled()?;
        Ok(Arc::new(area))
    }
}

struct CookieArea {
    jar: CookieJarHandle,
    options: CookieWriteOptions,
    prefix: String,
    config: StoreConfig,
}

impl CookieArea {
    fn ensure_enabled(&self) -> Result<(), StorageError> {
        if self.jar.read().unwrap().is_enabled() {
            Ok(())
        } else {
            Err(StorageError::NoStorageAvailable(
                "cookies are disabled in this context".to_string(),
            ))
        }
    }

    fn cookie(&self, name: String, value: String, expires: OffsetDateTime) -> Result<Cookie> {
        Ok(Cookie {
            name,
            value,
            path: Some(self.options.path.clone()),
            domain: None,
            secure: self.options.secure,
            expires: Some(expires.format(&Rfc3339)?),
            same_site: Some(self.options.same_site),
            http_only: false,
        })
    }

    /// Expiry for a cookie written now.
    fn expiry(&self) -> Result<OffsetDateTime, StorageError> {
        let days = self.options.expiry_days;
        days.checked_mul(SECONDS_PER_DAY)
            .map(Duration::seconds)
            .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
            .ok_or_else(|| StorageError::InvalidConfig(format!("cookie expiry of {days} days is out of range")))
    }

    /// Writes an already-expired cookie with the usual attributes, which deletes it.
    fn expire(&self, name: String) -> Result<()> {
        let cookie = self.cookie(name, String::new(), OffsetDateTime::UNIX_EPOCH)?;
        self.jar.write().unwrap().set_cookie(cookie);
        Ok(())
    }

    fn cookie_names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.jar
            .read()
            .unwrap()
            .cookies()
            .into_iter()
            .filter(|c| c.name.starts_with(prefix))
            .map(|c| c.name)
            .collect()
    }

    fn decode(key: &str, raw: &str) -> Result<Value> {
        serde_json::from_str(raw).map_err(|source| {
            StorageError::Malformed {
                key: key.to_string(),
                source,
            }
            .into()
        })
    }
}

#[async_trait]
impl StorageArea for CookieArea {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_enabled()?;
        let cookie = self.jar.read().unwrap().get_cookie(&format!("{}{}", self.prefix, key));
        cookie.map(|c| Self::decode(key, &c.value)).transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        self.ensure_enabled()?;
        let expires = self.expiry()?;
        let cookie = self.cookie(format!("{}{}", self.prefix, key), value.to_string(), expires)?;
        self.jar.write().unwrap().set_cookie(cookie);
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_enabled()?;
        self.expire(format!("{}{}", self.prefix, key))
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_enabled()?;
        for name in self.cookie_names_with_prefix(&self.prefix) {
            self.expire(name)?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_enabled()?;
        Ok(self
            .cookie_names_with_prefix(&self.prefix)
            .into_iter()
            .map(|name| name[self.prefix.len()..].to_string())
            .collect())
    }

    /// Walks one snapshot of the jar. Ordinals only count this instance's cookies.
    async fn iterate(&self, visitor: Visitor<'_>) -> Result<Option<Value>> {
        self.ensure_enabled()?;
        let cookies = self.jar.read().unwrap().cookies();

        let mut ordinal = 0;
        for cookie in cookies {
            let Some(key) = cookie.name.strip_prefix(&self.prefix) else { continue };
            ordinal += 1;
            let value = Self::decode(key, &cookie.value)?;
            if let Some(result) = visitor(value, key, ordinal) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn drop_instance(&self, options: Option<&StoreConfig>) -> Result<()> {
        self.ensure_enabled()?;
        let target = options.unwrap_or(&self.config);
        target.validate()?;

        let prefix = drop_prefix(target);
        for name in self.cookie_names_with_prefix(&prefix) {
            self.expire(name)?;
        }
        Ok(())
    }
}
