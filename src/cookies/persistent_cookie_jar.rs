use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::{Cookie, CookieJar, CookieJarHandle, CookieStoreHandle};
use std::sync::{Arc, RwLock};

/// A `CookieJar` decorator that persists changes after each mutation.
///
/// This type is *transparent* for reads but *eagerly* persists after writes.
pub struct PersistentCookieJar {
    /// Inner cookie jar that holds the actual cookie state.
    pub inner: Arc<RwLock<DefaultCookieJar>>,
    /// Handle to the cookie store responsible for persistence.
    store_handle: CookieStoreHandle,
}

impl PersistentCookieJar {
    /// Creates a new persistence-enabled wrapper around an existing jar.
    pub fn new(jar: DefaultCookieJar, store_handle: CookieStoreHandle) -> Self {
        Self {
            inner: Arc::new(RwLock::new(jar)),
            store_handle,
        }
    }

    /// Loads the jar from `store` and wraps it, ready to share.
    pub fn open(store: CookieStoreHandle) -> anyhow::Result<CookieJarHandle> {
        let jar = store.load()?;
        let handle: CookieJarHandle = Arc::new(RwLock::new(Self::new(jar, store)));
        Ok(handle)
    }

    /// Snapshots the inner jar and persists it to the backing store.
    ///
    /// Persistence is best-effort: the in-memory jar stays authoritative and a
    /// failed write is logged.
    fn persist(&self) {
        let snapshot = self.inner.read().unwrap().clone();
        if let Err(e) = self.store_handle.persist(&snapshot) {
            log::error!("Cannot persist cookie jar: {e:#}");
        }
    }
}

impl CookieJar for PersistentCookieJar {
    fn is_enabled(&self) -> bool {
        self.inner.read().unwrap().is_enabled()
    }

    fn cookies(&self) -> Vec<Cookie> {
        self.inner.read().unwrap().cookies()
    }

    /// Stores the cookie, then persists the updated state.
    fn set_cookie(&mut self, cookie: Cookie) {
        self.inner.write().unwrap().set_cookie(cookie);
        self.persist();
    }

    /// Removes a single cookie by name, then persists the updated state.
    fn remove_cookie(&mut self, name: &str) {
        self.inner.write().unwrap().remove_cookie(name);
        self.persist();
    }

    /// Clears all cookies in the jar, then persists the updated state.
    fn clear(&mut self) {
        self.inner.write().unwrap().clear();
        self.persist();
    }
}
