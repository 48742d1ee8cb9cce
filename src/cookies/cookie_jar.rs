//! Cookie jar abstraction and a simple in-memory implementation.
//!
//! A **cookie jar** represents the flat set of cookies visible to the embedded
//! context, much like `document.cookie`: one namespace, keyed by cookie name,
//! enumerated in the order cookies were first set.
//!
//! ## Notes & limitations
//! - Writing a cookie whose expiry is in the past removes it, which is how
//!   browsers delete cookies and how the cookie driver removes entries.
//! - Expired cookies are filtered out of every read and pruned on writes.
//! - Domain and path matching is not modelled; the jar is the view of a single
//!   document.
//! - This module is **not** internally synchronized. Use it via a
//!   `CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>`.

use crate::cookies::{Cookie, CookieJarHandle};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

/// A flat cookie jar.
pub trait CookieJar: Send + Sync {
    /// Whether the context may use cookies at all. Blocked jars ignore writes
    /// and read as empty.
    fn is_enabled(&self) -> bool;

    /// All live cookies in enumeration order.
    fn cookies(&self) -> Vec<Cookie>;

    /// Returns the live cookie named `name`.
    fn get_cookie(&self, name: &str) -> Option<Cookie> {
        self.cookies().into_iter().find(|c| c.name == name)
    }

    /// Stores `cookie`, replacing any cookie with the same name in place.
    /// An already-expired cookie deletes the existing entry instead.
    fn set_cookie(&mut self, cookie: Cookie);

    /// Removes a single cookie by name.
    fn remove_cookie(&mut self, name: &str);

    /// Removes all cookies from the jar.
    fn clear(&mut self);

    /// `document.cookie`-style rendering: `a=1; b=2`.
    fn cookie_string(&self) -> String {
        self.cookies()
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Default cookie jar, in-memory only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultCookieJar {
    /// Cookies in the order they were first set.
    pub entries: Vec<Cookie>,

    /// Set for contexts where the user agent blocks cookies.
    #[serde(skip)]
    blocked: bool,
}

impl DefaultCookieJar {
    /// Creates an empty in-memory cookie jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// A jar for a context in which cookies are disabled.
    pub fn blocked() -> Self {
        Self {
            entries: Vec::new(),
            blocked: true,
        }
    }

    fn prune_expired(&mut self, now: OffsetDateTime) {
        self.entries.retain(|c| !c.is_expired_at(now));
    }
}

impl From<DefaultCookieJar> for CookieJarHandle {
    fn from(jar: DefaultCookieJar) -> Self {
        Arc::new(RwLock::new(jar))
    }
}

impl CookieJar for DefaultCookieJar {
    fn is_enabled(&self) -> bool {
        !self.blocked
    }

    fn cookies(&self) -> Vec<Cookie> {
        if self.blocked {
            return Vec::new();
        }
        let now = OffsetDateTime::now_utc();
        self.entries
            .iter()
            .filter(|c| !c.is_expired_at(now))
            .cloned()
            .collect()
    }

    fn set_cookie(&mut self, cookie: Cookie) {
        if self.blocked {
            return;
        }
        let now = OffsetDateTime::now_utc();
        self.prune_expired(now);

        if cookie.is_expired_at(now) {
            self.entries.retain(|c| c.name != cookie.name);
            return;
        }

        // Replace existing cookie with same name
        if let Some(existing) = self.entries.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            self.entries.push(cookie);
        }
    }

    fn remove_cookie(&mut self, name: &str) {
        self.entries.retain(|c| c.name != name);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
