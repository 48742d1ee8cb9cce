//! Cookie core types.
//!
//! This module defines the **type-erased handle** used to share a jar and the
//! serializable [`Cookie`] data structure.
//!
//! # Concurrency model
//! - [`CookieJarHandle`] is `Arc<RwLock<dyn CookieJar + Send + Sync>>`.
//!   - Callers take a **read lock** for non-mutating operations and a **write lock**
//!     for mutating operations on the underlying jar.
//!
//! The [`Cookie`] struct can be (de)serialized via `serde`, which is how
//! [`JsonCookieStore`](crate::cookies::JsonCookieStore) persists a jar.
//!
//! ```rust,no_run
//! use mediator_storage::cookies::{Cookie, SameSite};
//!
//! let c = Cookie {
//!     name: "_lf_permission_https://a.example__storageAccess".into(),
//!     value: r#"{"state":"granted"}"#.into(),
//!     path: Some("/".into()),
//!     domain: None,
//!     secure: true,
//!     expires: Some("2035-12-31T23:59:59Z".into()), // RFC 3339
//!     same_site: Some(SameSite::None),
//!     http_only: false,
//! };
//! ```

use crate::cookies::CookieJar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A handle to a cookie jar trait.
///
/// This is a reference-counted, read/write-locked pointer to a type-erased
/// [`CookieJar`]. Obtain a **read lock** for queries and a **write lock** for
/// mutations.
pub type CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>;

/// SameSite policy of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    /// Cross-site allowed; browsers require `secure` alongside it.
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(s)
    }
}

/// A cookie as stored in a jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value.
    pub value: String,

    /// Path scoping (e.g., `"/"`).
    pub path: Option<String>,

    /// Domain scoping (host-only if `None`).
    pub domain: Option<String>,

    /// If `true`, cookie is sent only over HTTPS.
    pub secure: bool,

    /// Expiration timestamp in RFC 3339. Session cookies have `None`.
    pub expires: Option<String>,

    /// SameSite policy.
    pub same_site: Option<SameSite>,

    /// If `true`, cookie is blocked from access by client-side scripts.
    pub http_only: bool,
}

impl Cookie {
    /// Creates a host-only session cookie with no attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            secure: false,
            expires: None,
            same_site: None,
            http_only: false,
        }
    }

    /// Parsed expiry, if the cookie carries a valid one.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires
            .as_deref()
            .and_then(|e| OffsetDateTime::parse(e, &Rfc3339).ok())
    }

    /// Whether the cookie has expired at `now`. Unparseable expiries count as session cookies.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// Whether the cookie has expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
