//! Cookie store infrastructure.
//!
//! A **cookie store** is the persistence layer behind a
//! [`PersistentCookieJar`](crate::cookies::PersistentCookieJar). The jar keeps the
//! live state in memory and pushes a snapshot to its store after every mutation.
//!
//! This module exports one reference implementation:
//! - [`JsonCookieStore`]: file-backed JSON store.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use mediator_storage::cookies::{JsonCookieStore, PersistentCookieJar};
//!
//! let store = Arc::new(JsonCookieStore::new("cookies.json".into()));
//! let jar = PersistentCookieJar::open(store).unwrap();
//! ```
mod json;

use crate::cookies::cookie_jar::DefaultCookieJar;
use std::sync::Arc;

/// File-backed JSON cookie store.
pub use json::JsonCookieStore;

/// A handle to a cookie store trait.
pub type CookieStoreHandle = Arc<dyn CookieStore + Send + Sync>;

/// Durable storage for a single cookie jar.
///
/// Implementations must be `Send + Sync` and safe for concurrent use.
pub trait CookieStore: Send + Sync {
    /// Loads the persisted jar, or an empty one if nothing was stored yet.
    fn load(&self) -> anyhow::Result<DefaultCookieJar>;

    /// Replaces the persisted state with `snapshot`.
    fn persist(&self, snapshot: &DefaultCookieJar) -> anyhow::Result<()>;

    /// Removes all persisted cookie data. Idempotent.
    fn remove(&self) -> anyhow::Result<()>;
}
