//! Storage system for the mediator.
//!
//! This module defines the driver-agnostic key/value contract that permission
//! and handler bookkeeping is built on, the factory that hands out named
//! storage instances, and the concrete drivers.
//!
//! # Concepts
//!
//! - A **storage instance** ([`StorageArea`]) is a namespace addressed by a
//!   [`StoreConfig`] (`name` plus optional `store_name`). It maps string keys to
//!   opaque JSON values. Two instances with different configs never see each
//!   other's entries, even when they share one physical medium.
//! - A **driver** ([`StorageDriver`]) opens instances on one medium.
//! - The [`StorageFactory`] keeps a registry of drivers and opens instances by
//!   config, so callers never name a concrete backend.
//!
//! # Available drivers
//!
//! - [`CookieDriver`]: emulates namespaces on a flat cookie jar by prefixing
//!   cookie names. Works where no database storage is available.
//! - [`SqliteDriver`]: database-backed driver (feature `sqlite_store`).
//! - [`InMemoryDriver`]: process-local driver, for tests and ephemeral use.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediator_storage::cookies::DefaultCookieJar;
//! use mediator_storage::storage::{CookieDriver, StorageFactory, StoreConfig};
//! use mediator_storage::config::CookieWriteOptions;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let factory = StorageFactory::new("cookie");
//! factory.define_driver(Arc::new(CookieDriver::new(
//!     DefaultCookieJar::new().into(),
//!     CookieWriteOptions::default(),
//! )));
//!
//! let store = factory.create_instance(StoreConfig::new("permission_https://a.example")).await?;
//! store.set("storageAccess", serde_json::json!({"state": "granted"})).await?;
//! # Ok(())
//! # }
//! ```

/// Storage contract: instance and driver traits.
pub mod area;
/// Cookie-jar-backed driver.
pub mod cookie_driver;
/// Driver registry handing out named instances.
pub mod factory;
/// In-memory driver.
pub mod memory;
/// SQLite-backed driver.
#[cfg(feature = "sqlite_store")]
pub mod sqlite_store;
/// Storage types
pub mod types;

pub use area::{StorageArea, StorageDriver};
pub use cookie_driver::CookieDriver;
pub use factory::StorageFactory;
pub use memory::InMemoryDriver;
#[cfg(feature = "sqlite_store")]
pub use sqlite_store::SqliteDriver;
pub use types::{coerce_key, StoreConfig, Visitor, DEFAULT_STORE_NAME};
