//! Storage and permission layer for a cross-origin request mediator.
//!
//! - [`storage`]: the driver-agnostic key/value contract, plus cookie, memory
//!   and sqlite drivers and the factory that opens instances by config.
//! - [`cookies`]: the cookie jar the cookie driver writes through.
//! - [`permissions`]: per-origin permission cache and consent gate.
//! - [`handlers`]: web request handler registrations.
//! - [`container`]: permission-gated item storage.

pub mod config;
pub mod container;
pub mod cookies;
pub mod errors;
pub mod handlers;
pub mod permissions;
pub mod storage;

pub use config::MediatorConfig;
pub use container::SimpleContainer;
pub use errors::{MediatorError, StorageError};
pub use handlers::HandlerRegistry;
pub use permissions::PermissionManager;
pub use storage::{StorageArea, StorageFactory, StoreConfig};
