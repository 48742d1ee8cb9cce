//! Permission caching and consent for relying origins.
//!
//! A [`PermissionManager`] is bound to one origin and owns the registry of
//! permission names it accepts. Statuses are cached in the storage instance
//! `permission_<origin>`; the [`ConsentHandler`] supplied by the embedder is
//! only consulted when the cached state is `prompt`.

mod manager;
mod types;

pub use manager::{consent_fn, ConsentFn, ConsentHandler, PermissionManager};
pub use types::{PermissionDescriptor, PermissionState, PermissionStatus};
