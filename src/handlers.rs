//! Web request handler registrations.
//!
//! A [`HandlerRegistry`] records, per request type, which handler URLs the
//! relying origin has registered. Two kinds of storage instance are involved:
//!
//! - `webRequestHandler_<requestType>_origin`: the origin index, mapping every
//!   origin with registrations to the config of its handler store;
//! - `webRequestHandler_<requestType>_<origin>_registration`: one handler store
//!   per origin, mapping handler URL to `true`.
//!
//! The index is what lets [`HandlerRegistry::get_all_registrations`] enumerate
//! handlers across origins without knowing them up front.

mod event;
mod registry;
mod url;

pub use event::{RegistryEvent, Subscription, UnregisterEvent, UnregisterListener};
pub use registry::HandlerRegistry;
pub use self::url::normalize_url;
