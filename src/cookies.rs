//! Cookies: the flat, shared cookie jar the cookie storage driver writes into.
//!
//! A [`CookieJar`] holds every cookie visible to the embedded context. It has no
//! notion of namespaces; the cookie driver layers those on top by prefixing
//! cookie names. Jars are shared as [`CookieJarHandle`]s and may be made durable
//! by wrapping them in a [`PersistentCookieJar`] backed by a [`CookieStore`].

mod cookies;
mod cookie_jar;
mod persistent_cookie_jar;
mod store;

pub use cookies::Cookie;
pub use cookies::CookieJarHandle;
pub use cookies::SameSite;

pub use cookie_jar::CookieJar;
pub use cookie_jar::DefaultCookieJar;
pub use persistent_cookie_jar::PersistentCookieJar;

pub use store::CookieStore;
pub use store::CookieStoreHandle;
pub use store::JsonCookieStore;
