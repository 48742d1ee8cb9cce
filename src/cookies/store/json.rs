//! JSON-backed cookie store.
//!
//! `JsonCookieStore` persists a cookie jar in a single JSON file on disk.
//!
//! ### I/O characteristics & caveats
//! - `persist` rewrites the entire file.
//! - File writes are not atomic.
//! - A file that does not parse is treated as empty and overwritten on the next write.
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::store::CookieStore;
use crate::cookies::Cookie;

/// On-disk representation of a cookie jar.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CookieStoreFile {
    cookies: Vec<Cookie>,
}

/// A JSON-based cookie store that persists cookies across sessions.
pub struct JsonCookieStore {
    /// Path to the JSON file where cookies are stored.
    path: PathBuf,
}

impl JsonCookieStore {
    /// Creates a JSON cookie store at `path`. The file is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_file(&self) -> anyhow::Result<CookieStoreFile> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CookieStoreFile::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading cookie store {}", self.path.display()))
            }
        };

        Ok(serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Cookie store {} is corrupt, starting empty: {e}", self.path.display());
            CookieStoreFile::default()
        }))
    }

    fn save_file(&self, store_file: &CookieStoreFile) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(store_file)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("writing cookie store {}", self.path.display()))
    }
}

impl CookieStore for JsonCookieStore {
    fn load(&self) -> anyhow::Result<DefaultCookieJar> {
        let file = self.load_file()?;
        let mut jar = DefaultCookieJar::new();
        jar.entries = file.cookies;
        Ok(jar)
    }

    fn persist(&self, snapshot: &DefaultCookieJar) -> anyhow::Result<()> {
        self.save_file(&CookieStoreFile {
            cookies: snapshot.entries.clone(),
        })
    }

    fn remove(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("removing cookie store {}", self.path.display()))
            }
            _ => Ok(()),
        }
    }
}
