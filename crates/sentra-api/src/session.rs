//! On-disk session cache.
//!
//! The session cookie jar is persisted after every successful
//! authentication event so a restarted process can resume the session
//! without re-prompting for credentials (or a second factor). The blob is
//! an opaque JSON document; its format version appears both inside the
//! file and as a filename suffix, so an incompatible format change never
//! trips over a stale file -- it simply misses the cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Bump on any incompatible change to [`SessionCache`]'s serialized form.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Default cache filename, version-tagged.
pub fn default_cache_filename() -> String {
    format!(".sentra_session_v{CACHE_FORMAT_VERSION}.json")
}

/// Resolve the cache path inside a config directory.
pub fn cache_path(config_dir: &Path) -> PathBuf {
    config_dir.join(default_cache_filename())
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionCache {
    version: u32,
    /// Serialized `name=value` cookie strings for the API origin.
    cookies: Vec<String>,
}

/// Persist the session cookies for `base_url` to `path`.
///
/// Called after every successful login or MFA verification. Writing an
/// empty cookie list is valid (the next load is simply a no-op).
pub fn save(path: &Path, jar: &Arc<Jar>, base_url: &Url) -> Result<(), Error> {
    let cookies = jar
        .cookies(base_url)
        .and_then(|header| header.to_str().ok().map(String::from))
        .map(|header| header.split("; ").map(String::from).collect())
        .unwrap_or_default();

    let cache = SessionCache {
        version: CACHE_FORMAT_VERSION,
        cookies,
    };

    let body = serde_json::to_vec(&cache).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })?;
    std::fs::write(path, body)?;

    debug!(path = %path.display(), "session cache written");
    Ok(())
}

/// Restore previously saved cookies for `base_url` into the jar.
///
/// Returns `Ok(false)` when the file holds an unknown format version
/// (treated as a cache miss, never an error). A missing file surfaces as
/// [`Error::Cache`] with `NotFound`; callers restore best-effort and are
/// expected to swallow it.
pub fn load(path: &Path, jar: &Arc<Jar>, base_url: &Url) -> Result<bool, Error> {
    let body = std::fs::read_to_string(path)?;

    let cache: SessionCache = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("corrupt session cache: {e}"),
        body,
    })?;

    if cache.version != CACHE_FORMAT_VERSION {
        debug!(
            found = cache.version,
            expected = CACHE_FORMAT_VERSION,
            "session cache version mismatch, ignoring"
        );
        return Ok(false);
    }

    for cookie in &cache.cookies {
        jar.add_cookie_str(cookie, base_url);
    }

    debug!(
        path = %path.display(),
        count = cache.cookies.len(),
        "session cache restored"
    );
    Ok(true)
}

/// Delete the cache file. `NotFound` when it does not exist; callers
/// tolerate that.
pub fn remove(path: &Path) -> Result<(), Error> {
    std::fs::remove_file(path)?;
    debug!(path = %path.display(), "session cache removed");
    Ok(())
}
