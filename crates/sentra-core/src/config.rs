//! Integration configuration.
//!
//! Plain serde structs with defaults. The password is wrapped in
//! `SecretString` so it never lands in debug output or log fields.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default Sentra Cloud API root.
pub const DEFAULT_API_URL: &str = "https://api.sentracloud.example";

/// Polling refresh interval in seconds.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Which RTSP surface camera stream URLs resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// RTSP served by the camera itself. Falls back to the internal
    /// relay for cameras that do not support it.
    #[default]
    Direct,
    /// Relay through the panel, local-network scope.
    Internal,
    /// Relay through the panel, cloud scope.
    External,
}

/// Camera behavior options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Request HD streams instead of SD.
    pub hd_stream: bool,
    /// Which stream surface to resolve.
    pub rtsp_stream: StreamMode,
    /// Log all six resolved RTSP URLs at camera setup. Off by default
    /// since the URLs embed access tokens.
    pub rtsp_url_logging: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            hd_stream: true,
            rtsp_stream: StreamMode::Direct,
            rtsp_url_logging: false,
        }
    }
}

/// Top-level hub configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub username: String,
    pub password: SecretString,

    /// Directory holding the session cookie cache.
    pub cache_dir: PathBuf,

    /// API root. Overridable for test servers.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub camera: CameraOptions,
}

fn default_api_url() -> Url {
    // The constant is a valid URL; parsing it cannot fail.
    Url::parse(DEFAULT_API_URL).expect("default API URL parses")
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}
