use thiserror::Error;

/// Top-level error type for the `sentra-api` crate.
///
/// Covers every failure mode across the API surfaces: authentication,
/// transport, the REST API, the push event stream, and the on-disk
/// session cache. `sentra-core` maps these into integration-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A second factor is required to complete login.
    ///
    /// Not a failure in the usual sense -- callers are expected to follow
    /// up with a `verify_mfa` call and retry from there.
    #[error("Multi-factor authentication code required")]
    MfaRequired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── REST API ────────────────────────────────────────────────────
    /// Error response from the Sentra Cloud API.
    #[error("API error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    // ── Push events ─────────────────────────────────────────────────
    /// Event stream connection failed.
    #[error("Event stream connection failed: {0}")]
    EventStream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Session cache ───────────────────────────────────────────────
    /// Reading or writing the on-disk session cache failed.
    #[error("Session cache error: {0}")]
    Cache(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error indicates bad or expired credentials
    /// and re-authentication might resolve it.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Authentication failures and MFA prompts are never transient --
    /// retrying them without new input would just fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            Self::EventStream(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error (missing cache file,
    /// HTTP 404).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Cache(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::Api { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
