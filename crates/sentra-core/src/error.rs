use thiserror::Error;

/// Errors from the integration layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from the Sentra Cloud API client.
    #[error(transparent)]
    Api(#[from] sentra_api::Error),

    /// The hub is not logged in for an operation that requires a session.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Filesystem error outside the session cache (config dir creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Login needs a second factor; follow up with `Hub::verify_mfa`.
    pub fn is_mfa_required(&self) -> bool {
        matches!(self, Self::Api(sentra_api::Error::MfaRequired))
    }

    /// Bad or expired credentials. Fatal for the current login attempt.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_auth())
    }

    /// Connectivity trouble; the host's retry policy may try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
