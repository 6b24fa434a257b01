// Authentication endpoints.
//
// Cookie-based session login/logout and MFA verification. The login
// endpoint sets a session cookie in the client's jar; subsequent
// requests use that cookie automatically.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;

impl ApiClient {
    /// Authenticate with username/password: `POST /api/login`.
    ///
    /// On success the session cookie lands in the client's cookie jar and
    /// is used for all subsequent requests. A pending second factor is
    /// surfaced as [`Error::MfaRequired`]; follow up with
    /// [`verify_mfa`](Self::verify_mfa).
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let url = self.api_url("login")?;

        debug!("logging in at {}", url);

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        self.post_no_content(url, &body).await?;

        debug!("login successful");
        Ok(())
    }

    /// Submit a second-factor code: `POST /api/login/mfa`.
    ///
    /// Completes a login that returned [`Error::MfaRequired`]. Underlying
    /// failures propagate unchanged.
    pub async fn verify_mfa(&self, code: &str) -> Result<(), Error> {
        let url = self.api_url("login/mfa")?;

        debug!("verifying MFA code");

        self.post_no_content(url, &json!({ "code": code })).await?;

        debug!("MFA verification successful");
        Ok(())
    }

    /// End the current session: `POST /api/logout`.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.api_url("logout")?;

        debug!("logging out at {}", url);

        self.post_no_content(url, &json!({})).await?;

        debug!("logout complete");
        Ok(())
    }
}
