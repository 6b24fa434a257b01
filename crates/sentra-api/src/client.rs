// HTTP client for the Sentra Cloud REST API.
//
// Wraps `reqwest::Client` with base-URL construction, status-to-error
// mapping, and body deserialization. All endpoint groups (auth, devices,
// cameras) are implemented as inherent methods in separate files under
// `endpoints/` to keep this module focused on transport mechanics.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body the API sends with non-2xx responses:
/// `{"code": "mfa_required", "message": "..."}`.
#[derive(serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const MFA_REQUIRED_CODE: &str = "mfa_required";

/// Raw HTTP client for the Sentra Cloud API.
///
/// Owns the cookie jar that carries the session; the jar is shared with
/// [`TransportConfig`] so the session cache can serialize it.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    cookie_jar: Arc<Jar>,
}

impl ApiClient {
    /// Create a new client against the given API root
    /// (e.g. `https://api.sentra.example`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let cookie_jar = Arc::clone(&transport.cookie_jar);
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            cookie_jar,
        })
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The session cookie jar (for cache save/restore).
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookie_jar
    }

    /// Extract the session cookie header value for the event stream
    /// upgrade request. `None` if no session cookie is held.
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookie_jar.cookies(&self.base_url)?;
        cookies.to_str().ok().map(String::from)
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Build a full URL for an API path: `{base}/api/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and deserialize the response body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        self.parse_response(resp).await
    }

    /// Send a GET request and return the raw response body.
    pub(crate) async fn get_bytes(&self, url: Url) -> Result<bytes::Bytes, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let resp = self.check_status(resp).await?;
        resp.bytes().await.map_err(Error::Transport)
    }

    /// Send a POST request with a JSON body and deserialize the response.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        self.parse_response(resp).await
    }

    /// Send a POST request and discard any response body.
    pub(crate) async fn post_no_content(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        self.check_status(resp).await.map(|_| ())
    }

    /// Map the response status to an error, returning the response
    /// untouched on success.
    ///
    /// 401 bodies are inspected for the MFA marker: the API signals a
    /// pending second factor as `{"code": "mfa_required"}`, which is
    /// control flow for callers, not a credential failure.
    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
                if err.code.as_deref() == Some(MFA_REQUIRED_CODE) {
                    return Err(Error::MfaRequired);
                }
                return Err(Error::Authentication {
                    message: err
                        .message
                        .unwrap_or_else(|| "invalid credentials".to_owned()),
                });
            }
            return Err(Error::Authentication {
                message: format!("HTTP 401: {}", preview(&body)),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| preview(&body).to_owned());
            return Err(Error::Api {
                message,
                status: status.as_u16(),
            });
        }

        Ok(resp)
    }

    /// Check the status, then deserialize the body.
    async fn parse_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let resp = self.check_status(resp).await?;
        let body = resp.text().await.map_err(Error::Transport)?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

/// First 200 bytes of an error body, truncated on a char boundary.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
