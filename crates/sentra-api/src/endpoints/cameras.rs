// Camera stream endpoints.
//
// Cameras expose two stream surfaces: a direct RTSP URL served by the
// camera itself (not supported by every model -- the endpoint returns a
// null URL then), and relay URLs served through the panel, scoped either
// to the local network ("internal") or the cloud relay ("external").

use tracing::debug;
use url::Url;

use crate::client::ApiClient;
use crate::error::Error;
use crate::model::{DeviceKey, RtspUrlResponse};

/// Requested stream quality for RTSP URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamQuality {
    Hd,
    Sd,
}

impl StreamQuality {
    /// From the boolean "hd stream" configuration flag.
    pub fn from_hd_flag(hd: bool) -> Self {
        if hd { Self::Hd } else { Self::Sd }
    }

    fn as_query(self) -> &'static str {
        match self {
            Self::Hd => "hd",
            Self::Sd => "sd",
        }
    }
}

impl ApiClient {
    /// Resolve a camera's direct RTSP URL:
    /// `GET /api/systems/{panel}/devices/{device}/rtsp/direct?quality=`.
    ///
    /// Returns `None` when the camera does not support direct streaming.
    pub async fn direct_rtsp_url(
        &self,
        key: DeviceKey,
        quality: StreamQuality,
    ) -> Result<Option<String>, Error> {
        let url = self.rtsp_url_endpoint(key, "direct", quality)?;

        debug!(device = %key, ?quality, "resolving direct RTSP URL");

        let resp: RtspUrlResponse = self.get(url).await?;
        Ok(resp.url)
    }

    /// Resolve a camera's relay RTSP URL:
    /// `GET /api/systems/{panel}/devices/{device}/rtsp/relay?scope=&quality=`.
    ///
    /// Relay URLs are always available for online cameras, so a null URL
    /// from this endpoint is an API error rather than a capability gap.
    pub async fn relay_rtsp_url(
        &self,
        key: DeviceKey,
        internal: bool,
        quality: StreamQuality,
    ) -> Result<String, Error> {
        let mut url = self.rtsp_url_endpoint(key, "relay", quality)?;
        url.query_pairs_mut()
            .append_pair("scope", if internal { "internal" } else { "external" });

        debug!(device = %key, internal, ?quality, "resolving relay RTSP URL");

        let resp: RtspUrlResponse = self.get(url).await?;
        resp.url.ok_or_else(|| Error::Api {
            message: format!("no relay stream URL for camera {key}"),
            status: 200,
        })
    }

    /// Fetch a still frame from a camera:
    /// `GET /api/systems/{panel}/devices/{device}/snapshot`.
    pub async fn camera_snapshot(&self, key: DeviceKey) -> Result<bytes::Bytes, Error> {
        let url = self.api_url(&format!(
            "systems/{}/devices/{}/snapshot",
            key.panel_id, key.device_id
        ))?;

        debug!(device = %key, "fetching camera snapshot");

        self.get_bytes(url).await
    }

    fn rtsp_url_endpoint(
        &self,
        key: DeviceKey,
        kind: &str,
        quality: StreamQuality,
    ) -> Result<Url, Error> {
        let mut url = self.api_url(&format!(
            "systems/{}/devices/{}/rtsp/{kind}",
            key.panel_id, key.device_id
        ))?;
        url.query_pairs_mut()
            .append_pair("quality", quality.as_query());
        Ok(url)
    }
}
