//! Camera entity adapter.
//!
//! Resolves and caches a stream URL for the adapter lifetime and serves
//! still frames. Still capture is best-effort: a failed fetch degrades
//! to the last good image instead of erroring the entity.

use std::sync::Arc;

use bytes::Bytes;
use sentra_api::model::DeviceKey;
use sentra_api::{Account, DeviceHandle, StreamQuality};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CameraOptions, StreamMode};
use crate::entity::{self, ChangeSignal, DeviceInfo};
use crate::error::Result;

/// Source of still frames. The production implementation fetches over
/// HTTP; tests inject fakes.
pub trait SnapshotSource: Send + Sync {
    fn fetch(
        &self,
        key: DeviceKey,
    ) -> impl Future<Output = sentra_api::Result<Bytes>> + Send;
}

/// Fetches stills through the cloud API.
pub struct ApiSnapshotSource {
    account: Arc<Account>,
}

impl ApiSnapshotSource {
    pub fn new(account: Arc<Account>) -> Self {
        Self { account }
    }
}

impl SnapshotSource for ApiSnapshotSource {
    async fn fetch(&self, key: DeviceKey) -> sentra_api::Result<Bytes> {
        self.account.client().camera_snapshot(key).await
    }
}

/// One camera's stream and still-image surface.
pub struct CameraEntity<S> {
    handle: DeviceHandle,
    account: Arc<Account>,
    options: CameraOptions,
    snapshot: S,
    /// Resolved once, cached for the adapter lifetime.
    stream_url: Mutex<Option<String>>,
    last_image: Mutex<Option<Bytes>>,
    change: ChangeSignal,
}

impl<S: SnapshotSource> CameraEntity<S> {
    pub fn new(
        handle: DeviceHandle,
        account: Arc<Account>,
        options: CameraOptions,
        snapshot: S,
    ) -> Self {
        let change = ChangeSignal::new();
        entity::spawn_update_listener(handle.clone(), change.sender());
        Self {
            handle,
            account,
            options,
            snapshot,
            stream_url: Mutex::new(None),
            last_image: Mutex::new(None),
            change,
        }
    }

    pub fn unique_id(&self) -> String {
        entity::unique_id(self.handle.key(), None)
    }

    pub fn name(&self) -> String {
        self.handle.current().display_name()
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_device(&self.handle.current())
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }

    // ── Stream URL ───────────────────────────────────────────────────

    /// The RTSP URL for this camera, resolved on first use and cached.
    ///
    /// `Direct` mode asks the camera first and falls back to the
    /// internal relay for models without direct streaming.
    pub async fn stream_source(&self) -> Result<Option<String>> {
        let mut cached = self.stream_url.lock().await;
        if let Some(url) = cached.as_ref() {
            return Ok(Some(url.clone()));
        }

        let url = self.resolve_stream_url(self.options.rtsp_stream).await?;
        *cached = Some(url.clone());
        Ok(Some(url))
    }

    async fn resolve_stream_url(&self, mode: StreamMode) -> Result<String> {
        let key = self.handle.key();
        let quality = StreamQuality::from_hd_flag(self.options.hd_stream);
        let client = self.account.client();

        let url = match mode {
            StreamMode::Direct => {
                if let Some(direct) = client.direct_rtsp_url(key, quality).await? {
                    direct
                } else {
                    debug!(device = %key, "no direct stream, using internal relay");
                    client.relay_rtsp_url(key, true, quality).await?
                }
            }
            StreamMode::Internal => client.relay_rtsp_url(key, true, quality).await?,
            StreamMode::External => client.relay_rtsp_url(key, false, quality).await?,
        };

        Ok(url)
    }

    /// Log every resolvable RTSP URL for this camera. Only called at
    /// setup, and only when the user opted in: the URLs embed access
    /// tokens.
    pub async fn log_rtsp_urls(&self) {
        if !self.options.rtsp_url_logging {
            return;
        }

        let key = self.handle.key();
        let client = self.account.client();

        for quality in [StreamQuality::Hd, StreamQuality::Sd] {
            match client.direct_rtsp_url(key, quality).await {
                Ok(Some(url)) => info!(device = %key, ?quality, url, "direct RTSP URL"),
                Ok(None) => info!(device = %key, ?quality, "direct RTSP not supported"),
                Err(e) => debug!(device = %key, ?quality, error = %e, "direct RTSP lookup failed"),
            }
            for internal in [true, false] {
                let scope = if internal { "internal" } else { "external" };
                match client.relay_rtsp_url(key, internal, quality).await {
                    Ok(url) => info!(device = %key, ?quality, scope, url, "relay RTSP URL"),
                    Err(e) => {
                        debug!(device = %key, ?quality, scope, error = %e, "relay RTSP lookup failed");
                    }
                }
            }
        }
    }

    // ── Still images ─────────────────────────────────────────────────

    /// Fetch a still frame, best-effort.
    ///
    /// On failure the previous good frame is returned (or `None` if
    /// there never was one). Expected failure modes (transport trouble,
    /// malformed payloads) are logged at debug; anything else gets a
    /// warn, but the entity never errors over a missed frame.
    pub async fn camera_image(&self) -> Option<Bytes> {
        let key = self.handle.key();

        match self.snapshot.fetch(key).await {
            Ok(image) => {
                *self.last_image.lock().await = Some(image.clone());
                Some(image)
            }
            Err(e) => {
                if e.is_transient() || matches!(e, sentra_api::Error::Deserialization { .. }) {
                    debug!(device = %key, error = %e, "still capture failed, serving last image");
                } else {
                    warn!(device = %key, error = %e, "unexpected still capture failure");
                }
                self.last_image.lock().await.clone()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentra_api::model::{Device, DeviceKind, OnlineSignal};
    use sentra_api::{DeviceRegistry, TransportConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn camera_device() -> Device {
        Device {
            key: DeviceKey::new(7, 30),
            parent_id: None,
            name: Some("Porch".to_owned()),
            manufacturer: None,
            model: None,
            firmware_version: None,
            battery_level: None,
            online: Some(OnlineSignal::Device(true)),
            kind: DeviceKind::Camera,
            updated_at: Utc::now(),
        }
    }

    fn handle() -> DeviceHandle {
        let registry = DeviceRegistry::new();
        registry.upsert(camera_device());
        registry.get(DeviceKey::new(7, 30)).unwrap()
    }

    fn account_for(server: &MockServer) -> Arc<Account> {
        let url = Url::parse(&server.uri()).unwrap();
        Arc::new(Account::new(url, &TransportConfig::default()).unwrap())
    }

    /// Snapshot source that fails after a number of successes.
    struct FlakySource {
        calls: AtomicU32,
        succeed_first: u32,
    }

    impl SnapshotSource for FlakySource {
        async fn fetch(&self, _key: DeviceKey) -> sentra_api::Result<Bytes> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.succeed_first {
                Ok(Bytes::from(format!("frame-{call}")))
            } else {
                Err(sentra_api::Error::Api {
                    message: "camera offline".to_owned(),
                    status: 503,
                })
            }
        }
    }

    #[tokio::test]
    async fn stream_url_is_resolved_once_and_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/systems/7/devices/30/rtsp/direct"))
            .and(query_param("quality", "hd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "rtsp://cam.local/hd",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let entity = CameraEntity::new(
            handle(),
            account_for(&server),
            CameraOptions::default(),
            FlakySource {
                calls: AtomicU32::new(0),
                succeed_first: 0,
            },
        );

        let first = entity.stream_source().await.unwrap();
        let second = entity.stream_source().await.unwrap();

        assert_eq!(first.as_deref(), Some("rtsp://cam.local/hd"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn direct_mode_falls_back_to_internal_relay() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/systems/7/devices/30/rtsp/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": null })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/systems/7/devices/30/rtsp/relay"))
            .and(query_param("scope", "internal"))
            .and(query_param("quality", "sd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "rtsp://panel.local/relay_sd",
            })))
            .mount(&server)
            .await;

        let options = CameraOptions {
            hd_stream: false,
            ..CameraOptions::default()
        };

        let entity = CameraEntity::new(
            handle(),
            account_for(&server),
            options,
            FlakySource {
                calls: AtomicU32::new(0),
                succeed_first: 0,
            },
        );

        let url = entity.stream_source().await.unwrap();
        assert_eq!(url.as_deref(), Some("rtsp://panel.local/relay_sd"));
    }

    #[tokio::test]
    async fn external_mode_uses_the_external_relay() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/systems/7/devices/30/rtsp/relay"))
            .and(query_param("scope", "external"))
            .and(query_param("quality", "hd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "rtsp://relay.sentra.example/ext_hd",
            })))
            .mount(&server)
            .await;

        let options = CameraOptions {
            rtsp_stream: StreamMode::External,
            ..CameraOptions::default()
        };

        let entity = CameraEntity::new(
            handle(),
            account_for(&server),
            options,
            FlakySource {
                calls: AtomicU32::new(0),
                succeed_first: 0,
            },
        );

        let url = entity.stream_source().await.unwrap();
        assert_eq!(url.as_deref(), Some("rtsp://relay.sentra.example/ext_hd"));
    }

    #[tokio::test]
    async fn still_capture_degrades_to_last_image() {
        let server = MockServer::start().await;

        let entity = CameraEntity::new(
            handle(),
            account_for(&server),
            CameraOptions::default(),
            FlakySource {
                calls: AtomicU32::new(0),
                succeed_first: 1,
            },
        );

        // First call succeeds and is cached.
        assert_eq!(
            entity.camera_image().await,
            Some(Bytes::from_static(b"frame-0"))
        );

        // Second call fails; the cached frame is served instead.
        assert_eq!(
            entity.camera_image().await,
            Some(Bytes::from_static(b"frame-0"))
        );
    }

    #[tokio::test]
    async fn still_capture_with_no_history_yields_none() {
        let server = MockServer::start().await;

        let entity = CameraEntity::new(
            handle(),
            account_for(&server),
            CameraOptions::default(),
            FlakySource {
                calls: AtomicU32::new(0),
                succeed_first: 0,
            },
        );

        assert_eq!(entity.camera_image().await, None);
    }
}
