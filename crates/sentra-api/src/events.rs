//! Push event stream with auto-reconnect.
//!
//! Connects to the Sentra Cloud websocket endpoint and streams parsed
//! push messages through a [`tokio::sync::broadcast`] channel. Handles
//! reconnection with exponential backoff + jitter automatically. The
//! upgrade request carries the session cookie; an expired session shows
//! up as repeated connect failures and is left to the caller's refresh
//! logic.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::model::DeviceResponse;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── PushMessage ──────────────────────────────────────────────────────

/// A parsed message from the push stream.
///
/// Unknown message types are surfaced as [`PushMessage::Unknown`] so the
/// bridge can count them instead of silently dropping frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Full state snapshot for one device.
    DeviceSync { data: DeviceResponse },
    /// A device newly provisioned on the account.
    DeviceAdded { data: DeviceResponse },
    /// Discrete motion event from a camera.
    MotionDetected { panel_id: u64, device_id: u64 },
    /// Doorbell press on a doorbell camera.
    DoorbellDing { panel_id: u64, device_id: u64 },
    #[serde(other)]
    Unknown,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running push event stream.
pub struct EventStreamHandle {
    message_rx: broadcast::Receiver<Arc<PushMessage>>,
    cancel: CancellationToken,
}

impl EventStreamHandle {
    /// Connect to the push endpoint and spawn the reconnection loop.
    ///
    /// Returns immediately once the background task is spawned; the first
    /// connection attempt happens asynchronously.
    pub fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        cookie: Option<String>,
    ) -> Self {
        let (message_tx, message_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(ws_url, message_tx, reconnect, task_cancel, cookie).await;
        });

        Self { message_rx, cancel }
    }

    /// Get a new broadcast receiver for the message stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushMessage>> {
        self.message_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Derive the websocket URL from the API root: `wss://{host}/api/events`.
pub fn events_url(base_url: &Url) -> Result<Url, Error> {
    let scheme = if base_url.scheme() == "https" {
        "wss"
    } else {
        "ws"
    };
    let host = base_url
        .host_str()
        .ok_or_else(|| Error::EventStream("API URL has no host".to_owned()))?;
    let url = match base_url.port() {
        Some(p) => format!("{scheme}://{host}:{p}/api/events"),
        None => format!("{scheme}://{host}/api/events"),
    };
    Ok(Url::parse(&url)?)
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn stream_loop(
    ws_url: Url,
    message_tx: broadcast::Sender<Arc<PushMessage>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    cookie: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &message_tx, &cancel, cookie.as_deref()) => {
                match result {
                    // Clean disconnect: reset the attempt counter and
                    // reconnect immediately.
                    Ok(()) => {
                        tracing::info!("push stream disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "push stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "push stream reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = delay.as_millis() as u64,
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    tracing::debug!("push stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one websocket connection and read frames until it drops.
///
/// The session cookie is injected as a `Cookie` header on the upgrade
/// request (the push endpoint authenticates with the same session as the
/// REST API).
async fn connect_and_read(
    url: &Url,
    message_tx: &broadcast::Sender<Arc<PushMessage>>,
    cancel: &CancellationToken,
    cookie: Option<&str>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to push stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::EventStream(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(cookie_val) = cookie {
        request = request.with_header("Cookie", cookie_val);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::EventStream(e.to_string()))?;

    tracing::info!("push stream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, message_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        tracing::trace!("push stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "push stream close frame received"
                            );
                        } else {
                            tracing::info!("push stream close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::EventStream(e.to_string()));
                    }
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame and broadcast the message it holds.
fn parse_and_broadcast(text: &str, message_tx: &broadcast::Sender<Arc<PushMessage>>) {
    let message: PushMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse push message");
            return;
        }
    };

    if matches!(message, PushMessage::Unknown) {
        tracing::trace!("unknown push message type");
    }

    // Send errors just mean no active subscribers right now.
    let _ = message_tx.send(Arc::new(message));
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * ((attempt as f64 * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
