//! Account session: the top-level handle to one Sentra Cloud login.
//!
//! An [`Account`] owns the HTTP client, the device registry, and the
//! optional push event stream. Callers authenticate, load devices, and
//! then either poll [`Account::refresh`] or consume the realtime event
//! bus via [`Account::subscribe`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::ApiClient;
use crate::error::Error;
use crate::events::{self, EventStreamHandle, PushMessage, ReconnectConfig};
use crate::model::{Device, DeviceKey, Panel, System};
use crate::registry::DeviceRegistry;
use crate::transport::TransportConfig;

const ACCOUNT_EVENT_CAPACITY: usize = 256;

/// Events surfaced to the integration layer.
///
/// Device state changes flow through the registry's watch channels;
/// this bus carries the discrete events that have no state to diff
/// (motion pulses, doorbell presses) plus discovery notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// A device's state snapshot changed.
    DeviceUpdated(DeviceKey),
    /// A camera reported motion.
    MotionDetected(DeviceKey),
    /// A doorbell camera was pressed.
    DoorbellDing(DeviceKey),
    /// A device appeared that was not in the last snapshot.
    DeviceAdded(DeviceKey),
}

/// A logged-in Sentra Cloud account.
pub struct Account {
    client: ApiClient,
    registry: DeviceRegistry,
    systems: RwLock<Vec<System>>,
    connected: AtomicBool,
    event_tx: broadcast::Sender<AccountEvent>,
    stream: Mutex<Option<EventStreamHandle>>,
    cancel: CancellationToken,
}

impl Account {
    /// Build an account handle against the given API root. No network
    /// traffic happens until [`connect`](Self::connect).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let client = ApiClient::new(base_url, transport)?;
        let (event_tx, _) = broadcast::channel(ACCOUNT_EVENT_CAPACITY);

        Ok(Self {
            client,
            registry: DeviceRegistry::new(),
            systems: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            event_tx,
            stream: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Subscribe to the account event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the account's systems from the last refresh.
    pub async fn systems(&self) -> Vec<System> {
        self.systems.read().await.clone()
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Establish the session: verify credentials work (caller performs
    /// the actual login first), optionally load the device snapshot and
    /// open the realtime push stream.
    pub async fn connect(
        self: &Arc<Self>,
        load_devices: bool,
        subscribe_realtime: bool,
    ) -> Result<(), Error> {
        if load_devices {
            self.refresh().await?;
        }

        if subscribe_realtime {
            self.open_stream().await?;
        }

        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Tear down the session. Safe to call more than once; the second
    /// call is a no-op.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }

        self.cancel.cancel();

        if let Some(stream) = self.stream.lock().await.take() {
            stream.shutdown();
        }

        if let Err(e) = self.client.logout().await {
            tracing::debug!(error = %e, "logout on disconnect failed");
        }
    }

    // ── Polling refresh ──────────────────────────────────────────────

    /// Fetch the full account snapshot and reconcile the registry:
    /// upsert every device seen, prune devices that disappeared, and
    /// replace the systems snapshot.
    pub async fn refresh(&self) -> Result<(), Error> {
        let response = self.client.fetch_systems().await?;

        let mut seen = HashSet::new();
        let mut systems = Vec::with_capacity(response.systems.len());

        for raw_system in response.systems {
            let mut panels = Vec::with_capacity(raw_system.panels.len());

            for raw_panel in raw_system.panels {
                let mut device_keys = Vec::with_capacity(raw_panel.devices.len());

                for raw_device in raw_panel.devices {
                    let device = Device::from(raw_device);
                    let key = device.key;
                    seen.insert(key);
                    device_keys.push(key);

                    if self.registry.upsert(device) {
                        let _ = self.event_tx.send(AccountEvent::DeviceAdded(key));
                    } else {
                        let _ = self.event_tx.send(AccountEvent::DeviceUpdated(key));
                    }
                }

                panels.push(Panel {
                    id: raw_panel.id,
                    devices: device_keys,
                });
            }

            systems.push(System {
                id: raw_system.id,
                name: raw_system.name,
                panels,
            });
        }

        self.registry.retain(&seen);
        *self.systems.write().await = systems;

        tracing::debug!(devices = self.registry.len(), "account refresh complete");
        Ok(())
    }

    // ── Realtime stream ──────────────────────────────────────────────

    /// Open the push stream and spawn the bridge task that applies push
    /// messages to the registry and re-emits them as account events.
    async fn open_stream(self: &Arc<Self>) -> Result<(), Error> {
        let ws_url = events::events_url(self.client.base_url())?;
        let cookie = self.client.cookie_header();

        let stream = EventStreamHandle::connect(
            ws_url,
            ReconnectConfig::default(),
            self.cancel.child_token(),
            cookie,
        );

        let mut messages = stream.subscribe();
        *self.stream.lock().await = Some(stream);

        let account = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = account.cancel.cancelled() => break,
                    msg = messages.recv() => match msg {
                        Ok(msg) => account.apply_push(&msg),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "push bridge lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("push bridge exiting");
        });

        Ok(())
    }

    /// Apply one push message: state messages reconcile the registry,
    /// discrete events go straight to the bus.
    fn apply_push(&self, message: &PushMessage) {
        match message {
            PushMessage::DeviceSync { data } => {
                let device = Device::from(data.clone());
                let key = device.key;
                let added = self.registry.upsert(device);
                let event = if added {
                    AccountEvent::DeviceAdded(key)
                } else {
                    AccountEvent::DeviceUpdated(key)
                };
                let _ = self.event_tx.send(event);
            }
            PushMessage::DeviceAdded { data } => {
                let device = Device::from(data.clone());
                let key = device.key;
                self.registry.upsert(device);
                let _ = self.event_tx.send(AccountEvent::DeviceAdded(key));
            }
            PushMessage::MotionDetected {
                panel_id,
                device_id,
            } => {
                let key = DeviceKey::new(*panel_id, *device_id);
                let _ = self.event_tx.send(AccountEvent::MotionDetected(key));
            }
            PushMessage::DoorbellDing {
                panel_id,
                device_id,
            } => {
                let key = DeviceKey::new(*panel_id, *device_id);
                let _ = self.event_tx.send(AccountEvent::DoorbellDing(key));
            }
            PushMessage::Unknown => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceResponse;
    use serde_json::json;

    fn test_account() -> Arc<Account> {
        let url = Url::parse("https://api.sentra.example").unwrap();
        Arc::new(Account::new(url, &TransportConfig::default()).unwrap())
    }

    fn sync_message(panel_id: u64, device_id: u64, state: bool) -> PushMessage {
        let data: DeviceResponse = serde_json::from_value(json!({
            "id": device_id,
            "panel_id": panel_id,
            "type": "binary_switch",
            "state": state,
        }))
        .unwrap();
        PushMessage::DeviceSync { data }
    }

    #[tokio::test]
    async fn device_sync_reconciles_registry() {
        let account = test_account();
        let mut events = account.subscribe();

        account.apply_push(&sync_message(1, 10, true));
        assert_eq!(
            events.try_recv().unwrap(),
            AccountEvent::DeviceAdded(DeviceKey::new(1, 10))
        );

        account.apply_push(&sync_message(1, 10, false));
        assert_eq!(
            events.try_recv().unwrap(),
            AccountEvent::DeviceUpdated(DeviceKey::new(1, 10))
        );

        let handle = account.registry().get(DeviceKey::new(1, 10)).unwrap();
        assert_eq!(handle.current().is_on(), Some(false));
    }

    #[tokio::test]
    async fn motion_event_passes_through() {
        let account = test_account();
        let mut events = account.subscribe();

        account.apply_push(&PushMessage::MotionDetected {
            panel_id: 2,
            device_id: 30,
        });

        assert_eq!(
            events.try_recv().unwrap(),
            AccountEvent::MotionDetected(DeviceKey::new(2, 30))
        );
        // No registry entry for a pure event.
        assert!(account.registry().get(DeviceKey::new(2, 30)).is_none());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let account = test_account();
        account.connected.store(true, Ordering::Release);

        // First call tears down; second returns immediately. Neither
        // call should panic even though logout hits no real server.
        account.disconnect().await;
        assert!(!account.is_connected());
        account.disconnect().await;
    }
}
