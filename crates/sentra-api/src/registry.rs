// ── Reactive device registry ──
//
// Concurrent storage for the account's devices with push-based change
// notification. Each device gets its own `watch` channel; entity
// adapters hold a `DeviceHandle` and re-render when the snapshot
// changes. Newly discovered devices are announced on a broadcast
// channel scoped to this account.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use crate::model::{Device, DeviceKey};

const ADDED_CHANNEL_CAPACITY: usize = 64;

/// A subscription to one device's state.
///
/// Cheap to clone; `current()` reads the latest snapshot, `changed()`
/// awaits the next update.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    key: DeviceKey,
    rx: watch::Receiver<Arc<Device>>,
}

impl DeviceHandle {
    pub fn key(&self) -> DeviceKey {
        self.key
    }

    /// The latest device snapshot (cheap `Arc` clone).
    pub fn current(&self) -> Arc<Device> {
        self.rx.borrow().clone()
    }

    /// Wait until the device state changes again.
    ///
    /// Errors only when the registry entry is gone (account torn down).
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

/// All devices known to one account, keyed by `(panel_id, device_id)`.
pub struct DeviceRegistry {
    devices: DashMap<DeviceKey, watch::Sender<Arc<Device>>>,
    added_tx: broadcast::Sender<DeviceHandle>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (added_tx, _) = broadcast::channel(ADDED_CHANNEL_CAPACITY);
        Self {
            devices: DashMap::new(),
            added_tx,
        }
    }

    /// Insert or update a device. Returns `true` if the key was new,
    /// in which case the device is also announced on the added channel.
    pub fn upsert(&self, device: Device) -> bool {
        let key = device.key;
        let device = Arc::new(device);

        if let Some(tx) = self.devices.get(&key) {
            // `send_modify` notifies even with zero receivers.
            tx.send_modify(|current| *current = device);
            return false;
        }

        let (tx, rx) = watch::channel(device);
        self.devices.insert(key, tx);

        let _ = self.added_tx.send(DeviceHandle { key, rx });
        true
    }

    /// Look up a device subscription by key.
    pub fn get(&self, key: DeviceKey) -> Option<DeviceHandle> {
        self.devices.get(&key).map(|tx| DeviceHandle {
            key,
            rx: tx.subscribe(),
        })
    }

    /// Subscribe to devices discovered after this call.
    pub fn subscribe_added(&self) -> broadcast::Receiver<DeviceHandle> {
        self.added_tx.subscribe()
    }

    /// Remove devices whose keys are not in `keep`.
    ///
    /// Dropping the `watch` sender wakes any holders of the handle with a
    /// closed-channel error, which is their removal signal.
    pub fn retain(&self, keep: &std::collections::HashSet<DeviceKey>) {
        self.devices.retain(|key, _| keep.contains(key));
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, DeviceResponse};
    use chrono::Utc;

    fn device(panel_id: u64, id: u64) -> Device {
        Device {
            key: DeviceKey::new(panel_id, id),
            parent_id: None,
            name: Some(format!("Device {id}")),
            manufacturer: None,
            model: None,
            firmware_version: None,
            battery_level: None,
            online: None,
            kind: DeviceKind::Other,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_returns_true_for_new_key() {
        let reg = DeviceRegistry::new();
        assert!(reg.upsert(device(1, 10)));
        assert!(!reg.upsert(device(1, 10)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn handle_sees_updates() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, 10));

        let handle = reg.get(DeviceKey::new(1, 10)).unwrap();
        assert_eq!(handle.current().name.as_deref(), Some("Device 10"));

        let mut updated = device(1, 10);
        updated.name = Some("Renamed".to_owned());
        reg.upsert(updated);

        assert_eq!(handle.current().name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn new_devices_are_announced() {
        let reg = DeviceRegistry::new();
        let mut added = reg.subscribe_added();

        reg.upsert(device(1, 10));
        let handle = added.try_recv().unwrap();
        assert_eq!(handle.key(), DeviceKey::new(1, 10));

        // Updates to an existing key are not announced again.
        reg.upsert(device(1, 10));
        assert!(added.try_recv().is_err());
    }

    #[test]
    fn retain_prunes_stale_devices() {
        let reg = DeviceRegistry::new();
        reg.upsert(device(1, 10));
        reg.upsert(device(1, 11));

        let keep = std::collections::HashSet::from([DeviceKey::new(1, 10)]);
        reg.retain(&keep);

        assert_eq!(reg.len(), 1);
        assert!(reg.get(DeviceKey::new(1, 11)).is_none());
    }

    #[test]
    fn wire_conversion_round_trips_through_registry() {
        let raw: DeviceResponse = serde_json::from_value(serde_json::json!({
            "id": 5, "panel_id": 2, "type": "camera", "name": "Porch"
        }))
        .unwrap();

        let reg = DeviceRegistry::new();
        reg.upsert(Device::from(raw));

        let handle = reg.get(DeviceKey::new(2, 5)).unwrap();
        assert_eq!(handle.current().kind, DeviceKind::Camera);
    }
}
