//! Entity plumbing shared by every adapter.
//!
//! Each entity wraps one device subscription and exposes its identity
//! and registry metadata the same way. State change notification is a
//! `watch` counter per entity; the host re-reads the entity after each
//! bump.

use sentra_api::model::{Device, DeviceKey};
use sentra_api::DeviceHandle;
use tokio::sync::watch;

/// Build an entity's unique id: `panel-device` plus an optional suffix
/// for secondary entities on the same device.
pub fn unique_id(key: DeviceKey, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) => format!("{key}-{s}"),
        None => key.to_string(),
    }
}

/// Registry metadata for the device an entity belongs to.
///
/// Sub-devices collapse onto their parent: they share the parent's
/// registry identifier so the host groups them under one device entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// `panel-device` of the registry device (the parent's for
    /// sub-devices).
    pub identifier: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    pub fn from_device(device: &Device) -> Self {
        let identifier = match device.parent_id {
            Some(parent) => DeviceKey::new(device.key.panel_id, parent).to_string(),
            None => device.key.to_string(),
        };

        Self {
            identifier,
            name: device.display_name(),
            manufacturer: device.manufacturer.clone(),
            model: device.model.clone(),
            firmware_version: device.firmware_version.clone(),
        }
    }
}

/// Per-entity change notification: a bumping counter the host can
/// `await` on.
#[derive(Debug)]
pub struct ChangeSignal {
    tx: watch::Sender<u64>,
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Notify subscribers that the entity's state changed.
    pub fn notify(&self) {
        self.tx.send_modify(|v| *v += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Clone of the underlying sender, for background listeners.
    pub fn sender(&self) -> watch::Sender<u64> {
        self.tx.clone()
    }
}

/// Spawn a listener that bumps `signal` whenever the device snapshot
/// changes. Exits when the registry drops the device.
pub fn spawn_update_listener(mut handle: DeviceHandle, signal: watch::Sender<u64>) {
    tokio::spawn(async move {
        while handle.changed().await.is_ok() {
            signal.send_modify(|v| *v += 1);
        }
    });
}
