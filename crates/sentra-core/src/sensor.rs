//! Battery-level sensor adapter.

use sentra_api::DeviceHandle;
use sentra_api::model::Device;

use crate::entity::{self, ChangeSignal, DeviceInfo};

/// Reports a device's battery percentage. Diagnostic category.
///
/// Only built for top-level devices that report a level; sub-devices
/// share their parent's battery.
pub struct BatterySensor {
    handle: DeviceHandle,
    change: ChangeSignal,
}

impl BatterySensor {
    /// Whether a device qualifies for a battery sensor.
    pub fn supports(device: &Device) -> bool {
        !device.is_subdevice() && device.battery_level.is_some()
    }

    pub fn new(handle: DeviceHandle) -> Self {
        let change = ChangeSignal::new();
        entity::spawn_update_listener(handle.clone(), change.sender());
        Self { handle, change }
    }

    pub fn unique_id(&self) -> String {
        entity::unique_id(self.handle.key(), Some("battery"))
    }

    pub fn name(&self) -> String {
        format!("{} Battery Level", self.handle.current().display_name())
    }

    pub fn is_diagnostic(&self) -> bool {
        true
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_device(&self.handle.current())
    }

    /// Battery percentage, 0 to 100. `None` while the device has not
    /// reported one.
    pub fn level(&self) -> Option<u8> {
        self.handle.current().battery_level
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentra_api::DeviceRegistry;
    use sentra_api::model::{DeviceKey, DeviceKind};

    fn device(parent_id: Option<u64>, battery_level: Option<u8>) -> Device {
        Device {
            key: DeviceKey::new(7, 21),
            parent_id,
            name: Some("Front Door".to_owned()),
            manufacturer: None,
            model: None,
            firmware_version: None,
            battery_level,
            online: None,
            kind: DeviceKind::Other,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn support_rules() {
        assert!(BatterySensor::supports(&device(None, Some(88))));
        assert!(!BatterySensor::supports(&device(None, None)));
        // Sub-devices never get their own battery sensor.
        assert!(!BatterySensor::supports(&device(Some(3), Some(88))));
    }

    #[tokio::test]
    async fn reports_the_current_level() {
        let registry = DeviceRegistry::new();
        registry.upsert(device(None, Some(88)));
        let handle = registry.get(DeviceKey::new(7, 21)).unwrap();

        let entity = BatterySensor::new(handle);
        assert_eq!(entity.unique_id(), "7-21-battery");
        assert_eq!(entity.name(), "Front Door Battery Level");
        assert_eq!(entity.level(), Some(88));

        registry.upsert(device(None, Some(42)));
        assert_eq!(entity.level(), Some(42));
    }
}
