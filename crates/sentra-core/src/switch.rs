//! Binary switch adapter.

use std::sync::Arc;

use sentra_api::{Account, DeviceHandle};
use tracing::debug;

use crate::entity::{self, ChangeSignal, DeviceInfo};
use crate::error::Result;

/// Controls a binary switch device.
pub struct SwitchEntity {
    handle: DeviceHandle,
    account: Arc<Account>,
    change: ChangeSignal,
}

impl SwitchEntity {
    pub fn new(handle: DeviceHandle, account: Arc<Account>) -> Self {
        let change = ChangeSignal::new();
        entity::spawn_update_listener(handle.clone(), change.sender());
        Self {
            handle,
            account,
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

    pub fn is_on(&self) -> bool {
        self.handle.current().is_on().unwrap_or(false)
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_state(true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_state(false).await
    }

    /// Send the state command, then refresh so the registry reflects
    /// the new state without waiting for the next poll.
    async fn set_state(&self, on: bool) -> Result<()> {
        let key = self.handle.key();
        debug!(device = %key, on, "switching");

        self.account.client().set_switch_state(key, on).await?;
        self.account.refresh().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentra_api::model::{Device, DeviceKey, DeviceKind};
    use sentra_api::{DeviceRegistry, TransportConfig};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn switch(is_on: bool) -> Device {
        Device {
            key: DeviceKey::new(7, 44),
            parent_id: None,
            name: Some("Hallway Light".to_owned()),
            manufacturer: None,
            model: None,
            firmware_version: None,
            battery_level: None,
            online: None,
            kind: DeviceKind::Switch { is_on },
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mirrors_device_state() {
        let registry = DeviceRegistry::new();
        registry.upsert(switch(false));
        let handle = registry.get(DeviceKey::new(7, 44)).unwrap();

        let url = Url::parse("https://api.sentra.example").unwrap();
        let account = Arc::new(Account::new(url, &TransportConfig::default()).unwrap());
        let entity = SwitchEntity::new(handle, account);

        assert_eq!(entity.unique_id(), "7-44");
        assert!(!entity.is_on());

        registry.upsert(switch(true));
        assert!(entity.is_on());
    }

    #[tokio::test]
    async fn turn_on_commands_and_refreshes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/systems/7/devices/44/state"))
            .and(body_json(json!({ "on": true })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/systems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "systems": [{
                    "id": 1,
                    "panels": [{
                        "id": 7,
                        "devices": [{
                            "id": 44,
                            "panel_id": 7,
                            "type": "binary_switch",
                            "name": "Hallway Light",
                            "state": true
                        }]
                    }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let account = Arc::new(Account::new(url, &TransportConfig::default()).unwrap());

        // Seed the registry so the entity has a handle before the command.
        account.registry().upsert(switch(false));
        let handle = account.registry().get(DeviceKey::new(7, 44)).unwrap();

        let entity = SwitchEntity::new(handle, Arc::clone(&account));
        entity.turn_on().await.unwrap();

        assert!(entity.is_on());
    }
}
