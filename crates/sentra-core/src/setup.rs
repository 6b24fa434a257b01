//! Entity setup.
//!
//! Walks the account snapshot (systems, panels, devices) once, builds
//! one entity adapter per classified device, and hands them to the host
//! through an add-entities channel. A background task keeps routing
//! live events after setup: motion pulses to their motion sensor, newly
//! provisioned wireless sensors to fresh entities.

use std::collections::HashMap;
use std::sync::Arc;

use sentra_api::model::{DeviceKey, DeviceKind};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::binary_sensor::{BinarySensor, MotionSensor, OnlineSensor};
use crate::camera::{ApiSnapshotSource, CameraEntity};
use crate::classify::{self, Classification};
use crate::error::Result;
use crate::hub::{Hub, HubEvent};
use crate::sensor::BatterySensor;
use crate::switch::SwitchEntity;

/// Any entity adapter the integration produces.
pub enum Entity {
    BinarySensor(BinarySensor),
    Online(OnlineSensor),
    Motion(Arc<MotionSensor>),
    Camera(CameraEntity<ApiSnapshotSource>),
    Battery(BatterySensor),
    Switch(SwitchEntity),
}

impl Entity {
    pub fn unique_id(&self) -> String {
        match self {
            Self::BinarySensor(e) => e.unique_id(),
            Self::Online(e) => e.unique_id(),
            Self::Motion(e) => e.unique_id(),
            Self::Camera(e) => e.unique_id(),
            Self::Battery(e) => e.unique_id(),
            Self::Switch(e) => e.unique_id(),
        }
    }
}

/// Build entities for every device in the account snapshot.
///
/// Entities are delivered through `add_tx`; the return value is how
/// many were built. An account with no classifiable devices sets up
/// nothing and reports zero, which is not an error.
pub async fn setup_entities(
    hub: &Arc<Hub>,
    add_tx: mpsc::UnboundedSender<Entity>,
) -> Result<usize> {
    let account = hub.account();
    let mut count = 0;
    let mut motion_sensors: HashMap<DeviceKey, Arc<MotionSensor>> = HashMap::new();

    for system in account.systems().await {
        for panel in &system.panels {
            for key in &panel.devices {
                let Some(handle) = account.registry().get(*key) else {
                    debug!(device = %key, "device vanished between snapshot and setup");
                    continue;
                };
                let device = handle.current();

                match classify::classify(&device) {
                    Some(Classification::Sensor(class)) => {
                        let entity = BinarySensor::new(handle.clone(), class);
                        send_entity(&add_tx, Entity::BinarySensor(entity), &mut count);
                    }
                    Some(Classification::CameraMotion) => {
                        let motion = Arc::new(MotionSensor::new(handle.clone()));
                        motion_sensors.insert(*key, Arc::clone(&motion));
                        send_entity(&add_tx, Entity::Motion(motion), &mut count);
                    }
                    Some(Classification::Online) => {
                        let entity = OnlineSensor::new(handle.clone());
                        send_entity(&add_tx, Entity::Online(entity), &mut count);
                    }
                    None => {}
                }

                if device.kind == DeviceKind::Camera {
                    let camera = CameraEntity::new(
                        handle.clone(),
                        Arc::clone(account),
                        hub.config().camera.clone(),
                        ApiSnapshotSource::new(Arc::clone(account)),
                    );
                    camera.log_rtsp_urls().await;
                    send_entity(&add_tx, Entity::Camera(camera), &mut count);
                }

                if matches!(device.kind, DeviceKind::Switch { .. }) {
                    let entity = SwitchEntity::new(handle.clone(), Arc::clone(account));
                    send_entity(&add_tx, Entity::Switch(entity), &mut count);
                }

                if BatterySensor::supports(&device) {
                    let entity = BatterySensor::new(handle.clone());
                    send_entity(&add_tx, Entity::Battery(entity), &mut count);
                }
            }
        }
    }

    info!(entities = count, "entity setup complete");

    spawn_event_router(hub, motion_sensors, add_tx);

    Ok(count)
}

fn send_entity(
    add_tx: &mpsc::UnboundedSender<Entity>,
    entity: Entity,
    count: &mut usize,
) {
    debug!(unique_id = %entity.unique_id(), "adding entity");
    if add_tx.send(entity).is_ok() {
        *count += 1;
    }
}

/// Route live hub events after setup.
///
/// Motion pulses go to the matching motion sensor. Devices provisioned
/// after setup only get entities for the wireless-sensor rule (plus a
/// battery sensor when they report a level); anything else waits for
/// the next full setup.
fn spawn_event_router(
    hub: &Arc<Hub>,
    motion_sensors: HashMap<DeviceKey, Arc<MotionSensor>>,
    add_tx: mpsc::UnboundedSender<Entity>,
) {
    let mut events = hub.subscribe();
    let hub = Arc::clone(hub);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(HubEvent::Motion(key)) => {
                    if let Some(sensor) = motion_sensors.get(&key) {
                        sensor.on_motion().await;
                    } else {
                        debug!(device = %key, "motion event for unknown camera");
                    }
                }
                Ok(HubEvent::DoorbellDing(key)) => {
                    // Surfaced on the bus for host automations; no
                    // entity state to update here.
                    debug!(device = %key, "doorbell ding");
                }
                Ok(HubEvent::DeviceAdded(key)) => {
                    handle_device_added(&hub, key, &add_tx);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("event router exiting");
    });
}

fn handle_device_added(hub: &Arc<Hub>, key: DeviceKey, add_tx: &mpsc::UnboundedSender<Entity>) {
    let Some(handle) = hub.account().registry().get(key) else {
        return;
    };
    let device = handle.current();

    if let Some(Classification::Sensor(class)) = classify::classify(&device) {
        info!(device = %key, %class, "new wireless sensor discovered");
        let _ = add_tx.send(Entity::BinarySensor(BinarySensor::new(
            handle.clone(),
            class,
        )));

        if BatterySensor::supports(&device) {
            let _ = add_tx.send(Entity::Battery(BatterySensor::new(handle)));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::DeviceClass;
    use crate::config::{CameraOptions, HubConfig};
    use secrecy::SecretString;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hub_for(server: &MockServer, dir: &std::path::Path) -> Arc<Hub> {
        let config = HubConfig {
            username: "alice@example.com".to_owned(),
            password: SecretString::from("hunter2"),
            cache_dir: dir.to_path_buf(),
            api_url: Url::parse(&server.uri()).unwrap(),
            refresh_interval_secs: 300,
            camera: CameraOptions::default(),
        };
        Arc::new(Hub::new(config).unwrap())
    }

    fn snapshot_body() -> serde_json::Value {
        json!({
            "systems": [{
                "id": 1,
                "name": "Home",
                "panels": [{
                    "id": 7,
                    "devices": [
                        {
                            "id": 21, "panel_id": 7, "type": "wireless_sensor",
                            "name": "Front Door", "state": false,
                            "equipment_type": "contact", "sensor_type": "exit_entry_1",
                            "equipment_code": "DW11_THIN_DOOR_WINDOW",
                            "battery_level": 90
                        },
                        {
                            "id": 30, "panel_id": 7, "type": "camera",
                            "name": "Porch", "is_online": true
                        },
                        {
                            "id": 44, "panel_id": 7, "type": "binary_switch",
                            "name": "Hallway Light", "state": false
                        },
                        {
                            "id": 50, "panel_id": 7, "type": "panel",
                            "name": "Main Panel", "is_online": true
                        },
                        {
                            "id": 60, "panel_id": 7, "type": "key_fob"
                        }
                    ]
                }]
            }]
        })
    }

    #[tokio::test]
    async fn builds_one_entity_per_classified_device() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/systems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = hub_for(&server, dir.path());
        hub.account().refresh().await.unwrap();

        let (add_tx, mut add_rx) = mpsc::unbounded_channel();
        let count = setup_entities(&hub, add_tx).await.unwrap();

        // Sensor + battery, camera motion + camera stream, switch,
        // panel online. The key fob has no capability and is skipped.
        assert_eq!(count, 6);

        let mut ids = Vec::new();
        while let Ok(entity) = add_rx.try_recv() {
            ids.push(entity.unique_id());
        }
        ids.sort();
        assert_eq!(
            ids,
            ["7-21", "7-21-battery", "7-30", "7-30", "7-44", "7-50-online"]
        );
    }

    #[tokio::test]
    async fn empty_account_sets_up_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/systems"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "systems": [] })),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let hub = hub_for(&server, dir.path());
        hub.account().refresh().await.unwrap();

        let (add_tx, mut add_rx) = mpsc::unbounded_channel();
        let count = setup_entities(&hub, add_tx).await.unwrap();

        assert_eq!(count, 0);
        assert!(add_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn added_wireless_sensor_gets_an_entity() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let hub = hub_for(&server, dir.path());

        let raw: sentra_api::model::DeviceResponse = serde_json::from_value(json!({
            "id": 99, "panel_id": 7, "type": "wireless_sensor",
            "name": "New Window", "state": false,
            "equipment_type": "contact", "sensor_type": "perimeter",
            "equipment_code": "DW21_RECESSED_DOOR"
        }))
        .unwrap();
        hub.account().registry().upsert(raw.into());

        let (add_tx, mut add_rx) = mpsc::unbounded_channel();
        handle_device_added(&hub, DeviceKey::new(7, 99), &add_tx);

        match add_rx.try_recv().unwrap() {
            Entity::BinarySensor(sensor) => {
                assert_eq!(sensor.unique_id(), "7-99");
                assert_eq!(sensor.device_class(), DeviceClass::Window);
            }
            _ => panic!("expected a binary sensor"),
        }
        // No battery level reported, so no battery sensor.
        assert!(add_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn added_camera_is_ignored_until_next_setup() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let hub = hub_for(&server, dir.path());

        let raw: sentra_api::model::DeviceResponse = serde_json::from_value(json!({
            "id": 31, "panel_id": 7, "type": "camera", "name": "Garage Cam"
        }))
        .unwrap();
        hub.account().registry().upsert(raw.into());

        let (add_tx, mut add_rx) = mpsc::unbounded_channel();
        handle_device_added(&hub, DeviceKey::new(7, 31), &add_tx);

        assert!(add_rx.try_recv().is_err());
    }
}
