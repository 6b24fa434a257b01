//! Device classification.
//!
//! Maps a device's capability set to the entity adapter that should
//! represent it, and wireless-sensor attributes to a device class.
//! Classification precedence is first match wins; devices matching no
//! rule get no entity.

use sentra_api::model::{Device, DeviceKind, EquipmentType, OnlineSignal, SensorType};
use strum::Display;

/// Device class attached to a binary-sensor entity, driving the host's
/// icon and state wording. Serialized names are snake_case
/// (`garage_door` etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClass {
    Cold,
    Connectivity,
    Door,
    GarageDoor,
    Gas,
    Heat,
    Moisture,
    Motion,
    Safety,
    Smoke,
    Window,
}

/// Which binary-sensor adapter a device gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Generic binary sensor with the given device class.
    Sensor(DeviceClass),
    /// Camera motion adapter.
    CameraMotion,
    /// Connectivity adapter reading the device's online signal.
    Online,
}

/// Classify one device. `None` means no binary-sensor entity.
pub fn classify(device: &Device) -> Option<Classification> {
    match &device.kind {
        DeviceKind::WirelessSensor(attrs) => {
            Some(Classification::Sensor(sensor_device_class(
                attrs.equipment_type,
                attrs.sensor_type,
                &attrs.equipment_code,
            )))
        }
        DeviceKind::Camera => Some(Classification::CameraMotion),
        _ => match device.online {
            Some(OnlineSignal::Node(_) | OnlineSignal::Device(_)) => {
                Some(Classification::Online)
            }
            None => None,
        },
    }
}

/// Device class for a wireless sensor.
///
/// Contact sensors sub-classify on the sensor type; tilt and
/// glass-break variants are recognized by their equipment code names.
/// Anything unmatched falls back to `Safety`.
pub fn sensor_device_class(
    equipment: EquipmentType,
    sensor: SensorType,
    equipment_code: &str,
) -> DeviceClass {
    match equipment {
        EquipmentType::Motion => DeviceClass::Motion,
        EquipmentType::Freeze => DeviceClass::Cold,
        EquipmentType::Water => DeviceClass::Moisture,
        EquipmentType::Temperature => DeviceClass::Heat,
        EquipmentType::Contact => match sensor {
            SensorType::ExitEntry1 => {
                if equipment_code.contains("TILT") {
                    DeviceClass::GarageDoor
                } else {
                    DeviceClass::Door
                }
            }
            SensorType::Perimeter => {
                if equipment_code.contains("GLASS_BREAK") {
                    DeviceClass::Safety
                } else {
                    DeviceClass::Window
                }
            }
            SensorType::Fire | SensorType::FireWithVerification => DeviceClass::Smoke,
            SensorType::CarbonMonoxide => DeviceClass::Gas,
            SensorType::Other => DeviceClass::Safety,
            _ => DeviceClass::Safety,
        },
        EquipmentType::Other => DeviceClass::Safety,
        _ => DeviceClass::Safety,
    }
}
