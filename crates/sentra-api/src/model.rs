//! Wire and domain types for Sentra Cloud payloads.
//!
//! Wire types (`*Response`) match the JSON the cloud API returns; field
//! names use snake_case as sent. Each wire device is resolved into a
//! domain [`Device`] exactly once, at which point its capabilities are
//! fixed into the closed [`DeviceKind`] union -- consumers never probe
//! for optional attributes after that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Identity ─────────────────────────────────────────────────────────

/// Identity of a device within an account: the owning alarm panel plus
/// the device's own id. Every entity derives its unique id from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub panel_id: u64,
    pub device_id: u64,
}

impl DeviceKey {
    pub fn new(panel_id: u64, device_id: u64) -> Self {
        Self { panel_id, device_id }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.panel_id, self.device_id)
    }
}

// ── Capability enums ─────────────────────────────────────────────────

/// Equipment type reported for wireless sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EquipmentType {
    Contact,
    Motion,
    Freeze,
    Water,
    Temperature,
    #[serde(other)]
    Other,
}

/// Sensor type reported for wireless sensors. Only meaningful for
/// `EquipmentType::Contact`, where it selects the device-class sub-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SensorType {
    #[serde(rename = "exit_entry_1")]
    ExitEntry1,
    Perimeter,
    Fire,
    FireWithVerification,
    CarbonMonoxide,
    #[serde(other)]
    Other,
}

/// Whether a device reports its reachability through the mesh-node flag
/// or the account-level flag. The two are mutually exclusive on the wire;
/// resolution prefers the node flag when both appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineSignal {
    /// Mesh/z-wave node reachability.
    Node(bool),
    /// Account-level device reachability.
    Device(bool),
}

impl OnlineSignal {
    pub fn is_online(&self) -> bool {
        match self {
            Self::Node(v) | Self::Device(v) => *v,
        }
    }
}

// ── DeviceKind ───────────────────────────────────────────────────────

/// Attributes of a wireless sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorAttributes {
    pub equipment_type: EquipmentType,
    pub sensor_type: SensorType,
    /// Equipment code name, e.g. `"DW11_THIN_DOOR_WINDOW"` or
    /// `"TILT_SENSOR_2_GIG"`. Drives tilt/glass-break sub-classification.
    pub equipment_code: String,
    pub is_on: bool,
}

/// Closed set of device capabilities, resolved once at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceKind {
    WirelessSensor(SensorAttributes),
    Camera,
    Switch { is_on: bool },
    Panel,
    Other,
}

// ── Domain Device ────────────────────────────────────────────────────

/// The canonical device type held in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub key: DeviceKey,
    /// Parent device id for sub-devices (e.g. a sensor wired through a
    /// repeater). Sub-devices share the parent's registry identity.
    pub parent_id: Option<u64>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub battery_level: Option<u8>,
    pub online: Option<OnlineSignal>,
    pub kind: DeviceKind,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn is_subdevice(&self) -> bool {
        self.parent_id.is_some()
    }

    /// The boolean on/off state, for kinds that have one.
    pub fn is_on(&self) -> Option<bool> {
        match &self.kind {
            DeviceKind::WirelessSensor(attrs) => Some(attrs.is_on),
            DeviceKind::Switch { is_on } => Some(*is_on),
            _ => None,
        }
    }

    /// Display name, falling back to a kind-derived label.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            match self.kind {
                DeviceKind::WirelessSensor(_) => "Wireless Sensor",
                DeviceKind::Camera => "Camera",
                DeviceKind::Switch { .. } => "Switch",
                DeviceKind::Panel => "Alarm Panel",
                DeviceKind::Other => "Device",
            }
            .to_owned()
        })
    }
}

// ── System / panel snapshots ─────────────────────────────────────────

/// One alarm panel and the keys of the devices it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub id: u64,
    pub devices: Vec<DeviceKey>,
}

/// One installation (system): a set of alarm panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub id: u64,
    pub name: Option<String>,
    pub panels: Vec<Panel>,
}

// ── Wire types ───────────────────────────────────────────────────────

/// Account snapshot — from `GET /api/systems`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemsResponse {
    pub systems: Vec<SystemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemResponse {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub panels: Vec<PanelResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelResponse {
    pub id: u64,
    pub devices: Vec<DeviceResponse>,
}

/// A single device as sent by the cloud API.
///
/// `type` discriminates the capability; the optional attribute fields are
/// only meaningful for the matching type and are dropped during domain
/// conversion otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub id: u64,
    pub panel_id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub battery_level: Option<u8>,
    /// Mesh-node reachability. Mutually exclusive with `is_online`.
    #[serde(default)]
    pub node_online: Option<bool>,
    /// Account-level reachability. Mutually exclusive with `node_online`.
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub equipment_type: Option<EquipmentType>,
    #[serde(default)]
    pub sensor_type: Option<SensorType>,
    #[serde(default)]
    pub equipment_code: Option<String>,
}

/// Device type discriminator values used on the wire.
mod device_type {
    pub const WIRELESS_SENSOR: &str = "wireless_sensor";
    pub const CAMERA: &str = "camera";
    pub const BINARY_SWITCH: &str = "binary_switch";
    pub const PANEL: &str = "panel";
}

impl From<DeviceResponse> for Device {
    fn from(raw: DeviceResponse) -> Self {
        let kind = match raw.device_type.as_str() {
            device_type::WIRELESS_SENSOR => DeviceKind::WirelessSensor(SensorAttributes {
                equipment_type: raw.equipment_type.unwrap_or(EquipmentType::Other),
                sensor_type: raw.sensor_type.unwrap_or(SensorType::Other),
                equipment_code: raw.equipment_code.unwrap_or_default(),
                is_on: raw.state.unwrap_or(false),
            }),
            device_type::CAMERA => DeviceKind::Camera,
            device_type::BINARY_SWITCH => DeviceKind::Switch {
                is_on: raw.state.unwrap_or(false),
            },
            device_type::PANEL => DeviceKind::Panel,
            _ => DeviceKind::Other,
        };

        // Node flag wins when a payload carries both.
        let online = match (raw.node_online, raw.is_online) {
            (Some(v), _) => Some(OnlineSignal::Node(v)),
            (None, Some(v)) => Some(OnlineSignal::Device(v)),
            (None, None) => None,
        };

        Self {
            key: DeviceKey::new(raw.panel_id, raw.id),
            parent_id: raw.parent_id,
            name: raw.name,
            manufacturer: raw.manufacturer,
            model: raw.model,
            firmware_version: raw.firmware_version,
            battery_level: raw.battery_level,
            online,
            kind,
            updated_at: Utc::now(),
        }
    }
}

/// RTSP URL payload — from the camera stream endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtspUrlResponse {
    /// `null` when the camera does not support the requested stream kind.
    pub url: Option<String>,
}
