// sentra-core: entity integration layer for the Sentra Cloud platform

pub mod binary_sensor;
pub mod camera;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod hub;
pub mod sensor;
pub mod setup;
pub mod switch;
pub mod timer;

pub use config::{CameraOptions, HubConfig, StreamMode};
pub use coordinator::UpdateCoordinator;
pub use error::{CoreError, Result};
pub use hub::{Hub, HubEvent};
pub use setup::{Entity, setup_entities};
