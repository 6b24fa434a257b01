// sentra-api: Async Rust client for the Sentra Cloud security platform

pub mod account;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod model;
pub mod registry;
pub mod session;
pub mod transport;

pub use account::{Account, AccountEvent};
pub use client::ApiClient;
pub use endpoints::StreamQuality;
pub use error::{Error, Result};
pub use model::{Device, DeviceKey, DeviceKind};
pub use registry::{DeviceHandle, DeviceRegistry};
pub use transport::TransportConfig;
