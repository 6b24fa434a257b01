// Endpoint groups implemented as inherent methods on `ApiClient`.

mod auth;
mod cameras;
mod devices;

pub use cameras::StreamQuality;
