// Device and system endpoints.

use serde_json::json;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::model::{DeviceKey, SystemsResponse};

impl ApiClient {
    /// Fetch the full account snapshot: `GET /api/systems`.
    ///
    /// Returns every system with its panels and their devices. Used for
    /// the initial device load and every periodic refresh.
    pub async fn fetch_systems(&self) -> Result<SystemsResponse, Error> {
        let url = self.api_url("systems")?;
        self.get(url).await
    }

    /// Set a binary switch's state:
    /// `POST /api/systems/{panel}/devices/{device}/state`.
    pub async fn set_switch_state(&self, key: DeviceKey, on: bool) -> Result<(), Error> {
        let url = self.api_url(&format!(
            "systems/{}/devices/{}/state",
            key.panel_id, key.device_id
        ))?;

        debug!(device = %key, on, "setting switch state");

        self.post_no_content(url, &json!({ "on": on })).await
    }
}
