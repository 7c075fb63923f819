// Device endpoints: bulk list, direct get, partial set.

use crate::error::Error;
use crate::models::{Building, DeviceState};
use crate::session::{SessionManager, paths};

impl SessionManager {
    /// Fetch the full building/device tree.
    ///
    /// Rate-limit-sensitive: a 429 anywhere puts this endpoint on hold,
    /// and calls during the hold fail fast with [`Error::ListOnHold`].
    pub async fn list_devices(&self) -> Result<Vec<Building>, Error> {
        self.get(paths::LIST_DEVICES, &[]).await
    }

    /// Fetch the full current state of one device.
    pub async fn device_state(
        &self,
        device_id: i64,
        building_id: i64,
    ) -> Result<DeviceState, Error> {
        let query = [
            ("id", device_id.to_string()),
            ("buildingID", building_id.to_string()),
        ];
        self.get(paths::DEVICE_GET, &query).await
    }

    /// Push a partial write.
    ///
    /// `class_suffix` selects the endpoint (`Ata`, `Atw`, `Erv`). The
    /// payload must be the full state object with an `EffectiveFlags`
    /// bitmask marking which fields to actually apply; the response echoes
    /// the state the device settled into.
    pub async fn set_device(
        &self,
        class_suffix: &str,
        payload: &DeviceState,
    ) -> Result<DeviceState, Error> {
        let path = format!("{}{class_suffix}", paths::DEVICE_SET_PREFIX);
        self.post(&path, payload).await
    }
}
