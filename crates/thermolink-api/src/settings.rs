// Building-level settings: frost protection and holiday mode.
//
// Updates answer with an `AttributeErrors` map on validation failure;
// the session plumbing turns that into `Error::Validation` before these
// methods ever see the body.

use serde_json::Value;

use crate::error::Error;
use crate::models::{FrostProtection, FrostProtectionUpdate, HolidayMode, HolidayModeUpdate};
use crate::session::{SessionManager, paths};

impl SessionManager {
    pub async fn frost_protection(&self, building_id: i64) -> Result<FrostProtection, Error> {
        let query = [
            ("id", building_id.to_string()),
            ("tableName", "Building".to_owned()),
        ];
        self.get(paths::FROST_GET, &query).await
    }

    pub async fn update_frost_protection(
        &self,
        update: &FrostProtectionUpdate,
    ) -> Result<(), Error> {
        let _: Value = self.post(paths::FROST_UPDATE, update).await?;
        Ok(())
    }

    pub async fn holiday_mode(&self, building_id: i64) -> Result<HolidayMode, Error> {
        let query = [
            ("id", building_id.to_string()),
            ("tableName", "Building".to_owned()),
        ];
        self.get(paths::HOLIDAY_GET, &query).await
    }

    pub async fn update_holiday_mode(&self, update: &HolidayModeUpdate) -> Result<(), Error> {
        let _: Value = self.post(paths::HOLIDAY_UPDATE, update).await?;
        Ok(())
    }
}
