// Wire types for the cloud service.
//
// Field names mirror the vendor JSON (PascalCase) exactly; everything the
// synchronization layer treats generically (device state, energy reports)
// stays a `serde_json::Map` because the tag set differs per device class.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw remote device state: tag name -> value.
///
/// Returned by `Device/Get`, echoed by `Device/Set{class}`, and embedded
/// in each listed device. The `EffectiveFlags` tag rides along inside.
pub type DeviceState = Map<String, Value>;

/// Raw energy report data: metric tag -> value (scalars and hourly arrays).
pub type EnergyReportData = Map<String, Value>;

/// The tag carrying the write bitmask in device state objects.
pub const EFFECTIVE_FLAGS_TAG: &str = "EffectiveFlags";

// ── Login ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginResponse {
    /// Non-null when the credentials were rejected.
    pub error_id: Option<i64>,
    pub error_message: Option<String>,
    pub login_data: Option<LoginData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginData {
    /// The bearer token injected into every subsequent request.
    pub context_key: String,
    /// Token expiry, local to the service (no timezone on the wire).
    pub expiry: NaiveDateTime,
}

// ── Device tree (bulk list) ─────────────────────────────────────────

/// One building from `User/ListDevices`. Devices hang off the structure
/// directly, off floors, and off areas (possibly nested under floors).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Building {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: Option<String>,
    pub structure: Structure,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Structure {
    #[serde(default)]
    pub devices: Vec<ListedDevice>,
    #[serde(default)]
    pub areas: Vec<Area>,
    #[serde(default)]
    pub floors: Vec<Floor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Floor {
    #[serde(default)]
    pub devices: Vec<ListedDevice>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Area {
    #[serde(default)]
    pub devices: Vec<ListedDevice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListedDevice {
    #[serde(rename = "DeviceID")]
    pub device_id: i64,
    pub device_name: Option<String>,
    #[serde(rename = "BuildingID")]
    pub building_id: i64,
    /// Device class code: 0 air-to-air, 1 air-to-water, 3 energy recovery.
    #[serde(rename = "Type", default)]
    pub device_type: i64,
    /// The list view of the device state, including list-only tags.
    #[serde(default)]
    pub device: DeviceState,
}

impl Building {
    /// All devices in this building, regardless of floor/area placement.
    pub fn all_devices(&self) -> Vec<&ListedDevice> {
        let mut out: Vec<&ListedDevice> = self.structure.devices.iter().collect();
        for area in &self.structure.areas {
            out.extend(area.devices.iter());
        }
        for floor in &self.structure.floors {
            out.extend(floor.devices.iter());
            for area in &floor.areas {
                out.extend(area.devices.iter());
            }
        }
        out
    }
}

// ── Energy reports ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnergyReportRequest {
    #[serde(rename = "DeviceID")]
    pub device_id: i64,
    pub from_date: NaiveDateTime,
    pub to_date: NaiveDateTime,
    pub use_currency: bool,
}

/// The field listing per-unit usage percentages for multi-unit systems,
/// e.g. `"50, 50"`. Its entry count is the linked-device count.
pub const USAGE_DISCLAIMER_TAG: &str = "UsageDisclaimerPercentages";

// ── Fault history ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorLogRequest {
    #[serde(rename = "DeviceIDs")]
    pub device_ids: Vec<i64>,
    pub from_date: Option<NaiveDateTime>,
    pub to_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorLogEntry {
    #[serde(rename = "DeviceId")]
    pub device_id: i64,
    pub error_message: Option<String>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
}

// ── Building-level settings ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrostProtection {
    pub enabled: bool,
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrostProtectionUpdate {
    pub enabled: bool,
    pub minimum_temperature: f64,
    pub maximum_temperature: f64,
    #[serde(rename = "BuildingIds")]
    pub building_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HolidayMode {
    pub enabled: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HolidayModeUpdate {
    pub enabled: bool,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    #[serde(rename = "BuildingIds")]
    pub building_ids: Vec<i64>,
}
