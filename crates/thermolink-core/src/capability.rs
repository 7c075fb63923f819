// ── Capability model and tag mappings ──
//
// A capability is a named, typed local state slot. Each device class maps
// capabilities to remote JSON tags through static tables: the SET mapping
// carries write bit flags, the GET mapping covers read-only tags present
// in direct fetches, and the LIST mapping covers tags that only appear in
// the bulk device tree. Report mappings connect metering capabilities to
// the tags of the energy report endpoint.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use strum::{Display, EnumString};

// ── Values ──────────────────────────────────────────────────────────

/// A capability value as exposed locally.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl CapabilityValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Default wire encoding, used when a tag entry has no converter.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Number(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.clone()),
        }
    }

    /// Default wire decoding for scalar JSON values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for CapabilityValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for CapabilityValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl std::fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

// ── Device classes ──────────────────────────────────────────────────

/// Device class, as encoded by the `Type` code in the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Air-to-air heat pump (air conditioner), type code 0.
    AirToAir,
    /// Air-to-water heat pump, type code 1.
    AirToWater,
    /// Energy-recovery ventilator, type code 3.
    EnergyRecovery,
}

impl DeviceClass {
    pub fn from_type_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::AirToAir),
            1 => Some(Self::AirToWater),
            3 => Some(Self::EnergyRecovery),
            _ => None,
        }
    }

    /// Suffix of the partial-write endpoint (`Device/Set{suffix}`).
    pub fn endpoint_suffix(self) -> &'static str {
        match self {
            Self::AirToAir => "Ata",
            Self::AirToWater => "Atw",
            Self::EnergyRecovery => "Erv",
        }
    }
}

// ── Operating modes ─────────────────────────────────────────────────

/// Air-to-air operation mode. Wire codes follow the vendor enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OperationMode {
    Heat,
    Dry,
    Cool,
    Fan,
    Auto,
}

impl OperationMode {
    pub fn code(self) -> i64 {
        match self {
            Self::Heat => 1,
            Self::Dry => 2,
            Self::Cool => 3,
            Self::Fan => 7,
            Self::Auto => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Heat),
            2 => Some(Self::Dry),
            3 => Some(Self::Cool),
            7 => Some(Self::Fan),
            8 => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Air-to-water zone control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ZoneMode {
    Room,
    Flow,
    Curve,
}

impl ZoneMode {
    pub fn code(self) -> i64 {
        match self {
            Self::Room => 0,
            Self::Flow => 1,
            Self::Curve => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Room),
            1 => Some(Self::Flow),
            2 => Some(Self::Curve),
            _ => None,
        }
    }
}

// ── Tag entries ─────────────────────────────────────────────────────

/// Pure local-to-remote value transform.
pub type ToDevice = fn(&CapabilityValue) -> Value;
/// Pure remote-to-local value transform. `None` drops the field.
pub type FromDevice = fn(&Value) -> Option<CapabilityValue>;

/// One capability-to-tag binding.
pub struct TagEntry {
    pub capability: &'static str,
    pub tag: &'static str,
    /// Write bit flag; `None` for read-only tags.
    pub flag: Option<u64>,
    pub to_device: Option<ToDevice>,
    pub from_device: Option<FromDevice>,
}

/// One metering capability with the report tags it derives from.
pub struct ReportEntry {
    pub capability: &'static str,
    pub tags: &'static [&'static str],
}

// ── Write bit flags ─────────────────────────────────────────────────

/// Vendor bit flags for partial writes. Several air-to-water flags are
/// wider than 32 bits; the mask type must stay `u64`.
pub mod flags {
    pub const POWER: u64 = 0x1;
    pub const OPERATION_MODE: u64 = 0x2;
    pub const TARGET_TEMPERATURE: u64 = 0x4;
    pub const FAN_SPEED: u64 = 0x8;
    pub const VANE_VERTICAL: u64 = 0x10;
    pub const VANE_HORIZONTAL: u64 = 0x100;

    pub const ATW_OPERATION_MODE_ZONE1: u64 = 0x8;
    pub const ATW_OPERATION_MODE_ZONE2: u64 = 0x10;
    pub const ATW_FORCED_HOT_WATER: u64 = 0x1_0000;
    pub const ATW_TARGET_TEMPERATURE_ZONE1: u64 = 0x2_0000_0080;
    pub const ATW_TARGET_TEMPERATURE_ZONE2: u64 = 0x8_0000_0200;
    pub const ATW_TANK_TEMPERATURE: u64 = 0x1000_0000_0020;
    pub const ATW_PROHIBIT_ZONE1: u64 = 0x2_0000_0000_0000;
    pub const ATW_PROHIBIT_ZONE2: u64 = 0x4_0000_0000_0000;

    pub const ERV_VENTILATION_MODE: u64 = 0x4;
    pub const ERV_FAN_SPEED: u64 = 0x8;
}

// ── Converters ──────────────────────────────────────────────────────

/// The remote accepts temperatures in half-degree steps.
fn temperature_to_device(value: &CapabilityValue) -> Value {
    let t = value.as_f64().unwrap_or(0.0);
    Value::from((t * 2.0).round() / 2.0)
}

fn operation_mode_to_device(value: &CapabilityValue) -> Value {
    let mode = value
        .as_str()
        .and_then(|s| s.parse::<OperationMode>().ok())
        .unwrap_or(OperationMode::Auto);
    Value::from(mode.code())
}

fn operation_mode_from_device(value: &Value) -> Option<CapabilityValue> {
    let mode = OperationMode::from_code(value.as_i64()?)?;
    Some(CapabilityValue::Str(mode.to_string()))
}

fn zone_mode_to_device(value: &CapabilityValue) -> Value {
    let mode = value
        .as_str()
        .and_then(|s| s.parse::<ZoneMode>().ok())
        .unwrap_or(ZoneMode::Room);
    Value::from(mode.code())
}

fn zone_mode_from_device(value: &Value) -> Option<CapabilityValue> {
    let mode = ZoneMode::from_code(value.as_i64()?)?;
    Some(CapabilityValue::Str(mode.to_string()))
}

/// Vane positions: `auto`, `1`..`5`, `swing` <-> vendor codes 0..5, 7.
fn vane_to_device(value: &CapabilityValue) -> Value {
    if let Some(position) = value.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        return Value::from((position.round() as i64).clamp(1, 5));
    }
    let code = match value.as_str() {
        Some("swing") => 7,
        Some(pos) if pos != "auto" => pos.parse::<i64>().unwrap_or(0).clamp(1, 5),
        _ => 0,
    };
    Value::from(code)
}

fn vane_from_device(value: &Value) -> Option<CapabilityValue> {
    let name = match value.as_i64()? {
        0 => "auto".to_owned(),
        7 => "swing".to_owned(),
        pos @ 1..=5 => pos.to_string(),
        _ => return None,
    };
    Some(CapabilityValue::Str(name))
}

// ── Static mappings per class ───────────────────────────────────────

static ATA_SET: &[TagEntry] = &[
    TagEntry {
        capability: "onoff",
        tag: "Power",
        flag: Some(flags::POWER),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "operation_mode",
        tag: "OperationMode",
        flag: Some(flags::OPERATION_MODE),
        to_device: Some(operation_mode_to_device),
        from_device: Some(operation_mode_from_device),
    },
    TagEntry {
        capability: "target_temperature",
        tag: "SetTemperature",
        flag: Some(flags::TARGET_TEMPERATURE),
        to_device: Some(temperature_to_device),
        from_device: None,
    },
    TagEntry {
        capability: "fan_speed",
        tag: "SetFanSpeed",
        flag: Some(flags::FAN_SPEED),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "vertical_position",
        tag: "VaneVertical",
        flag: Some(flags::VANE_VERTICAL),
        to_device: Some(vane_to_device),
        from_device: Some(vane_from_device),
    },
    TagEntry {
        capability: "horizontal_position",
        tag: "VaneHorizontal",
        flag: Some(flags::VANE_HORIZONTAL),
        to_device: Some(vane_to_device),
        from_device: Some(vane_from_device),
    },
];

static ATA_GET: &[TagEntry] = &[TagEntry {
    capability: "measure_temperature",
    tag: "RoomTemperature",
    flag: None,
    to_device: None,
    from_device: None,
}];

static ATA_LIST: &[TagEntry] = &[
    TagEntry {
        capability: "measure_signal_strength",
        tag: "WifiSignalStrength",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "alarm_generic.offline",
        tag: "Offline",
        flag: None,
        to_device: None,
        from_device: None,
    },
];

static ATW_SET: &[TagEntry] = &[
    TagEntry {
        capability: "onoff",
        tag: "Power",
        flag: Some(flags::POWER),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "operation_mode.zone1",
        tag: "OperationModeZone1",
        flag: Some(flags::ATW_OPERATION_MODE_ZONE1),
        to_device: Some(zone_mode_to_device),
        from_device: Some(zone_mode_from_device),
    },
    TagEntry {
        capability: "operation_mode.zone2",
        tag: "OperationModeZone2",
        flag: Some(flags::ATW_OPERATION_MODE_ZONE2),
        to_device: Some(zone_mode_to_device),
        from_device: Some(zone_mode_from_device),
    },
    TagEntry {
        capability: "target_temperature.zone1",
        tag: "SetTemperatureZone1",
        flag: Some(flags::ATW_TARGET_TEMPERATURE_ZONE1),
        to_device: Some(temperature_to_device),
        from_device: None,
    },
    TagEntry {
        capability: "target_temperature.zone2",
        tag: "SetTemperatureZone2",
        flag: Some(flags::ATW_TARGET_TEMPERATURE_ZONE2),
        to_device: Some(temperature_to_device),
        from_device: None,
    },
    TagEntry {
        capability: "target_temperature.tank",
        tag: "SetTankWaterTemperature",
        flag: Some(flags::ATW_TANK_TEMPERATURE),
        to_device: Some(temperature_to_device),
        from_device: None,
    },
    TagEntry {
        capability: "onoff.forced_hot_water",
        tag: "ForcedHotWaterMode",
        flag: Some(flags::ATW_FORCED_HOT_WATER),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "prohibit.zone1",
        tag: "ProhibitZone1",
        flag: Some(flags::ATW_PROHIBIT_ZONE1),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "prohibit.zone2",
        tag: "ProhibitZone2",
        flag: Some(flags::ATW_PROHIBIT_ZONE2),
        to_device: None,
        from_device: None,
    },
];

static ATW_GET: &[TagEntry] = &[
    TagEntry {
        capability: "measure_temperature.zone1",
        tag: "RoomTemperatureZone1",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_temperature.zone2",
        tag: "RoomTemperatureZone2",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_temperature.tank",
        tag: "TankWaterTemperature",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_temperature.outdoor",
        tag: "OutdoorTemperature",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "status.idle_zone1",
        tag: "IdleZone1",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "status.idle_zone2",
        tag: "IdleZone2",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "status.in_cool_mode",
        tag: "InCoolMode",
        flag: None,
        to_device: None,
        from_device: None,
    },
];

static ATW_LIST: &[TagEntry] = &[
    TagEntry {
        capability: "measure_frequency",
        tag: "HeatPumpFrequency",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_signal_strength",
        tag: "WifiSignalStrength",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "alarm_generic.defrost",
        tag: "DefrostMode",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "alarm_generic.offline",
        tag: "Offline",
        flag: None,
        to_device: None,
        from_device: None,
    },
];

static ERV_SET: &[TagEntry] = &[
    TagEntry {
        capability: "onoff",
        tag: "Power",
        flag: Some(flags::POWER),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "ventilation_mode",
        tag: "VentilationMode",
        flag: Some(flags::ERV_VENTILATION_MODE),
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "fan_speed",
        tag: "SetFanSpeed",
        flag: Some(flags::ERV_FAN_SPEED),
        to_device: None,
        from_device: None,
    },
];

static ERV_GET: &[TagEntry] = &[
    TagEntry {
        capability: "measure_temperature",
        tag: "RoomTemperature",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_temperature.outdoor",
        tag: "OutdoorTemperature",
        flag: None,
        to_device: None,
        from_device: None,
    },
];

static ERV_LIST: &[TagEntry] = &[
    TagEntry {
        capability: "measure_co2",
        tag: "RoomCO2Level",
        flag: None,
        to_device: None,
        from_device: None,
    },
    TagEntry {
        capability: "measure_signal_strength",
        tag: "WifiSignalStrength",
        flag: None,
        to_device: None,
        from_device: None,
    },
];

// ── Report mappings ─────────────────────────────────────────────────

static ATA_REPORT: &[ReportEntry] = &[
    ReportEntry {
        capability: "measure_power",
        tags: &["Heating", "Cooling", "Auto", "Dry", "Fan", "Other"],
    },
    ReportEntry {
        capability: "meter_power.daily",
        tags: &[
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalAutoConsumed",
            "TotalDryConsumed",
            "TotalFanConsumed",
            "TotalOtherConsumed",
        ],
    },
    ReportEntry {
        capability: "meter_power.total",
        tags: &[
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalAutoConsumed",
            "TotalDryConsumed",
            "TotalFanConsumed",
            "TotalOtherConsumed",
        ],
    },
];

static ATW_REPORT: &[ReportEntry] = &[
    ReportEntry {
        capability: "meter_power.daily",
        tags: &[
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalHotWaterConsumed",
        ],
    },
    ReportEntry {
        capability: "meter_power.cop_daily",
        tags: &[
            "TotalHeatingProduced",
            "TotalCoolingProduced",
            "TotalHotWaterProduced",
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalHotWaterConsumed",
        ],
    },
    ReportEntry {
        capability: "meter_power.total",
        tags: &[
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalHotWaterConsumed",
        ],
    },
    ReportEntry {
        capability: "meter_power.cop_total",
        tags: &[
            "TotalHeatingProduced",
            "TotalCoolingProduced",
            "TotalHotWaterProduced",
            "TotalHeatingConsumed",
            "TotalCoolingConsumed",
            "TotalHotWaterConsumed",
        ],
    },
];

static ERV_REPORT: &[ReportEntry] = &[];

// ── Accessors ───────────────────────────────────────────────────────

pub fn set_mapping(class: DeviceClass) -> &'static [TagEntry] {
    match class {
        DeviceClass::AirToAir => ATA_SET,
        DeviceClass::AirToWater => ATW_SET,
        DeviceClass::EnergyRecovery => ERV_SET,
    }
}

pub fn get_mapping(class: DeviceClass) -> &'static [TagEntry] {
    match class {
        DeviceClass::AirToAir => ATA_GET,
        DeviceClass::AirToWater => ATW_GET,
        DeviceClass::EnergyRecovery => ERV_GET,
    }
}

pub fn list_mapping(class: DeviceClass) -> &'static [TagEntry] {
    match class {
        DeviceClass::AirToAir => ATA_LIST,
        DeviceClass::AirToWater => ATW_LIST,
        DeviceClass::EnergyRecovery => ERV_LIST,
    }
}

pub fn report_mapping(class: DeviceClass) -> &'static [ReportEntry] {
    match class {
        DeviceClass::AirToAir => ATA_REPORT,
        DeviceClass::AirToWater => ATW_REPORT,
        DeviceClass::EnergyRecovery => ERV_REPORT,
    }
}

// ── Derived capabilities ────────────────────────────────────────────

/// Zone operating-state display capabilities. Computed from merged raw
/// fields after every merge, never mapped to a tag, always in this order.
pub const OPERATIONAL_STATE_CAPABILITIES: [&str; 2] =
    ["operational_state.zone1", "operational_state.zone2"];

/// Compute a zone's display state from the merged raw fields.
pub fn derive_zone_state(merged: &HashMap<String, CapabilityValue>, zone: u8) -> &'static str {
    let truthy = |capability: &str| {
        merged
            .get(capability)
            .and_then(CapabilityValue::as_bool)
            .unwrap_or(false)
    };

    if !truthy("onoff") {
        "off"
    } else if truthy(&format!("prohibit.zone{zone}")) {
        "prohibited"
    } else if truthy(&format!("status.idle_zone{zone}")) {
        "idle"
    } else if truthy("status.in_cool_mode") {
        "cooling"
    } else {
        "heating"
    }
}

// ── Capability sets ─────────────────────────────────────────────────

/// The capabilities a device of this class exposes.
///
/// Metering capabilities are included only when the device reports an
/// energy meter in its list data.
pub fn capability_set(class: DeviceClass, energy_meter: bool) -> HashSet<String> {
    let mut caps: HashSet<String> = set_mapping(class)
        .iter()
        .chain(get_mapping(class))
        .chain(list_mapping(class))
        .map(|entry| entry.capability.to_owned())
        .collect();

    if class == DeviceClass::AirToWater {
        for capability in OPERATIONAL_STATE_CAPABILITIES {
            caps.insert(capability.to_owned());
        }
    }

    if energy_meter {
        for entry in report_mapping(class) {
            caps.insert(entry.capability.to_owned());
        }
    }

    caps
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn temperature_rounds_to_half_degrees() {
        let v = temperature_to_device(&CapabilityValue::Number(21.3));
        assert_eq!(v.as_f64().unwrap(), 21.5);
        let v = temperature_to_device(&CapabilityValue::Number(21.2));
        assert_eq!(v.as_f64().unwrap(), 21.0);
    }

    #[test]
    fn operation_mode_round_trips() {
        let wire = operation_mode_to_device(&CapabilityValue::from("cool"));
        assert_eq!(wire.as_i64().unwrap(), 3);
        let local = operation_mode_from_device(&wire).unwrap();
        assert_eq!(local.as_str().unwrap(), "cool");
    }

    #[test]
    fn unknown_operation_mode_code_is_dropped() {
        assert!(operation_mode_from_device(&Value::from(42)).is_none());
    }

    #[test]
    fn vane_positions_round_trip() {
        for name in ["auto", "1", "3", "5", "swing"] {
            let wire = vane_to_device(&CapabilityValue::from(name));
            let local = vane_from_device(&wire).unwrap();
            assert_eq!(local.as_str().unwrap(), name);
        }
    }

    #[test]
    fn air_to_water_exposes_derived_states() {
        let caps = capability_set(DeviceClass::AirToWater, false);
        assert!(caps.contains("operational_state.zone1"));
        assert!(caps.contains("operational_state.zone2"));
        assert!(!caps.contains("meter_power.daily"));
    }

    #[test]
    fn energy_meter_adds_report_capabilities() {
        let caps = capability_set(DeviceClass::AirToAir, true);
        assert!(caps.contains("measure_power"));
        assert!(caps.contains("meter_power.total"));
    }

    #[test]
    fn zone_state_precedence() {
        let mut merged = HashMap::new();
        merged.insert("onoff".to_owned(), CapabilityValue::Bool(true));
        merged.insert("prohibit.zone1".to_owned(), CapabilityValue::Bool(true));
        merged.insert("status.idle_zone1".to_owned(), CapabilityValue::Bool(true));
        assert_eq!(derive_zone_state(&merged, 1), "prohibited");

        merged.insert("prohibit.zone1".to_owned(), CapabilityValue::Bool(false));
        assert_eq!(derive_zone_state(&merged, 1), "idle");

        merged.insert("status.idle_zone1".to_owned(), CapabilityValue::Bool(false));
        merged.insert("status.in_cool_mode".to_owned(), CapabilityValue::Bool(true));
        assert_eq!(derive_zone_state(&merged, 1), "cooling");

        merged.insert("onoff".to_owned(), CapabilityValue::Bool(false));
        assert_eq!(derive_zone_state(&merged, 1), "off");
    }
}
