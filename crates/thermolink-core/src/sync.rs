// ── Diff-based capability synchronizer ──
//
// One per device. Holds the pending-write diff and the last known merged
// remote state. The push path builds a full payload with a bitmask of the
// fields that actually changed; the pull path merges responses from three
// distinct remote views with mode-dependent precedence.

use std::collections::{HashMap, HashSet};
use std::mem;

use serde_json::Value;

use thermolink_api::models::{DeviceState, EFFECTIVE_FLAGS_TAG};

use crate::capability::{
    CapabilityValue, DeviceClass, OPERATIONAL_STATE_CAPABILITIES, TagEntry, derive_zone_state,
    get_mapping, list_mapping, set_mapping,
};
use crate::error::CoreError;

/// Which remote view a merge comes from.
///
/// - `AfterPush`: the echoed response of a partial write -- the device
///   just told us what state it settled into, so every set/get-mapped
///   field is accepted.
/// - `Periodic`: the bulk-list view. Only list-exclusive fields are
///   accepted, because direct fields may be stale relative to an
///   in-flight local diff.
/// - `Refresh`: a plain full refresh -- everything is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    AfterPush,
    Periodic,
    Refresh,
}

/// Pending diff and merged state for one device.
pub struct Synchronizer {
    class: DeviceClass,
    capabilities: HashSet<String>,
    /// When set, the power field is written as `true` even if the raw
    /// requested value was off.
    always_on: bool,
    diff: HashMap<String, CapabilityValue>,
    merged: HashMap<String, CapabilityValue>,
}

impl Synchronizer {
    pub fn new(class: DeviceClass, capabilities: HashSet<String>) -> Self {
        Self {
            class,
            capabilities,
            always_on: false,
            diff: HashMap::new(),
            merged: HashMap::new(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    pub fn set_capabilities(&mut self, capabilities: HashSet<String>) {
        self.merged.retain(|capability, _| capabilities.contains(capability));
        self.capabilities = capabilities;
    }

    pub fn set_always_on(&mut self, always_on: bool) {
        self.always_on = always_on;
    }

    // ── Diff handling ────────────────────────────────────────────────

    /// Queue a capability write for the next push.
    pub fn enqueue(&mut self, capability: &str, value: CapabilityValue) -> Result<(), CoreError> {
        if !self.capabilities.contains(capability) {
            return Err(CoreError::UnknownCapability {
                capability: capability.to_owned(),
            });
        }
        self.diff.insert(capability.to_owned(), value);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.diff.is_empty()
    }

    /// Consume the diff snapshot for a push. Writes arriving afterwards
    /// accumulate into a new diff and never join the in-flight payload.
    pub fn take_diff(&mut self) -> HashMap<String, CapabilityValue> {
        mem::take(&mut self.diff)
    }

    /// Put a failed push's snapshot back, without clobbering anything
    /// written while the push was in flight.
    pub fn restore_diff(&mut self, snapshot: HashMap<String, CapabilityValue>) {
        for (capability, value) in snapshot {
            self.diff.entry(capability).or_insert(value);
        }
    }

    // ── Push path ────────────────────────────────────────────────────

    /// Build the wire payload for a diff snapshot.
    ///
    /// The remote requires the full object even for unchanged fields, but
    /// only flagged fields are actually applied: every exposed capability
    /// in the set mapping is emitted, and the returned mask is the OR of
    /// exactly the flags of the capabilities present in the diff.
    pub fn build_update_payload(
        &self,
        diff: &HashMap<String, CapabilityValue>,
    ) -> (DeviceState, u64) {
        let mut payload = DeviceState::new();
        let mut effective_flags: u64 = 0;

        for entry in set_mapping(self.class) {
            if !self.capabilities.contains(entry.capability) {
                continue;
            }
            let value = if let Some(requested) = diff.get(entry.capability) {
                effective_flags |= entry.flag.unwrap_or(0);
                self.encode(entry, requested)
            } else if let Some(current) = self.merged.get(entry.capability) {
                self.encode(entry, current)
            } else {
                continue;
            };
            payload.insert(entry.tag.to_owned(), value);
        }

        (payload, effective_flags)
    }

    fn encode(&self, entry: &TagEntry, value: &CapabilityValue) -> Value {
        if self.always_on && entry.capability == "onoff" {
            return Value::Bool(true);
        }
        match entry.to_device {
            Some(convert) => convert(value),
            None => value.to_json(),
        }
    }

    // ── Pull path ────────────────────────────────────────────────────

    /// Merge a remote state view into the local cache.
    ///
    /// When the response carries a non-zero `EffectiveFlags` mask, a
    /// flagged field whose bit is unset was rejected or ignored this
    /// round and is skipped; a zero mask makes every field authoritative.
    /// The derived zone states are recomputed last, in a fixed order,
    /// because they combine several raw fields.
    pub fn merge(&mut self, response: &DeviceState, mode: SyncMode) {
        let mask = response
            .get(EFFECTIVE_FLAGS_TAG)
            .and_then(Value::as_u64)
            .unwrap_or(0);

        for entry in merge_entries(self.class, mode) {
            if !self.capabilities.contains(entry.capability) {
                continue;
            }
            // A tag already queued locally must not be clobbered by a
            // stale periodic view.
            if mode == SyncMode::Periodic && self.diff.contains_key(entry.capability) {
                continue;
            }
            let Some(raw) = response.get(entry.tag) else {
                continue;
            };
            if mask != 0 {
                if let Some(flag) = entry.flag {
                    if mask & flag == 0 {
                        continue;
                    }
                }
            }
            let decoded = match entry.from_device {
                Some(convert) => convert(raw),
                None => CapabilityValue::from_json(raw),
            };
            if let Some(value) = decoded {
                self.merged.insert(entry.capability.to_owned(), value);
            }
        }

        if self.class == DeviceClass::AirToWater {
            for (index, capability) in OPERATIONAL_STATE_CAPABILITIES.iter().enumerate() {
                if self.capabilities.contains(*capability) {
                    let zone = u8::try_from(index + 1).unwrap_or(1);
                    let state = derive_zone_state(&self.merged, zone);
                    self.merged
                        .insert((*capability).to_owned(), CapabilityValue::from(state));
                }
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn value(&self, capability: &str) -> Option<&CapabilityValue> {
        self.merged.get(capability)
    }

    /// Current merged state, sorted by capability name.
    pub fn values(&self) -> Vec<(String, CapabilityValue)> {
        let mut out: Vec<(String, CapabilityValue)> = self
            .merged
            .iter()
            .map(|(capability, value)| (capability.clone(), value.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Store a locally computed metering value.
    pub fn store_report_value(&mut self, capability: &str, value: f64) {
        self.merged
            .insert(capability.to_owned(), CapabilityValue::Number(value));
    }
}

/// The tag entries a merge in this mode may accept.
fn merge_entries(class: DeviceClass, mode: SyncMode) -> Vec<&'static TagEntry> {
    let set_get = || set_mapping(class).iter().chain(get_mapping(class));
    match mode {
        SyncMode::AfterPush => set_get().collect(),
        SyncMode::Refresh => set_get().chain(list_mapping(class)).collect(),
        SyncMode::Periodic => {
            // Only fields exclusive to the bulk-list view.
            let covered: HashSet<&str> = set_get().map(|entry| entry.tag).collect();
            list_mapping(class)
                .iter()
                .filter(|entry| !covered.contains(entry.tag))
                .collect()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::capability::{capability_set, flags};

    fn ata() -> Synchronizer {
        Synchronizer::new(
            DeviceClass::AirToAir,
            capability_set(DeviceClass::AirToAir, false),
        )
    }

    fn atw() -> Synchronizer {
        Synchronizer::new(
            DeviceClass::AirToWater,
            capability_set(DeviceClass::AirToWater, false),
        )
    }

    fn state(pairs: &[(&str, Value)]) -> DeviceState {
        pairs
            .iter()
            .map(|(tag, value)| ((*tag).to_owned(), value.clone()))
            .collect()
    }

    // ── Push path ────────────────────────────────────────────────────

    #[test]
    fn empty_diff_produces_zero_flags() {
        let sync = ata();
        let (_, flags) = sync.build_update_payload(&HashMap::new());
        assert_eq!(flags, 0);
    }

    #[test]
    fn flags_are_the_or_of_exactly_the_diffed_capabilities() {
        let mut sync = ata();
        sync.enqueue("target_temperature", CapabilityValue::Number(21.0))
            .unwrap();
        sync.enqueue("onoff", CapabilityValue::Bool(true)).unwrap();

        let diff = sync.take_diff();
        let (payload, mask) = sync.build_update_payload(&diff);

        assert_eq!(mask, flags::POWER | flags::TARGET_TEMPERATURE);
        assert_eq!(payload.get("SetTemperature"), Some(&json!(21.0)));
        assert_eq!(payload.get("Power"), Some(&json!(true)));
    }

    #[test]
    fn flags_are_independent_of_write_order() {
        let subsets: &[&[&str]] = &[
            &["onoff", "fan_speed"],
            &["fan_speed", "onoff"],
            &["vertical_position", "onoff", "target_temperature"],
            &["target_temperature", "vertical_position", "onoff"],
        ];
        let mut masks = Vec::new();
        for subset in subsets {
            let mut sync = ata();
            for capability in *subset {
                let value = match *capability {
                    "onoff" => CapabilityValue::Bool(true),
                    "vertical_position" => CapabilityValue::from("auto"),
                    _ => CapabilityValue::Number(2.0),
                };
                sync.enqueue(capability, value).unwrap();
            }
            let diff = sync.take_diff();
            let (_, mask) = sync.build_update_payload(&diff);
            masks.push(mask);
        }
        assert_eq!(masks[0], masks[1]);
        assert_eq!(masks[2], masks[3]);
        assert_eq!(masks[0], flags::POWER | flags::FAN_SPEED);
        assert_eq!(
            masks[2],
            flags::POWER | flags::TARGET_TEMPERATURE | flags::VANE_VERTICAL
        );
    }

    #[test]
    fn unchanged_fields_carry_current_merged_values_unflagged() {
        let mut sync = ata();
        sync.merge(
            &state(&[("Power", json!(true)), ("SetTemperature", json!(19.0))]),
            SyncMode::Refresh,
        );
        sync.enqueue("target_temperature", CapabilityValue::Number(22.0))
            .unwrap();

        let diff = sync.take_diff();
        let (payload, mask) = sync.build_update_payload(&diff);

        assert_eq!(mask, flags::TARGET_TEMPERATURE);
        // Power rides along as the current value, but is not flagged.
        assert_eq!(payload.get("Power"), Some(&json!(true)));
        assert_eq!(payload.get("SetTemperature"), Some(&json!(22.0)));
    }

    #[test]
    fn converters_apply_on_the_way_out() {
        let mut sync = ata();
        sync.enqueue("operation_mode", CapabilityValue::from("cool"))
            .unwrap();
        sync.enqueue("target_temperature", CapabilityValue::Number(21.3))
            .unwrap();

        let diff = sync.take_diff();
        let (payload, _) = sync.build_update_payload(&diff);

        assert_eq!(payload.get("OperationMode"), Some(&json!(3)));
        assert_eq!(payload.get("SetTemperature"), Some(&json!(21.5)));
    }

    #[test]
    fn always_on_forces_the_power_field_true() {
        let mut sync = ata();
        sync.set_always_on(true);
        sync.enqueue("onoff", CapabilityValue::Bool(false)).unwrap();

        let diff = sync.take_diff();
        let (payload, mask) = sync.build_update_payload(&diff);

        assert_eq!(payload.get("Power"), Some(&json!(true)));
        assert_eq!(mask, flags::POWER);
    }

    #[test]
    fn enqueue_rejects_unknown_capabilities() {
        let mut sync = ata();
        let result = sync.enqueue("warp_drive", CapabilityValue::Bool(true));
        assert!(matches!(result, Err(CoreError::UnknownCapability { .. })));
    }

    #[test]
    fn restore_does_not_clobber_newer_writes() {
        let mut sync = ata();
        sync.enqueue("target_temperature", CapabilityValue::Number(21.0))
            .unwrap();
        let snapshot = sync.take_diff();

        // A newer write lands while the push is in flight.
        sync.enqueue("target_temperature", CapabilityValue::Number(23.0))
            .unwrap();
        sync.restore_diff(snapshot);

        let diff = sync.take_diff();
        assert_eq!(diff["target_temperature"], CapabilityValue::Number(23.0));
    }

    // ── Pull path ────────────────────────────────────────────────────

    #[test]
    fn after_push_accepts_set_and_get_fields() {
        let mut sync = ata();
        sync.merge(
            &state(&[
                ("SetTemperature", json!(21.0)),
                ("RoomTemperature", json!(22.5)),
                ("WifiSignalStrength", json!(-60)),
            ]),
            SyncMode::AfterPush,
        );

        assert_eq!(
            sync.value("target_temperature"),
            Some(&CapabilityValue::Number(21.0))
        );
        assert_eq!(
            sync.value("measure_temperature"),
            Some(&CapabilityValue::Number(22.5))
        );
        // List-only fields are not part of the after-push view.
        assert_eq!(sync.value("measure_signal_strength"), None);
    }

    #[test]
    fn periodic_accepts_only_list_exclusive_fields() {
        let mut sync = ata();
        sync.merge(
            &state(&[("SetTemperature", json!(25.0))]),
            SyncMode::Refresh,
        );

        sync.merge(
            &state(&[
                ("SetTemperature", json!(18.0)),
                ("WifiSignalStrength", json!(-55)),
            ]),
            SyncMode::Periodic,
        );

        // Direct field kept its previous value; list-only field landed.
        assert_eq!(
            sync.value("target_temperature"),
            Some(&CapabilityValue::Number(25.0))
        );
        assert_eq!(
            sync.value("measure_signal_strength"),
            Some(&CapabilityValue::Number(-55.0))
        );
    }

    #[test]
    fn refresh_accepts_everything() {
        let mut sync = ata();
        sync.merge(
            &state(&[
                ("Power", json!(true)),
                ("RoomTemperature", json!(20.0)),
                ("WifiSignalStrength", json!(-70)),
            ]),
            SyncMode::Refresh,
        );

        assert_eq!(sync.value("onoff"), Some(&CapabilityValue::Bool(true)));
        assert_eq!(
            sync.value("measure_temperature"),
            Some(&CapabilityValue::Number(20.0))
        );
        assert_eq!(
            sync.value("measure_signal_strength"),
            Some(&CapabilityValue::Number(-70.0))
        );
    }

    #[test]
    fn round_trip_write_push_pull() {
        let mut sync = ata();
        sync.enqueue("target_temperature", CapabilityValue::Number(21.0))
            .unwrap();
        let diff = sync.take_diff();
        let (payload, mask) = sync.build_update_payload(&diff);
        assert_eq!(mask, flags::TARGET_TEMPERATURE);

        // The service echoes the payload with the applied mask.
        let mut echo = payload;
        echo.insert(EFFECTIVE_FLAGS_TAG.to_owned(), json!(mask));
        sync.merge(&echo, SyncMode::AfterPush);

        assert_eq!(
            sync.value("target_temperature"),
            Some(&CapabilityValue::Number(21.0))
        );
    }

    #[test]
    fn unset_mask_bits_are_skipped_during_merge() {
        let mut sync = ata();
        sync.merge(
            &state(&[
                ("Power", json!(true)),
                ("SetTemperature", json!(21.0)),
                (EFFECTIVE_FLAGS_TAG, json!(flags::POWER)),
            ]),
            SyncMode::AfterPush,
        );

        // Only the power bit was set; the temperature was ignored remotely.
        assert_eq!(sync.value("onoff"), Some(&CapabilityValue::Bool(true)));
        assert_eq!(sync.value("target_temperature"), None);
    }

    #[test]
    fn zero_mask_makes_every_field_authoritative() {
        let mut sync = ata();
        sync.merge(
            &state(&[
                ("Power", json!(false)),
                ("SetTemperature", json!(19.5)),
                (EFFECTIVE_FLAGS_TAG, json!(0)),
            ]),
            SyncMode::AfterPush,
        );

        assert_eq!(sync.value("onoff"), Some(&CapabilityValue::Bool(false)));
        assert_eq!(
            sync.value("target_temperature"),
            Some(&CapabilityValue::Number(19.5))
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let response = state(&[
            ("Power", json!(true)),
            ("SetTemperature", json!(21.0)),
            ("RoomTemperature", json!(22.0)),
        ]);

        let mut once = ata();
        once.merge(&response, SyncMode::AfterPush);
        let mut twice = ata();
        twice.merge(&response, SyncMode::AfterPush);
        twice.merge(&response, SyncMode::AfterPush);

        assert_eq!(once.values(), twice.values());
    }

    #[test]
    fn periodic_never_clobbers_a_pending_write() {
        // Uses the air-to-water frequency tag, which IS list-exclusive --
        // but the capability also has a queued write here, so even the
        // list view must leave it alone.
        let mut sync = atw();
        sync.merge(
            &state(&[("HeatPumpFrequency", json!(40))]),
            SyncMode::Periodic,
        );
        assert_eq!(
            sync.value("measure_frequency"),
            Some(&CapabilityValue::Number(40.0))
        );

        sync.enqueue("prohibit.zone1", CapabilityValue::Bool(true))
            .unwrap();
        sync.merge(
            &state(&[
                ("HeatPumpFrequency", json!(45)),
                ("ProhibitZone1", json!(false)),
            ]),
            SyncMode::Periodic,
        );

        assert_eq!(
            sync.value("measure_frequency"),
            Some(&CapabilityValue::Number(45.0))
        );
        // ProhibitZone1 is set-mapped anyway, but the pending diff is the
        // stronger reason it must survive untouched.
        assert!(sync.has_pending());
        assert_eq!(sync.value("prohibit.zone1"), None);
    }

    // ── Derived states ───────────────────────────────────────────────

    #[test]
    fn derived_zone_states_are_recomputed_after_raw_merge() {
        let mut sync = atw();
        sync.merge(
            &state(&[
                ("Power", json!(true)),
                ("IdleZone1", json!(true)),
                ("IdleZone2", json!(false)),
                ("InCoolMode", json!(true)),
            ]),
            SyncMode::Refresh,
        );

        assert_eq!(
            sync.value("operational_state.zone1"),
            Some(&CapabilityValue::from("idle"))
        );
        assert_eq!(
            sync.value("operational_state.zone2"),
            Some(&CapabilityValue::from("cooling"))
        );
    }

    #[test]
    fn large_flags_survive_the_64_bit_mask() {
        let mut sync = atw();
        sync.enqueue("target_temperature.tank", CapabilityValue::Number(50.0))
            .unwrap();
        sync.enqueue("prohibit.zone2", CapabilityValue::Bool(true))
            .unwrap();

        let diff = sync.take_diff();
        let (_, mask) = sync.build_update_payload(&diff);
        assert_eq!(mask, flags::ATW_TANK_TEMPERATURE | flags::ATW_PROHIBIT_ZONE2);
        assert!(mask > u64::from(u32::MAX));
    }
}
