// ── Device ──
//
// One cloud-bridged unit. Serializes its synchronizer behind a mutex and
// drives the write state machine: Idle -> PendingDebounce -> Pushing ->
// Idle (+trailing pull) on success, Idle with the diff retained on
// failure. The pull path (list apply, refresh) runs independently and is
// serialized only by funneling through the same session and mutex.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::TimeDelta;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use thermolink_api::SessionManager;
use thermolink_api::models::{DeviceState, EFFECTIVE_FLAGS_TAG, ListedDevice};

use crate::capability::{CapabilityValue, DeviceClass, capability_set};
use crate::error::CoreError;
use crate::report::{EnergyReportEngine, ReportMode};
use crate::scheduler::Timers;
use crate::sync::{SyncMode, Synchronizer};

const PUSH_TIMER: &str = "push-debounce";
const SETTLE_TIMER: &str = "settle-pull";

/// Debounce and settle timings, overridable for tests.
#[derive(Debug, Clone)]
pub struct DeviceTuning {
    /// How long rapid successive writes collapse before a push.
    pub debounce: TimeDelta,
    /// How long after a clean push the reconciling pull runs.
    pub settle: TimeDelta,
}

impl Default for DeviceTuning {
    fn default() -> Self {
        Self {
            debounce: TimeDelta::seconds(1),
            settle: TimeDelta::seconds(60),
        }
    }
}

/// Cheaply cloneable handle to one device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: i64,
    building_id: i64,
    name: String,
    class: DeviceClass,
    session: Arc<SessionManager>,
    state: Arc<Mutex<Synchronizer>>,
    timers: Timers,
    reports: [Arc<EnergyReportEngine>; 2],
    energy_meter: AtomicBool,
    tuning: DeviceTuning,
}

impl Device {
    /// Materialize a device from its listed entry. The list view seeds
    /// the merged state as a plain refresh.
    pub fn new(
        listed: &ListedDevice,
        class: DeviceClass,
        session: Arc<SessionManager>,
        tuning: DeviceTuning,
    ) -> Self {
        let energy_meter = has_energy_meter(&listed.device);
        let mut sync = Synchronizer::new(class, capability_set(class, energy_meter));
        sync.merge(&listed.device, SyncMode::Refresh);
        let state = Arc::new(Mutex::new(sync));

        let reports = [
            EnergyReportEngine::new(
                ReportMode::Regular,
                listed.device_id,
                class,
                Arc::clone(&session),
                Arc::clone(&state),
            ),
            EnergyReportEngine::new(
                ReportMode::Total,
                listed.device_id,
                class,
                Arc::clone(&session),
                Arc::clone(&state),
            ),
        ];

        Self {
            inner: Arc::new(DeviceInner {
                id: listed.device_id,
                building_id: listed.building_id,
                name: listed.device_name.clone().unwrap_or_default(),
                class,
                session,
                state,
                timers: Timers::new(),
                reports,
                energy_meter: AtomicBool::new(energy_meter),
                tuning,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn building_id(&self) -> i64 {
        self.inner.building_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn class(&self) -> DeviceClass {
        self.inner.class
    }

    pub async fn set_always_on(&self, always_on: bool) {
        self.inner.state.lock().await.set_always_on(always_on);
    }

    // ── Write path ───────────────────────────────────────────────────

    /// Queue a capability write and (re)arm the debounce timer.
    pub async fn set_capability(
        &self,
        capability: &str,
        value: CapabilityValue,
    ) -> Result<(), CoreError> {
        self.inner.state.lock().await.enqueue(capability, value)?;
        debug!(device = self.inner.id, capability, "write queued");

        let device = self.clone();
        self.inner
            .timers
            .set_timeout(PUSH_TIMER, self.inner.tuning.debounce, move || async move {
                // A failed cycle is retried on the next write or poll.
                if let Err(e) = device.push().await {
                    warn!(device = device.id(), error = %e, "push failed, diff retained");
                }
            });
        Ok(())
    }

    /// Push the pending diff now, bypassing the debounce.
    ///
    /// The diff snapshot is consumed when the push starts; writes landing
    /// while the request is in flight accumulate into a new diff. On
    /// failure the snapshot is restored without clobbering newer writes.
    pub async fn push(&self) -> Result<(), CoreError> {
        let (snapshot, mut payload, effective_flags) = {
            let mut state = self.inner.state.lock().await;
            let snapshot = state.take_diff();
            let (payload, effective_flags) = state.build_update_payload(&snapshot);
            (snapshot, payload, effective_flags)
        };

        payload.insert("DeviceID".to_owned(), Value::from(self.inner.id));
        payload.insert(EFFECTIVE_FLAGS_TAG.to_owned(), Value::from(effective_flags));
        payload.insert("HasPendingCommand".to_owned(), Value::Bool(true));

        debug!(device = self.inner.id, effective_flags, "pushing state");
        match self
            .inner
            .session
            .set_device(self.inner.class.endpoint_suffix(), &payload)
            .await
        {
            Ok(echo) => {
                let diff_empty = {
                    let mut state = self.inner.state.lock().await;
                    state.merge(&echo, SyncMode::AfterPush);
                    !state.has_pending()
                };
                if diff_empty {
                    // Reconcile server-side auto-adjustments once settled.
                    let device = self.clone();
                    self.inner.timers.set_timeout(
                        SETTLE_TIMER,
                        self.inner.tuning.settle,
                        move || async move {
                            if let Err(e) = device.pull(SyncMode::Periodic).await {
                                warn!(device = device.id(), error = %e, "trailing pull failed");
                            }
                        },
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.inner.state.lock().await.restore_diff(snapshot);
                Err(e.into())
            }
        }
    }

    // ── Pull path ────────────────────────────────────────────────────

    /// Fetch the device directly and merge with the given precedence.
    pub async fn pull(&self, mode: SyncMode) -> Result<(), CoreError> {
        let data = self
            .inner
            .session
            .device_state(self.inner.id, self.inner.building_id)
            .await?;
        self.inner.state.lock().await.merge(&data, mode);
        Ok(())
    }

    /// Full refresh: fetch directly and accept everything.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.pull(SyncMode::Refresh).await
    }

    /// Merge the bulk-list view of this device (list-exclusive fields
    /// only; a pending diff always wins).
    pub async fn apply_list_state(&self, data: &DeviceState) {
        self.inner.state.lock().await.merge(data, SyncMode::Periodic);
    }

    // ── Energy reports ───────────────────────────────────────────────

    /// Start report schedules if the device meters energy.
    pub fn start_reports(&self) {
        if self.inner.energy_meter.load(Ordering::Relaxed) {
            for engine in &self.inner.reports {
                Arc::clone(engine).schedule();
            }
        }
    }

    /// Re-evaluate the energy-relevant settings carried by the list view.
    /// Toggling the meter on recreates the schedules; toggling it off
    /// clears them and drops the metering capabilities.
    pub async fn sync_energy_settings(&self, listed: &DeviceState) {
        let wanted = has_energy_meter(listed);
        let previous = self.inner.energy_meter.swap(wanted, Ordering::Relaxed);
        if previous == wanted {
            return;
        }

        self.inner
            .state
            .lock()
            .await
            .set_capabilities(capability_set(self.inner.class, wanted));

        if wanted {
            debug!(device = self.inner.id, "energy meter appeared, scheduling reports");
            for engine in &self.inner.reports {
                Arc::clone(engine).schedule();
            }
        } else {
            debug!(device = self.inner.id, "energy meter gone, cancelling reports");
            for engine in &self.inner.reports {
                engine.unschedule();
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn capability_value(&self, capability: &str) -> Option<CapabilityValue> {
        self.inner.state.lock().await.value(capability).cloned()
    }

    pub async fn capabilities(&self) -> HashSet<String> {
        self.inner.state.lock().await.capabilities().clone()
    }

    pub async fn capability_values(&self) -> Vec<(String, CapabilityValue)> {
        self.inner.state.lock().await.values()
    }

    pub async fn has_pending(&self) -> bool {
        self.inner.state.lock().await.has_pending()
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Clear every outstanding timer. Nothing fires after removal.
    pub fn remove(&self) {
        self.inner.timers.clear_all();
        for engine in &self.inner.reports {
            engine.unschedule();
        }
    }
}

/// Whether the list view reports an energy meter on this unit.
pub fn has_energy_meter(data: &DeviceState) -> bool {
    ["HasEnergyConsumedMeter", "HasEnergyProducedMeter"]
        .iter()
        .any(|tag| data.get(*tag).and_then(Value::as_bool).unwrap_or(false))
}
