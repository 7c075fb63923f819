// ── Energy report engine ──
//
// One engine per device per mode. `regular` covers a short horizon ending
// shortly before now; `total` covers lifetime-to-date. Each cycle fetches
// the report endpoint over the mode's date range, computes the metering
// capability values, and re-arms itself on a clock-aligned cadence.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use thermolink_api::SessionManager;
use thermolink_api::models::{EnergyReportData, EnergyReportRequest, USAGE_DISCLAIMER_TAG};

use crate::capability::{DeviceClass, ReportEntry, report_mapping};
use crate::scheduler::Timers;
use crate::sync::Synchronizer;

const ALIGN_TIMER: &str = "report-align";
const CYCLE_TIMER: &str = "report-cycle";

/// Report cadence: short horizon vs lifetime-cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Regular,
    Total,
}

impl ReportMode {
    /// Mode membership of a metering capability: a `total`-suffixed name
    /// belongs to [`Total`](Self::Total), everything else to
    /// [`Regular`](Self::Regular).
    pub fn of(capability: &str) -> Self {
        if capability.ends_with("total") {
            Self::Total
        } else {
            Self::Regular
        }
    }

    /// The repeat interval, also the forward jump before alignment.
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::Regular => TimeDelta::hours(1),
            Self::Total => TimeDelta::days(1),
        }
    }

    /// How far the end of a regular range trails behind now.
    fn offset(self) -> TimeDelta {
        match self {
            Self::Regular => TimeDelta::hours(1),
            Self::Total => TimeDelta::zero(),
        }
    }
}

/// The date range a report fetch covers.
pub fn date_range(mode: ReportMode, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    match mode {
        ReportMode::Regular => {
            let from = NaiveDateTime::new(now.date() - Days::new(1), NaiveTime::MIN);
            (from, now - mode.offset())
        }
        ReportMode::Total => (NaiveDateTime::UNIX_EPOCH, now),
    }
}

/// The next clock-aligned fire instant: now moved forward by the mode's
/// duration, then snapped to a fixed wall-clock time.
pub fn next_fire(mode: ReportMode, now: DateTime<Utc>) -> DateTime<Utc> {
    let advanced = now + mode.duration();
    let snapped = match mode {
        ReportMode::Regular => advanced.with_minute(10),
        ReportMode::Total => advanced.with_hour(1).and_then(|t| t.with_minute(10)),
    };
    snapped
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(advanced)
}

/// Per-device, per-mode energy report scheduler.
pub struct EnergyReportEngine {
    mode: ReportMode,
    device_id: i64,
    class: DeviceClass,
    session: Arc<SessionManager>,
    state: Arc<Mutex<Synchronizer>>,
    timers: Timers,
}

impl EnergyReportEngine {
    pub fn new(
        mode: ReportMode,
        device_id: i64,
        class: DeviceClass,
        session: Arc<SessionManager>,
        state: Arc<Mutex<Synchronizer>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            mode,
            device_id,
            class,
            session,
            state,
            timers: Timers::new(),
        })
    }

    /// Arm the one-shot alignment timer; once it fires, the repeating
    /// cycle takes over. Idempotent: re-arming replaces pending timers.
    pub fn schedule(self: Arc<Self>) {
        let now = Utc::now();
        let next = next_fire(self.mode, now);
        debug!(device = self.device_id, mode = ?self.mode, %next, "energy report scheduled");

        let engine = Arc::clone(&self);
        self.timers.set_timeout(ALIGN_TIMER, next - now, move || async move {
            Arc::clone(&engine).handle().await;
            let cycle = Arc::clone(&engine);
            engine
                .timers
                .set_interval(CYCLE_TIMER, engine.mode.duration(), move || {
                    let engine = Arc::clone(&cycle);
                    async move {
                        engine.handle().await;
                    }
                });
        });
    }

    /// Clear both the alignment and the cycle timer.
    pub fn unschedule(&self) {
        self.timers.clear(ALIGN_TIMER);
        self.timers.clear(CYCLE_TIMER);
    }

    /// One report cycle: fetch, compute, store. Exits (and cancels the
    /// schedule) when the device no longer exposes any capability for
    /// this mode; a failed fetch only warns, the cadence keeps running.
    pub async fn handle(self: Arc<Self>) {
        let entries = self.mapping().await;
        if entries.is_empty() {
            debug!(device = self.device_id, mode = ?self.mode, "no metering capabilities, report schedule cancelled");
            self.unschedule();
            return;
        }

        let (from, to) = date_range(self.mode, Utc::now().naive_utc());
        let request = EnergyReportRequest {
            device_id: self.device_id,
            from_date: from,
            to_date: to,
            use_currency: false,
        };

        match self.session.energy_report(&request).await {
            Ok(data) => {
                let linked = linked_device_count(&data);
                let target_hour = usize::try_from(to.hour()).unwrap_or(0);
                let mut state = self.state.lock().await;
                for entry in entries {
                    let value = compute_metric(entry, &data, target_hour, linked);
                    state.store_report_value(entry.capability, value);
                }
                debug!(device = self.device_id, mode = ?self.mode, "energy report applied");
            }
            Err(e) => {
                warn!(device = self.device_id, error = %e, "energy report fetch failed");
            }
        }
    }

    /// The report entries active for this mode, filtered to the
    /// capabilities the device currently exposes.
    async fn mapping(&self) -> Vec<&'static ReportEntry> {
        let state = self.state.lock().await;
        report_mapping(self.class)
            .iter()
            .filter(|entry| ReportMode::of(entry.capability) == self.mode)
            .filter(|entry| state.capabilities().contains(entry.capability))
            .collect()
    }
}

// ── Metric computation ──────────────────────────────────────────────

/// Compute one metering capability from report data.
pub fn compute_metric(
    entry: &ReportEntry,
    data: &EnergyReportData,
    target_hour: usize,
    linked_devices: f64,
) -> f64 {
    if entry.capability.contains("cop") {
        let produced: f64 = entry
            .tags
            .iter()
            .filter(|tag| tag.contains("Produced"))
            .map(|tag| scalar(data, tag))
            .sum();
        let consumed: f64 = entry
            .tags
            .iter()
            .filter(|tag| tag.contains("Consumed"))
            .map(|tag| scalar(data, tag))
            .sum();
        // Denominator floored at 1 so a zero-consumption window cannot
        // produce Infinity or NaN.
        produced / consumed.max(1.0)
    } else if entry.capability.starts_with("measure_power") {
        let sum: f64 = entry
            .tags
            .iter()
            .map(|tag| hourly(data, tag, target_hour))
            .sum();
        sum * 1000.0 / linked_devices
    } else {
        let sum: f64 = entry.tags.iter().map(|tag| scalar(data, tag)).sum();
        sum / linked_devices
    }
}

/// The number of physically-linked devices sharing this report, parsed
/// from the disclaimer-percentages field. Defaults to 1.
pub fn linked_device_count(data: &EnergyReportData) -> f64 {
    let count = data
        .get(USAGE_DISCLAIMER_TAG)
        .and_then(Value::as_str)
        .map_or(1, |s| s.split(',').count());
    count.max(1) as f64
}

fn scalar(data: &EnergyReportData, tag: &str) -> f64 {
    data.get(tag).and_then(Value::as_f64).unwrap_or(0.0)
}

fn hourly(data: &EnergyReportData, tag: &str, hour: usize) -> f64 {
    data.get(tag)
        .and_then(Value::as_array)
        .and_then(|values| values.get(hour))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn entry(capability: &'static str, tags: &'static [&'static str]) -> ReportEntry {
        ReportEntry { capability, tags }
    }

    fn data(pairs: &[(&str, Value)]) -> EnergyReportData {
        pairs
            .iter()
            .map(|(tag, value)| ((*tag).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn cop_denominator_is_floored_at_one() {
        let report = data(&[
            ("TotalHeatingProduced", json!(10.0)),
            ("TotalHeatingConsumed", json!(0.0)),
        ]);
        let e = entry(
            "meter_power.cop_daily",
            &["TotalHeatingProduced", "TotalHeatingConsumed"],
        );
        let value = compute_metric(&e, &report, 0, 1.0);
        assert_eq!(value, 10.0);
        assert!(value.is_finite());
    }

    #[test]
    fn cop_divides_produced_by_consumed() {
        let report = data(&[
            ("TotalHeatingProduced", json!(9.0)),
            ("TotalHotWaterProduced", json!(3.0)),
            ("TotalHeatingConsumed", json!(3.0)),
            ("TotalHotWaterConsumed", json!(1.0)),
        ]);
        let e = entry(
            "meter_power.cop_total",
            &[
                "TotalHeatingProduced",
                "TotalHotWaterProduced",
                "TotalHeatingConsumed",
                "TotalHotWaterConsumed",
            ],
        );
        assert_eq!(compute_metric(&e, &report, 0, 1.0), 3.0);
    }

    #[test]
    fn measure_power_reads_the_target_hour() {
        let report = data(&[
            ("Heating", json!([0.0, 0.1, 0.5, 0.0])),
            ("Cooling", json!([0.0, 0.0, 0.25, 0.0])),
        ]);
        let e = entry("measure_power", &["Heating", "Cooling"]);
        // Hour 2, scaled x1000, split across 2 linked devices.
        assert_eq!(compute_metric(&e, &report, 2, 2.0), 375.0);
    }

    #[test]
    fn default_metric_sums_and_divides_by_linked_count() {
        let report = data(&[
            ("TotalHeatingConsumed", json!(6.0)),
            ("TotalCoolingConsumed", json!(2.0)),
        ]);
        let e = entry(
            "meter_power.daily",
            &["TotalHeatingConsumed", "TotalCoolingConsumed"],
        );
        assert_eq!(compute_metric(&e, &report, 0, 2.0), 4.0);
    }

    #[test]
    fn linked_count_parses_disclaimer_percentages() {
        assert_eq!(
            linked_device_count(&data(&[(USAGE_DISCLAIMER_TAG, json!("50, 50"))])),
            2.0
        );
        assert_eq!(
            linked_device_count(&data(&[(USAGE_DISCLAIMER_TAG, json!("100"))])),
            1.0
        );
        assert_eq!(linked_device_count(&data(&[])), 1.0);
    }

    #[test]
    fn mode_membership_follows_the_total_suffix() {
        assert_eq!(ReportMode::of("meter_power.total"), ReportMode::Total);
        assert_eq!(ReportMode::of("meter_power.cop_total"), ReportMode::Total);
        assert_eq!(ReportMode::of("meter_power.daily"), ReportMode::Regular);
        assert_eq!(ReportMode::of("measure_power"), ReportMode::Regular);
    }

    #[test]
    fn total_range_starts_at_the_epoch() {
        let now = NaiveDate::from_ymd_opt(2026, 8, 7)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let (from, to) = date_range(ReportMode::Total, now);
        assert_eq!(from, NaiveDateTime::UNIX_EPOCH);
        assert_eq!(to, now);
    }

    #[test]
    fn regular_range_runs_from_yesterday_to_now_minus_offset() {
        let now = NaiveDate::from_ymd_opt(2026, 8, 7)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let (from, to) = date_range(ReportMode::Regular, now);
        assert_eq!(
            from,
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(to, now - TimeDelta::hours(1));
    }

    #[test]
    fn next_fire_is_clock_aligned() {
        let now = "2026-08-07T14:42:31Z".parse::<DateTime<Utc>>().unwrap();

        let regular = next_fire(ReportMode::Regular, now);
        assert_eq!(regular.to_rfc3339(), "2026-08-07T15:10:00+00:00");

        let total = next_fire(ReportMode::Total, now);
        assert_eq!(total.to_rfc3339(), "2026-08-08T01:10:00+00:00");
    }
}
