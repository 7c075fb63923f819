//! Energy report and fault history handlers.

use chrono::{TimeDelta, Timelike, Utc};
use serde::Serialize;
use tabled::Tabled;

use thermolink_api::models::{EnergyReportRequest, ErrorLogRequest};
use thermolink_core::ReportMode;
use thermolink_core::capability::report_mapping;
use thermolink_core::report::{compute_metric, date_range, linked_device_count};

use crate::cli::{EnergyArgs, ErrorsArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct MetricInfo {
    capability: String,
    value: f64,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Capability")]
    capability: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn report(args: &EnergyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;
    ctx.bridge.sync_from_list().await?;
    let device = ctx.bridge.device(args.device)?;

    let mode = if args.total {
        ReportMode::Total
    } else {
        ReportMode::Regular
    };
    let (from, to) = date_range(mode, Utc::now().naive_utc());

    let data = ctx
        .bridge
        .session()
        .energy_report(&EnergyReportRequest {
            device_id: args.device,
            from_date: from,
            to_date: to,
            use_currency: false,
        })
        .await?;

    let linked = linked_device_count(&data);
    let target_hour = usize::try_from(to.hour()).unwrap_or(0);

    let infos: Vec<MetricInfo> = report_mapping(device.class())
        .iter()
        .filter(|entry| ReportMode::of(entry.capability) == mode)
        .map(|entry| MetricInfo {
            capability: entry.capability.to_owned(),
            value: compute_metric(entry, &data, target_hour, linked),
        })
        .collect();

    println!(
        "{}",
        output::render_list(global.output, &infos, |info| MetricRow {
            capability: info.capability.clone(),
            value: format!("{:.3}", info.value),
        })
    );
    ctx.bridge.shutdown();
    Ok(())
}

#[derive(Serialize)]
struct FaultInfo {
    device: i64,
    start: String,
    end: String,
    message: String,
}

#[derive(Tabled)]
struct FaultRow {
    #[tabled(rename = "Device")]
    device: i64,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn errors(args: &ErrorsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;

    let now = Utc::now().naive_utc();
    let entries = ctx
        .bridge
        .session()
        .error_log(&ErrorLogRequest {
            device_ids: vec![args.device],
            from_date: Some(now - TimeDelta::days(args.days)),
            to_date: Some(now),
        })
        .await?;

    let infos: Vec<FaultInfo> = entries
        .iter()
        .map(|entry| FaultInfo {
            device: entry.device_id,
            start: entry.start_date.map_or_else(String::new, |d| d.to_string()),
            end: entry.end_date.map_or_else(String::new, |d| d.to_string()),
            message: entry.error_message.clone().unwrap_or_default(),
        })
        .collect();

    println!(
        "{}",
        output::render_list(global.output, &infos, |info| FaultRow {
            device: info.device,
            start: info.start.clone(),
            end: info.end.clone(),
            message: info.message.clone(),
        })
    );
    Ok(())
}
