//! Device command handlers: list, state, set.

use serde::Serialize;
use tabled::Tabled;

use thermolink_core::{CapabilityValue, Device};

use crate::cli::{DeviceArgs, GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct DeviceInfo {
    id: i64,
    building: i64,
    name: String,
    class: String,
    power: Option<bool>,
    pending: bool,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Building")]
    building: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Pending")]
    pending: String,
}

impl From<&DeviceInfo> for DeviceRow {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            id: info.id,
            building: info.building,
            name: info.name.clone(),
            class: info.class.clone(),
            power: info.power.map_or_else(|| "-".into(), |p| p.to_string()),
            pending: if info.pending { "yes".into() } else { "".into() },
        }
    }
}

#[derive(Serialize)]
struct CapabilityInfo {
    capability: String,
    value: String,
}

#[derive(Tabled)]
struct CapabilityRow {
    #[tabled(rename = "Capability")]
    capability: String,
    #[tabled(rename = "Value")]
    value: String,
}

async fn device_info(device: &Device) -> DeviceInfo {
    DeviceInfo {
        id: device.id(),
        building: device.building_id(),
        name: device.name().to_owned(),
        class: format!("{:?}", device.class()),
        power: device
            .capability_value("onoff")
            .await
            .and_then(|v| v.as_bool()),
        pending: device.has_pending().await,
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;
    ctx.bridge.sync_from_list().await?;

    let mut infos = Vec::new();
    for device in ctx.bridge.devices() {
        infos.push(device_info(&device).await);
    }

    println!("{}", output::render_list(global.output, &infos, |info| DeviceRow::from(info)));
    ctx.bridge.shutdown();
    Ok(())
}

pub async fn state(args: &DeviceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;
    ctx.bridge.sync_from_list().await?;

    let device = ctx.bridge.device(args.device)?;
    device.refresh().await?;

    let infos: Vec<CapabilityInfo> = device
        .capability_values()
        .await
        .into_iter()
        .map(|(capability, value)| CapabilityInfo {
            capability,
            value: value.to_string(),
        })
        .collect();

    println!(
        "{}",
        output::render_list(global.output, &infos, |info| CapabilityRow {
            capability: info.capability.clone(),
            value: info.value.clone(),
        })
    );
    ctx.bridge.shutdown();
    Ok(())
}

pub async fn set(args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;
    ctx.bridge.sync_from_list().await?;

    let device = ctx.bridge.device(args.device)?;
    device
        .set_capability(&args.capability, parse_value(&args.value))
        .await?;
    // One-shot flush instead of waiting out the debounce.
    device.push().await?;

    let value = device
        .capability_value(&args.capability)
        .await
        .map_or_else(|| "-".to_owned(), |v| v.to_string());
    println!("{} {} = {value}", output::ok_marker(), args.capability);

    ctx.bridge.shutdown();
    Ok(())
}

fn parse_value(raw: &str) -> CapabilityValue {
    if raw.eq_ignore_ascii_case("true") {
        CapabilityValue::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        CapabilityValue::Bool(false)
    } else if let Ok(number) = raw.parse::<f64>() {
        CapabilityValue::Number(number)
    } else {
        CapabilityValue::from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_by_shape() {
        assert_eq!(parse_value("true"), CapabilityValue::Bool(true));
        assert_eq!(parse_value("FALSE"), CapabilityValue::Bool(false));
        assert_eq!(parse_value("21.5"), CapabilityValue::Number(21.5));
        assert_eq!(parse_value("cool"), CapabilityValue::from("cool"));
    }
}
