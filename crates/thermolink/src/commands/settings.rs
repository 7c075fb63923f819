//! Building-level settings: frost protection and holiday mode.

use thermolink_api::models::{FrostProtectionUpdate, HolidayModeUpdate};

use crate::cli::{FrostAction, FrostArgs, GlobalOpts, HolidayAction, HolidayArgs};
use crate::error::CliError;
use crate::output;

pub async fn frost(args: &FrostArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;

    match &args.action {
        FrostAction::Get => {
            let settings = ctx.bridge.session().frost_protection(args.building).await?;
            match global.output {
                crate::cli::OutputFormat::Json => println!("{}", output::render_json(&settings)),
                crate::cli::OutputFormat::Table => {
                    println!("Enabled:  {}", settings.enabled);
                    println!("Minimum:  {:.1} C", settings.minimum_temperature);
                    println!("Maximum:  {:.1} C", settings.maximum_temperature);
                }
            }
        }
        FrostAction::Set { enabled, min, max } => {
            ctx.bridge
                .session()
                .update_frost_protection(&FrostProtectionUpdate {
                    enabled: *enabled,
                    minimum_temperature: *min,
                    maximum_temperature: *max,
                    building_ids: vec![args.building],
                })
                .await?;
            println!("{} frost protection updated", output::ok_marker());
        }
    }
    Ok(())
}

pub async fn holiday(args: &HolidayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ctx = super::open(global)?;

    match &args.action {
        HolidayAction::Get => {
            let settings = ctx.bridge.session().holiday_mode(args.building).await?;
            match global.output {
                crate::cli::OutputFormat::Json => println!("{}", output::render_json(&settings)),
                crate::cli::OutputFormat::Table => {
                    println!("Enabled: {}", settings.enabled);
                    println!(
                        "Start:   {}",
                        settings.start_date.map_or_else(|| "-".into(), |d| d.to_string())
                    );
                    println!(
                        "End:     {}",
                        settings.end_date.map_or_else(|| "-".into(), |d| d.to_string())
                    );
                }
            }
        }
        HolidayAction::Set {
            enabled,
            start,
            end,
        } => {
            ctx.bridge
                .session()
                .update_holiday_mode(&HolidayModeUpdate {
                    enabled: *enabled,
                    start_date: *start,
                    end_date: *end,
                    building_ids: vec![args.building],
                })
                .await?;
            println!("{} holiday mode updated", output::ok_marker());
        }
    }
    Ok(())
}
