//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "thermolink",
    version,
    about = "Bridge a MELCloud-style HVAC cloud account to your terminal"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Profile name from the config file.
    #[arg(short, long, global = true, env = "THERMOLINK_PROFILE")]
    pub profile: Option<String>,

    /// Config file override.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log in and cache a session token.
    Login(LoginArgs),

    /// List devices across all buildings.
    Devices,

    /// Show a device's merged capability state.
    State(DeviceArgs),

    /// Write one capability and push it.
    Set(SetArgs),

    /// Fetch energy metrics for a device.
    Energy(EnergyArgs),

    /// Fetch the fault history for a device.
    Errors(ErrorsArgs),

    /// Building-level frost protection settings.
    Frost(FrostArgs),

    /// Building-level holiday mode settings.
    Holiday(HolidayArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct LoginArgs {
    /// Account email. Defaults to the profile's email.
    #[arg(long)]
    pub email: Option<String>,
}

#[derive(Args)]
pub struct DeviceArgs {
    /// Device ID (see `thermolink devices`).
    pub device: i64,
}

#[derive(Args)]
pub struct SetArgs {
    /// Device ID.
    pub device: i64,

    /// Capability name (e.g. `target_temperature`).
    pub capability: String,

    /// Value: `true`/`false`, a number, or a string.
    pub value: String,
}

#[derive(Args)]
pub struct EnergyArgs {
    /// Device ID.
    pub device: i64,

    /// Lifetime-to-date metrics instead of the regular horizon.
    #[arg(long)]
    pub total: bool,
}

#[derive(Args)]
pub struct ErrorsArgs {
    /// Device ID.
    pub device: i64,

    /// How many days of history to fetch.
    #[arg(long, default_value_t = 7)]
    pub days: i64,
}

#[derive(Args)]
pub struct FrostArgs {
    /// Building ID.
    pub building: i64,

    #[command(subcommand)]
    pub action: FrostAction,
}

#[derive(Subcommand)]
pub enum FrostAction {
    /// Show the current settings.
    Get,
    /// Update the settings.
    Set {
        #[arg(long)]
        enabled: bool,
        #[arg(long)]
        min: f64,
        #[arg(long)]
        max: f64,
    },
}

#[derive(Args)]
pub struct HolidayArgs {
    /// Building ID.
    pub building: i64,

    #[command(subcommand)]
    pub action: HolidayAction,
}

#[derive(Subcommand)]
pub enum HolidayAction {
    /// Show the current settings.
    Get,
    /// Update the settings.
    Set {
        #[arg(long)]
        enabled: bool,
        /// Start, e.g. `2026-08-10T00:00:00`.
        #[arg(long)]
        start: Option<chrono::NaiveDateTime>,
        /// End, e.g. `2026-08-20T00:00:00`.
        #[arg(long)]
        end: Option<chrono::NaiveDateTime>,
    },
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
