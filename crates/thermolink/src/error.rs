//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use thermolink_config::ConfigError;
use thermolink_core::CoreError;

/// Exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const RATE_LIMITED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(thermolink::auth_failed),
        help(
            "Check the account email and password.\n\
             Run: thermolink login"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(thermolink::no_credentials),
        help(
            "Add a password source to the profile (password_env, use_keyring\n\
             or password), or run: thermolink login"
        )
    )]
    NoCredentials { profile: String },

    // ── Rate limiting ────────────────────────────────────────────────
    #[error("Rate limited -- the device list is on cooldown")]
    #[diagnostic(
        code(thermolink::rate_limited),
        help("The service throttled us. Device listing resumes automatically later.")
    )]
    RateLimited,

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device {id} not found")]
    #[diagnostic(
        code(thermolink::device_not_found),
        help("Run: thermolink devices to see what's registered")
    )]
    DeviceNotFound { id: i64 },

    #[error("Unknown capability '{capability}'")]
    #[diagnostic(
        code(thermolink::unknown_capability),
        help("Run: thermolink state <device> to see its capabilities")
    )]
    UnknownCapability { capability: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("The service rejected the request: {message}")]
    #[diagnostic(code(thermolink::validation))]
    Validation { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Service error: {message}")]
    #[diagnostic(code(thermolink::api_error))]
    Api { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(thermolink::config),
        help("The config file lives at the path shown by: thermolink --help")
    )]
    Config { message: String },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::DeviceNotFound { .. } => exit_code::NOT_FOUND,
            Self::RateLimited => exit_code::RATE_LIMITED,
            Self::UnknownCapability { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::Api { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::MissingCredentials => CliError::NoCredentials {
                profile: "current".into(),
            },
            CoreError::RateLimited => CliError::RateLimited,
            CoreError::DeviceNotFound { id } => CliError::DeviceNotFound { id },
            CoreError::UnknownCapability { capability } => {
                CliError::UnknownCapability { capability }
            }
            CoreError::ValidationFailed { message } => CliError::Validation { message },
            CoreError::Api { message, status: _ } => CliError::Api { message },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Api { message },
        }
    }
}

impl From<thermolink_api::Error> for CliError {
    fn from(err: thermolink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
