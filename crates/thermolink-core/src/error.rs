// ── Core error types ──
//
// User-facing errors from thermolink-core. Consumers never see raw HTTP
// status codes or JSON parse failures directly; the `From` impl below
// translates wire-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("No credentials configured")]
    MissingCredentials,

    // ── Rate limiting ────────────────────────────────────────────────
    #[error("Rate limited by the service; the device list is on cooldown")]
    RateLimited,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {id}")]
    DeviceNotFound { id: i64 },

    #[error("Unknown capability: {capability}")]
    UnknownCapability { capability: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Service error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient failures degrade to "try again next cycle".
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<thermolink_api::Error> for CoreError {
    fn from(err: thermolink_api::Error) -> Self {
        match err {
            thermolink_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            thermolink_api::Error::MissingCredentials => CoreError::MissingCredentials,
            thermolink_api::Error::RateLimited { .. } | thermolink_api::Error::ListOnHold { .. } => {
                CoreError::RateLimited
            }
            thermolink_api::Error::Validation { errors } => CoreError::ValidationFailed {
                message: errors
                    .iter()
                    .map(|(field, messages)| format!("{field}: {}", messages.join("; ")))
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            thermolink_api::Error::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            thermolink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            thermolink_api::Error::Serialization(e) => {
                CoreError::Internal(format!("JSON encoding error: {e}"))
            }
            thermolink_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            thermolink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
