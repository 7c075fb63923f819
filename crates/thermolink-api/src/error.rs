use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `thermolink-api` crate.
///
/// Covers every failure mode at the wire boundary: authentication,
/// rate limiting, validation rejections, and transport.
/// `thermolink-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The service rejected the request or the session (HTTP 401, or a
    /// re-login that did not recover it).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// No stored credentials to log in with.
    #[error("No credentials configured")]
    MissingCredentials,

    // ── Rate limiting ───────────────────────────────────────────────
    /// The service answered HTTP 429. The device-list endpoint is now
    /// on hold for the returned duration.
    #[error("Rate limited -- device list on hold for {}s", hold.as_secs())]
    RateLimited { hold: Duration },

    /// A device-list call was refused locally because a previous 429
    /// put the endpoint on hold.
    #[error("Device list on hold for another {}s after rate limiting", remaining.as_secs())]
    ListOnHold { remaining: Duration },

    // ── Validation ──────────────────────────────────────────────────
    /// The service accepted the request but rejected one or more fields
    /// (`AttributeErrors` was non-null in the response).
    #[error("Validation failed: {}", format_attribute_errors(errors))]
    Validation {
        errors: BTreeMap<String, Vec<String>>,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request body could not be encoded as JSON.
    #[error("JSON encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Service ─────────────────────────────────────────────────────
    /// Any other non-success HTTP status.
    #[error("Service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the session has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on
    /// the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::ListOnHold { .. } => true,
            _ => false,
        }
    }
}

fn format_attribute_errors(errors: &BTreeMap<String, Vec<String>>) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}
