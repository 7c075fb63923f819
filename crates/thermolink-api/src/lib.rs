//! Async client for a MELCloud-style HVAC cloud service.
//!
//! The center of gravity is [`SessionManager`]: it owns the bearer token
//! and wraps every outbound call with login-on-demand, a single-flight
//! re-login on 401, and a cooldown hold on the device-list endpoint after
//! a 429. Endpoint methods live in inherent impls split across modules;
//! wire types are in [`models`].

pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod transport;

mod devices;
mod reports;
mod settings;

pub use error::Error;
pub use session::{SessionManager, paths};
pub use store::{CredentialStore, MemoryCredentialStore, StoredToken};
pub use transport::TransportConfig;
