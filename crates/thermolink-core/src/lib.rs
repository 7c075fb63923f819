//! Domain layer of the thermolink bridge.
//!
//! Built around four pieces:
//! - [`sync::Synchronizer`] -- per-device diff of pending writes plus the
//!   merged remote state, with bitmask-flagged payload building and
//!   mode-dependent merge precedence;
//! - [`scheduler::Timers`] -- purpose-keyed timers over calendar-aware
//!   durations, with capped-slice chaining for far-future waits;
//! - [`report::EnergyReportEngine`] -- clock-aligned per-mode energy
//!   metrics;
//! - [`bridge::Bridge`] -- lifecycle: login, device registry, periodic
//!   bulk pull, and token refresh planning.

pub mod bridge;
pub mod capability;
pub mod device;
pub mod error;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod sync;

pub use bridge::{Bridge, BridgeConfig};
pub use capability::{CapabilityValue, DeviceClass, OperationMode, ZoneMode};
pub use device::{Device, DeviceTuning};
pub use error::CoreError;
pub use registry::DeviceRegistry;
pub use report::{EnergyReportEngine, ReportMode};
pub use sync::{SyncMode, Synchronizer};
