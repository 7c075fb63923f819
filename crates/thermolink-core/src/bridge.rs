// ── Bridge ──
//
// Full lifecycle management for one cloud account. Owns the session and
// the device registry, materializes devices from the bulk list, runs the
// periodic pull, and plans the token refresh. The teacher of record for
// the downstream surface: login, listing, capability reads/writes, and
// building-level settings all route through here.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use thermolink_api::{CredentialStore, SessionManager, TransportConfig};

use crate::capability::DeviceClass;
use crate::device::{Device, DeviceTuning};
use crate::error::CoreError;
use crate::registry::DeviceRegistry;
use crate::scheduler::Timers;

const POLL_TIMER: &str = "list-poll";

/// Configuration for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Service base URL (fixed in production, overridden in tests).
    pub base_url: Url,
    /// Cadence of the periodic bulk-list pull.
    pub poll_interval: TimeDelta,
    /// Per-device debounce/settle timings.
    pub tuning: DeviceTuning,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.melcloud.com/Mitsubishi.Wifi.Client/"
                .parse()
                .expect("valid default URL"),
            poll_interval: TimeDelta::minutes(5),
            tuning: DeviceTuning::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The main entry point for consumers. Cheaply cloneable.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    session: Arc<SessionManager>,
    registry: DeviceRegistry,
    config: BridgeConfig,
    cancel: CancellationToken,
    timers: Timers,
}

impl Bridge {
    pub fn new(config: BridgeConfig, store: Arc<dyn CredentialStore>) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        };
        let session = Arc::new(SessionManager::new(
            config.base_url.clone(),
            store,
            &transport,
        )?);
        Ok(Self {
            inner: Arc::new(BridgeInner {
                session,
                registry: DeviceRegistry::new(),
                config,
                cancel: CancellationToken::new(),
                timers: Timers::new(),
            }),
        })
    }

    /// The underlying session, for flows that talk to the service
    /// directly (building settings, fault history).
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    /// Log in interactively and, on success, plan the background refresh.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<bool, CoreError> {
        let ok = self.inner.session.login(username, password).await?;
        if ok {
            Arc::clone(&self.inner.session).plan_refresh_login(&self.inner.cancel);
        }
        Ok(ok)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Pull the device tree, materialize devices, and start background
    /// work: the periodic list pull and the planned token refresh.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.sync_from_list().await?;
        Arc::clone(&self.inner.session).plan_refresh_login(&self.inner.cancel);

        let bridge = self.clone();
        self.inner.timers.set_interval(
            POLL_TIMER,
            self.inner.config.poll_interval,
            move || {
                let bridge = bridge.clone();
                async move {
                    // One failed cycle only warns; the next tick retries.
                    if let Err(e) = bridge.sync_from_list().await {
                        warn!(error = %e, "periodic device-list pull failed");
                    }
                }
            },
        );

        info!(devices = self.inner.registry.len(), "bridge started");
        Ok(())
    }

    /// Cancel every outstanding timer. No timer fires after shutdown.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.timers.clear_all();
        for device in self.inner.registry.all() {
            device.remove();
        }
        debug!("bridge stopped");
    }

    // ── Bulk pull ────────────────────────────────────────────────────

    /// Fetch the device tree and reconcile the registry: merge list-only
    /// fields into known devices, materialize new ones, drop vanished
    /// ones, and re-evaluate energy report schedules on setting changes.
    pub async fn sync_from_list(&self) -> Result<(), CoreError> {
        let buildings = self.inner.session.list_devices().await?;

        let mut seen: Vec<i64> = Vec::new();
        for building in &buildings {
            for listed in building.all_devices() {
                seen.push(listed.device_id);

                if let Some(device) = self.inner.registry.get(listed.device_id) {
                    device.apply_list_state(&listed.device).await;
                    device.sync_energy_settings(&listed.device).await;
                    continue;
                }

                let Some(class) = DeviceClass::from_type_code(listed.device_type) else {
                    warn!(
                        device = listed.device_id,
                        code = listed.device_type,
                        "unsupported device class, skipping"
                    );
                    continue;
                };
                let device = Device::new(
                    listed,
                    class,
                    Arc::clone(&self.inner.session),
                    self.inner.config.tuning.clone(),
                );
                info!(device = device.id(), name = %device.name(), "registered device");
                device.start_reports();
                self.inner.registry.insert(device);
            }
        }

        for id in self.inner.registry.ids() {
            if !seen.contains(&id) {
                if let Some(device) = self.inner.registry.remove(id) {
                    info!(device = id, "device left the tree, removed");
                    device.remove();
                }
            }
        }

        Ok(())
    }

    // ── Registry access ──────────────────────────────────────────────

    pub fn device(&self, id: i64) -> Result<Device, CoreError> {
        self.inner
            .registry
            .get(id)
            .ok_or(CoreError::DeviceNotFound { id })
    }

    pub fn devices(&self) -> Vec<Device> {
        self.inner.registry.all()
    }
}
