//! Shared configuration for the thermolink CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), a
//! file-backed token cache, and translation to
//! `thermolink_core::BridgeConfig`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use thermolink_api::{CredentialStore, StoredToken};
use thermolink_core::{BridgeConfig, DeviceTuning};

const SERVICE_NAME: &str = "thermolink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Named cloud-account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// One cloud account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Account email (the service's login name).
    pub email: String,

    /// Plaintext password. Prefer `password_env` or the keyring.
    pub password: Option<String>,

    /// Environment variable to read the password from.
    pub password_env: Option<String>,

    /// Look the password up in the OS keyring (keyed by email).
    #[serde(default)]
    pub use_keyring: bool,

    /// Service base URL override (tests, regional endpoints).
    pub base_url: Option<String>,

    /// Bulk-list poll cadence in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    300
}
fn default_timeout() -> u64 {
    30
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", SERVICE_NAME)
}

/// Path of the TOML config file.
pub fn config_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("thermolink.toml"))
}

/// Path of the per-profile session token cache.
pub fn token_cache_path(profile: &str) -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join(format!("{profile}.session.json")))
        .unwrap_or_else(|| PathBuf::from(format!("{profile}.session.json")))
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the config from a specific file plus `THERMOLINK_` env overrides.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("THERMOLINK_").split("__"))
        .extract()?;
    Ok(config)
}

/// Load the config from the default location; missing file means defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Resolution ──────────────────────────────────────────────────────

/// A profile resolved into everything the CLI needs to run.
#[derive(Debug)]
pub struct ResolvedProfile {
    pub name: String,
    pub email: String,
    pub password: Option<SecretString>,
    pub use_keyring: bool,
    pub bridge: BridgeConfig,
}

/// Pick and resolve a profile: explicit name, else the configured
/// default, else `"default"`.
pub fn resolve_profile(config: &Config, name: Option<&str>) -> Result<ResolvedProfile, ConfigError> {
    let name = name
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".to_owned());

    let profile = config.profiles.get(&name).ok_or_else(|| {
        let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        ConfigError::ProfileNotFound {
            name: name.clone(),
            available: available.join(", "),
        }
    })?;

    let mut bridge = BridgeConfig::default();
    if let Some(ref base_url) = profile.base_url {
        bridge.base_url = base_url.parse().map_err(|e| ConfigError::Validation {
            field: "base_url".to_owned(),
            reason: format!("{e}"),
        })?;
    }
    bridge.poll_interval = chrono::TimeDelta::seconds(
        i64::try_from(profile.poll_interval_secs).unwrap_or(i64::MAX),
    );
    bridge.timeout = Duration::from_secs(profile.timeout_secs);
    bridge.tuning = DeviceTuning::default();

    Ok(ResolvedProfile {
        name,
        email: profile.email.clone(),
        password: resolve_password(profile),
        use_keyring: profile.use_keyring,
        bridge,
    })
}

/// Password precedence: profile env var, keyring, plaintext.
fn resolve_password(profile: &Profile) -> Option<SecretString> {
    if let Some(ref var) = profile.password_env {
        if let Ok(value) = std::env::var(var) {
            return Some(SecretString::from(value));
        }
    }
    if profile.use_keyring {
        match keyring::Entry::new(SERVICE_NAME, &profile.email).and_then(|e| e.get_password()) {
            Ok(password) => return Some(SecretString::from(password)),
            Err(e) => warn!(error = %e, "keyring lookup failed"),
        }
    }
    profile
        .password
        .as_ref()
        .map(|p| SecretString::from(p.clone()))
}

/// Store a password in the OS keyring, keyed by account email.
pub fn save_keyring_password(email: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring::Entry::new(SERVICE_NAME, email)?.set_password(password.expose_secret())?;
    Ok(())
}

// ── File-backed credential store ────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct TokenCacheFile {
    context_key: String,
    expiry: DateTime<Utc>,
}

struct StoreState {
    username: Option<String>,
    password: Option<SecretString>,
    token: Option<StoredToken>,
}

/// `CredentialStore` backed by a JSON token cache on disk.
///
/// Credentials live in memory only (they come from the resolved profile);
/// the session token and its expiry are persisted so a restart does not
/// burn a fresh login.
pub struct FileCredentialStore {
    path: PathBuf,
    inner: Mutex<StoreState>,
}

impl FileCredentialStore {
    pub fn open(path: PathBuf, username: Option<String>, password: Option<SecretString>) -> Self {
        let token = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<TokenCacheFile>(&raw).ok())
            .map(|cache| StoredToken {
                context_key: cache.context_key,
                expiry: cache.expiry,
            });
        Self {
            path,
            inner: Mutex::new(StoreState {
                username,
                password,
                token,
            }),
        }
    }

    /// Open the token cache for a resolved profile.
    pub fn for_profile(profile: &ResolvedProfile) -> Self {
        Self::open(
            token_cache_path(&profile.name),
            Some(profile.email.clone()),
            profile.password.clone(),
        )
    }
}

impl CredentialStore for FileCredentialStore {
    fn username(&self) -> Option<String> {
        self.inner.lock().expect("store lock poisoned").username.clone()
    }

    fn password(&self) -> Option<SecretString> {
        self.inner.lock().expect("store lock poisoned").password.clone()
    }

    fn save_credentials(&self, username: &str, password: &SecretString) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.username = Some(username.to_owned());
        inner.password = Some(password.clone());
    }

    fn token(&self) -> Option<StoredToken> {
        self.inner.lock().expect("store lock poisoned").token.clone()
    }

    fn save_token(&self, token: &StoredToken) {
        self.inner.lock().expect("store lock poisoned").token = Some(token.clone());

        let cache = TokenCacheFile {
            context_key: token.context_key.clone(),
            expiry: token.expiry,
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&cache) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), error = %e, "could not persist session token");
                }
            }
            Err(e) => warn!(error = %e, "could not encode session token"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_profiles_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            default_profile = "home"

            [profiles.home]
            email = "me@example.com"
            password = "plain"
            "#,
        );

        let config = load_config_from(&path).unwrap();
        let resolved = resolve_profile(&config, None).unwrap();

        assert_eq!(resolved.name, "home");
        assert_eq!(resolved.email, "me@example.com");
        assert_eq!(resolved.bridge.poll_interval, chrono::TimeDelta::seconds(300));
        assert_eq!(
            resolved.password.unwrap().expose_secret(),
            "plain"
        );
    }

    #[test]
    fn unknown_profile_lists_available_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [profiles.home]
            email = "me@example.com"
            "#,
        );

        let config = load_config_from(&path).unwrap();
        let err = resolve_profile(&config, Some("office")).unwrap_err();
        match err {
            ConfigError::ProfileNotFound { name, available } => {
                assert_eq!(name, "office");
                assert_eq!(available, "home");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn base_url_override_reaches_the_bridge_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [profiles.home]
            email = "me@example.com"
            base_url = "http://127.0.0.1:9999/"
            poll_interval_secs = 60
            "#,
        );

        let config = load_config_from(&path).unwrap();
        let resolved = resolve_profile(&config, Some("home")).unwrap();
        assert_eq!(resolved.bridge.base_url.as_str(), "http://127.0.0.1:9999/");
        assert_eq!(resolved.bridge.poll_interval, chrono::TimeDelta::seconds(60));
    }

    #[test]
    fn token_cache_round_trips_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileCredentialStore::open(path.clone(), Some("me@example.com".into()), None);
        assert!(store.token().is_none());

        store.save_token(&StoredToken {
            context_key: "ctx".to_owned(),
            expiry: Utc::now() + chrono::TimeDelta::days(5),
        });

        // A fresh store picks the persisted token back up.
        let reopened = FileCredentialStore::open(path, None, None);
        assert_eq!(reopened.token().unwrap().context_key, "ctx");
    }
}
