// Credential persistence seam.
//
// The session manager never touches disk itself; whoever constructs it
// injects a store. The config crate provides a file-backed implementation;
// tests use the in-memory one.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// A persisted session token with its expiry.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub context_key: String,
    pub expiry: DateTime<Utc>,
}

/// Persistence seam for credentials and the session token.
///
/// Implementations must be cheap: these are called on every login and at
/// session construction, never on the per-request hot path.
pub trait CredentialStore: Send + Sync {
    fn username(&self) -> Option<String>;
    fn password(&self) -> Option<SecretString>;
    fn save_credentials(&self, username: &str, password: &SecretString);
    fn token(&self) -> Option<StoredToken>;
    fn save_token(&self, token: &StoredToken);
}

// ── In-memory implementation ────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    username: Option<String>,
    password: Option<SecretString>,
    token: Option<StoredToken>,
}

/// An in-memory `CredentialStore`. Nothing survives the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: std::sync::Mutex<MemoryInner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded with credentials, as if a previous run had saved them.
    pub fn with_credentials(username: &str, password: &str) -> Self {
        let store = Self::default();
        store.save_credentials(username, &SecretString::from(password.to_owned()));
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
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
    }
}
