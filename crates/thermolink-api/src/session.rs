// Session lifecycle manager.
//
// Owns the bearer token and wraps every outbound call: token injection,
// login-on-demand before expiry, a single-flight re-login on 401, and a
// cooldown hold on the device-list endpoint after 429. Nothing here is
// fatal -- every failure surfaces as an `Error` the caller can retry on
// its next cycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::models::LoginResponse;
use crate::store::{CredentialStore, StoredToken};
use crate::transport::TransportConfig;

/// Endpoint paths, relative to the service base URL.
pub mod paths {
    pub const LOGIN: &str = "Login/ClientLogin";
    pub const LIST_DEVICES: &str = "User/ListDevices";
    pub const DEVICE_GET: &str = "Device/Get";
    pub const DEVICE_SET_PREFIX: &str = "Device/Set";
    pub const ENERGY_REPORT: &str = "EnergyCost/Report";
    pub const ERROR_LOG: &str = "Report/GetUnitErrorLog2";
    pub const FROST_GET: &str = "FrostProtection/GetSettings";
    pub const FROST_UPDATE: &str = "FrostProtection/Update";
    pub const HOLIDAY_GET: &str = "HolidayMode/GetSettings";
    pub const HOLIDAY_UPDATE: &str = "HolidayMode/Update";
}

/// Header carrying the session token.
const CONTEXT_KEY_HEADER: &str = "X-MitsContextKey";

/// Client version reported at login.
const APP_VERSION: &str = "1.34.12.0";

/// After a 401-triggered re-login attempt, further re-logins are refused
/// for this long regardless of outcome (single-flight circuit breaker).
const RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// After a 429, the device-list endpoint is held for this long.
const LIST_HOLD: Duration = Duration::from_secs(2 * 60 * 60);

struct SessionState {
    token: Option<SecretString>,
    token_expiry: Option<DateTime<Utc>>,
    retry_disabled_until: Option<Instant>,
    list_hold_until: Option<Instant>,
}

/// Authenticated HTTP gateway to the cloud service.
///
/// Construct once, share via `Arc`. Credentials and the token persist
/// through the injected [`CredentialStore`]; the session is created from
/// whatever that store already holds and updated on every login.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<dyn CredentialStore>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        base_url: Url,
        store: Arc<dyn CredentialStore>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let stored = store.token();
        let state = SessionState {
            token: stored
                .as_ref()
                .map(|t| SecretString::from(t.context_key.clone())),
            token_expiry: stored.map(|t| t.expiry),
            retry_disabled_until: None,
            list_hold_until: None,
        };
        Ok(Self {
            http,
            base_url,
            store,
            state: Mutex::new(state),
        })
    }

    /// The current token expiry, if a session exists.
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.lock().expect("session lock poisoned").token_expiry
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Exchange credentials for a session token.
    ///
    /// Returns `Ok(false)` without any HTTP call when the username is
    /// empty, and `Ok(false)` without mutating session state when the
    /// service rejects the credentials. On success the credentials and
    /// token are persisted through the store.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<bool, Error> {
        if username.is_empty() {
            debug!("login skipped: no username configured");
            return Ok(false);
        }

        let url = self.url(paths::LOGIN)?;
        debug!(%url, "logging in");

        let body = serde_json::json!({
            "Email": username,
            "Password": password.expose_secret(),
            "Language": 0,
            "AppVersion": APP_VERSION,
            "Persist": true,
            "CaptchaResponse": Value::Null,
        });

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;
        let login: LoginResponse = self.finish(resp).await?;

        match login.login_data {
            Some(data) if login.error_id.is_none() => {
                let expiry = data.expiry.and_utc();
                {
                    let mut state = self.state.lock().expect("session lock poisoned");
                    state.token = Some(SecretString::from(data.context_key.clone()));
                    state.token_expiry = Some(expiry);
                }
                self.store.save_credentials(username, password);
                self.store.save_token(&StoredToken {
                    context_key: data.context_key,
                    expiry,
                });
                info!(%expiry, "login successful");
                Ok(true)
            }
            _ => {
                debug!(error_id = ?login.error_id, "login rejected by the service");
                Ok(false)
            }
        }
    }

    /// Log in with the credentials held by the store.
    ///
    /// `Ok(false)` when no credentials are stored or they were rejected.
    pub async fn login_stored(&self) -> Result<bool, Error> {
        let Some(username) = self.store.username() else {
            return Ok(false);
        };
        let Some(password) = self.store.password() else {
            return Ok(false);
        };
        self.login(&username, &password).await
    }

    /// Schedule a background re-login one day before the token expires.
    ///
    /// Far-future expiries are waited out in capped slices. A refresh
    /// failure is logged and abandoned -- the next user-triggered request
    /// still logs in on demand.
    pub fn plan_refresh_login(self: Arc<Self>, cancel: &CancellationToken) {
        let session = self;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let Some(expiry) = session.token_expiry() else { break };
                let target = expiry - TimeDelta::days(1);
                let wait = target - Utc::now();
                if wait > TimeDelta::zero() {
                    debug!(%target, "token refresh scheduled");
                    if !sleep_long(wait, &cancel).await {
                        break;
                    }
                }
                if cancel.is_cancelled() {
                    break;
                }
                match session.login_stored().await {
                    Ok(true) => info!("session token refreshed"),
                    Ok(false) => {
                        warn!("scheduled token refresh rejected");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "scheduled token refresh failed");
                        break;
                    }
                }
            }
        });
    }

    // ── Request plumbing ─────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        self.execute(Method::GET, path, query, None).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let body = serde_json::to_value(body)?;
        self.execute(Method::POST, path, &[], Some(body)).await
    }

    /// Send one request through the full interceptor chain.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, Error> {
        if path == paths::LIST_DEVICES {
            self.check_list_hold()?;
        }
        if path != paths::LOGIN {
            self.ensure_token().await?;
        }

        let resp = self.send_raw(&method, path, query, body.as_ref()).await?;

        if resp.status() == StatusCode::UNAUTHORIZED && path != paths::LOGIN {
            // Single-flight recovery: the first 401 in a cooldown window
            // re-logs-in and replays once; concurrent failures propagate.
            if self.claim_auth_retry() {
                warn!(path, "unauthorized, attempting one fresh login");
                if self.login_stored().await.unwrap_or(false) {
                    let resp = self.send_raw(&method, path, query, body.as_ref()).await?;
                    return self.finish(resp).await;
                }
            }
            return Err(Error::Authentication {
                message: "unauthorized (HTTP 401)".into(),
            });
        }

        self.finish(resp).await
    }

    async fn send_raw(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        let url = self.url(path)?;
        debug!("{method} {url}");

        let mut req = self.http.request(method.clone(), url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(token) = self.current_token() {
            req = req.header(CONTEXT_KEY_HEADER, token.expose_secret());
        }

        req.send().await.map_err(Error::Transport)
    }

    /// Turn a response into a typed value, applying the status-keyed
    /// interceptors that need no replay: 429 arms the list hold, any
    /// non-null `AttributeErrors` becomes a validation failure.
    async fn finish<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let hold = self.hold_list();
            warn!("rate limited, holding device list for {}s", hold.as_secs());
            return Err(Error::RateLimited { hold });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "unauthorized (HTTP 401)".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

        if let Some(errors) = attribute_errors(&value) {
            return Err(Error::Validation { errors });
        }

        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    // ── State helpers ────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn current_token(&self) -> Option<SecretString> {
        self.state.lock().expect("session lock poisoned").token.clone()
    }

    /// Log in first when there is no token or it is past expiry.
    async fn ensure_token(&self) -> Result<(), Error> {
        let valid = {
            let state = self.state.lock().expect("session lock poisoned");
            state.token.is_some() && state.token_expiry.is_some_and(|e| Utc::now() < e)
        };
        if valid {
            return Ok(());
        }

        debug!("no valid session token, logging in before request");
        if self.login_stored().await? {
            return Ok(());
        }
        if self.store.username().is_none() {
            return Err(Error::MissingCredentials);
        }
        Err(Error::Authentication {
            message: "stored credentials were rejected".into(),
        })
    }

    /// Claim the single re-login slot for this cooldown window.
    fn claim_auth_retry(&self) -> bool {
        let mut state = self.state.lock().expect("session lock poisoned");
        let now = Instant::now();
        if state.retry_disabled_until.is_some_and(|until| now < until) {
            return false;
        }
        state.retry_disabled_until = Some(now + RETRY_COOLDOWN);
        true
    }

    fn hold_list(&self) -> Duration {
        let mut state = self.state.lock().expect("session lock poisoned");
        state.list_hold_until = Some(Instant::now() + LIST_HOLD);
        LIST_HOLD
    }

    fn check_list_hold(&self) -> Result<(), Error> {
        let state = self.state.lock().expect("session lock poisoned");
        if let Some(until) = state.list_hold_until {
            let now = Instant::now();
            if now < until {
                return Err(Error::ListOnHold {
                    remaining: until - now,
                });
            }
        }
        Ok(())
    }
}

/// Parse a non-null `AttributeErrors` map out of a response value.
fn attribute_errors(value: &Value) -> Option<std::collections::BTreeMap<String, Vec<String>>> {
    let errors = value.get("AttributeErrors")?;
    if errors.is_null() {
        return None;
    }
    serde_json::from_value(errors.clone())
        .ok()
        .or_else(|| Some(std::collections::BTreeMap::from([(String::from("request"), vec![errors.to_string()])])))
}

/// One timer can only represent so much; longer waits are chained.
fn max_timer_slice() -> TimeDelta {
    TimeDelta::milliseconds(i64::from(i32::MAX))
}

/// Sleep for an arbitrary calendar duration, in capped slices.
/// Returns `false` if cancelled before the full duration elapsed.
async fn sleep_long(total: TimeDelta, cancel: &CancellationToken) -> bool {
    let mut remaining = total;
    while remaining > TimeDelta::zero() {
        let slice = remaining.min(max_timer_slice());
        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(slice.to_std().unwrap_or_default()) => {}
        }
        remaining -= slice;
    }
    true
}
