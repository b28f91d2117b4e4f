//! Session client: bearer token lifecycle and the authenticated request gateway.
//!
//! One [`SessionClient`] owns the token for the whole process. Clones are
//! cheap handles onto the same session, so a logout triggered through one
//! handle (explicitly, by a 401, or by the expiry sweep) is visible to every
//! other handle before its next call.
//!
//! Tokens are never logged or displayed in full.

pub mod callback;
pub mod error;
pub mod jwt;
pub mod sweep;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use self::callback::{CallbackListener, CallbackToken};
pub use self::error::{SessionError, SessionResult};
use self::sweep::SweepOutcome;
use crate::config::Config;
use crate::storage::LocalStorage;

/// Storage key holding the persisted bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Fixed profile endpoint.
const PROFILE_PATH: &str = "/user/profile";

/// Runtime settings for a [`SessionClient`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend base URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// OAuth provider segment for `GET /auth/<provider>`.
    pub provider: String,
    pub expiry_check_interval: Duration,
    /// Clear the session on non-401 profile failures as well.
    pub logout_on_profile_error: bool,
    pub request_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            provider: "google".to_string(),
            expiry_check_interval: Duration::from_secs(60),
            logout_on_profile_error: true,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Builds session settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            provider: config.provider.clone(),
            expiry_check_interval: config.session.expiry_check_interval(),
            logout_on_profile_error: config.session.logout_on_profile_error,
            request_timeout: config.session.request_timeout(),
        }
    }
}

/// Identity record served by `GET /user/profile`.
///
/// Replaced wholesale on every fetch. Fields the client does not know about
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserProfile {
    /// Best human-readable label for the identity.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }
}

/// Coarse session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Loading,
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Loading => "loading",
            AuthState::Authenticated => "authenticated",
        };
        f.write_str(label)
    }
}

/// Point-in-time copy of the session.
#[derive(Clone, PartialEq, Default)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl Session {
    pub fn state(&self) -> AuthState {
        if self.is_loading {
            AuthState::Loading
        } else if self.is_authenticated {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_deref().map(jwt::mask_token))
            .field("user", &self.user)
            .field("is_authenticated", &self.is_authenticated)
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

/// Method, extra headers and JSON body for [`SessionClient::authenticated_request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self::default().method(Method::POST).json(body)
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header. Repeated names accumulate values.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Default)]
struct State {
    token: Option<String>,
    user: Option<UserProfile>,
    is_authenticated: bool,
    loading: usize,
    /// Bumped whenever the held token changes; fences stale completions.
    generation: u64,
    sweep: Option<CancellationToken>,
}

impl State {
    fn snapshot(&self) -> Session {
        Session {
            token: self.token.clone(),
            user: self.user.clone(),
            is_authenticated: self.is_authenticated,
            is_loading: self.loading > 0,
        }
    }

    fn stop_sweep(&mut self) {
        if let Some(cancel) = self.sweep.take() {
            cancel.cancel();
        }
    }
}

struct Inner {
    config: SessionConfig,
    http: reqwest::Client,
    storage: Arc<dyn LocalStorage>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn logout(&self) {
        self.clear(None);
    }

    /// Logs out only if no other token has been installed since `generation`.
    fn logout_if_current(&self, generation: u64) -> bool {
        self.clear(Some(generation))
    }

    fn clear(&self, expected_generation: Option<u64>) -> bool {
        let was_authenticated = {
            let mut state = self.lock();
            if expected_generation.is_some_and(|g| g != state.generation) {
                tracing::debug!("skipping logout for a superseded session");
                return false;
            }
            let was = state.is_authenticated;
            state.generation += 1;
            state.token = None;
            state.user = None;
            state.is_authenticated = false;
            state.stop_sweep();

            // Under the state lock so a concurrent install cannot be erased.
            if let Err(err) = self.storage.remove(AUTH_TOKEN_KEY) {
                tracing::warn!(error = %format!("{err:#}"), "failed to remove persisted token");
            }
            was
        };

        if was_authenticated {
            tracing::info!("signed out");
        }
        true
    }

    /// One expiry check. Stops the sweep once the session is gone.
    fn sweep_once(&self, now: i64) -> SweepOutcome {
        let (expired, generation) = {
            let state = self.lock();
            match state.token.as_deref() {
                Some(token) if state.is_authenticated => {
                    (jwt::is_expired_at(token, now), state.generation)
                }
                _ => return SweepOutcome::Stop,
            }
        };

        if expired {
            tracing::info!("token expired, signing out");
            self.logout_if_current(generation);
            SweepOutcome::Stop
        } else {
            SweepOutcome::Continue
        }
    }
}

/// Marks the session as loading until dropped, on every exit path.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> LoadingGuard<'a> {
    fn new(inner: &'a Inner) -> Self {
        inner.lock().loading += 1;
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.loading = state.loading.saturating_sub(1);
    }
}

/// Handle onto the process-wide session.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.inner.config.base_url)
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Creates an empty (unauthenticated) session.
    ///
    /// # Errors
    /// Returns `Network` if the HTTP client cannot be constructed.
    pub fn new(config: SessionConfig, storage: Arc<dyn LocalStorage>) -> SessionResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| SessionError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                storage,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Returns a copy of the current session.
    pub fn session(&self) -> Session {
        self.inner.lock().snapshot()
    }

    pub fn state(&self) -> AuthState {
        self.session().state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().is_authenticated
    }

    /// Hydrates the session from the persisted token, if any.
    ///
    /// Returns the profile when the stored token is accepted, `None` when no
    /// token is stored. On failure the session is already cleared.
    ///
    /// # Errors
    /// Propagates `fetch_profile` errors, or `Storage` if the token store is
    /// unreadable.
    pub async fn initialize(&self) -> SessionResult<Option<UserProfile>> {
        let _loading = LoadingGuard::new(&self.inner);

        let stored = match self.inner.storage.get(AUTH_TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(err) => {
                self.inner.logout();
                return Err(SessionError::Storage(err));
            }
        };

        let Some(token) = stored else {
            tracing::debug!("no persisted token");
            return Ok(None);
        };

        tracing::debug!(token = %jwt::mask_token(&token), "restoring persisted session");
        self.fetch_profile(&token).await.map(Some)
    }

    /// Asks the backend for the provider authorization URL.
    ///
    /// The caller sends the user there (browser redirect).
    ///
    /// # Errors
    /// Returns `Network` if the backend is unreachable or the response has no
    /// usable `auth_url`.
    pub async fn start_login(&self) -> SessionResult<Url> {
        let url = self.endpoint(&format!("/auth/{}", self.inner.config.provider))?;
        tracing::debug!(%url, "requesting authorization url");

        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("Failed to reach auth endpoint: {e}")))?;
        let status = response.status();

        let body: Value = response.json().await.map_err(|e| {
            SessionError::Network(format!(
                "Malformed auth response (HTTP {}): {e}",
                status.as_u16()
            ))
        })?;

        let auth_url = body
            .get("auth_url")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                SessionError::Network(format!(
                    "Auth response (HTTP {}) has no auth_url",
                    status.as_u16()
                ))
            })?;

        Url::parse(auth_url)
            .map_err(|e| SessionError::Network(format!("Invalid auth_url '{auth_url}': {e}")))
    }

    /// Completes the redirect flow with the token handed back by the backend.
    ///
    /// # Errors
    /// Returns `NoToken` for a blank token, `Storage` if persisting fails, or
    /// the `fetch_profile` error. The session is cleared on any failure.
    pub async fn complete_login_callback(&self, token: &str) -> SessionResult<UserProfile> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::NoToken);
        }

        let _loading = LoadingGuard::new(&self.inner);

        let generation = match self.install_token(token) {
            Ok(generation) => generation,
            Err(err) => {
                self.inner.logout();
                return Err(err);
            }
        };

        match self.fetch_profile(token).await {
            Ok(profile) => {
                tracing::info!(user = %profile.display_name(), "signed in");
                Ok(profile)
            }
            Err(err) => {
                self.inner.logout_if_current(generation);
                Err(err)
            }
        }
    }

    /// Completes login from a full redirect URL.
    ///
    /// Returns the profile and the redirect URL with the token removed.
    ///
    /// # Errors
    /// Returns `NoToken` if the URL carries no token, otherwise as
    /// [`Self::complete_login_callback`].
    pub async fn complete_login_from_url(&self, url: &Url) -> SessionResult<(UserProfile, Url)> {
        let CallbackToken {
            token,
            scrubbed_url,
        } = callback::take_token(url).ok_or(SessionError::NoToken)?;
        let profile = self.complete_login_callback(&token).await?;
        Ok((profile, scrubbed_url))
    }

    /// Fetches the profile for `token` and, on success, authenticates the
    /// session with it.
    ///
    /// `token` becomes the held credential and is persisted before the request
    /// is sent.
    ///
    /// # Errors
    /// - `Storage` if the token cannot be persisted (session cleared).
    /// - `AuthExpired` on 401 (session cleared).
    /// - `ProfileFetch` on any other failure (session cleared when
    ///   `logout_on_profile_error` is set).
    pub async fn fetch_profile(&self, token: &str) -> SessionResult<UserProfile> {
        let generation = match self.install_token(token) {
            Ok(generation) => generation,
            Err(err) => {
                self.inner.logout();
                return Err(err);
            }
        };
        let url = self.endpoint(PROFILE_PATH)?;

        let result: SessionResult<UserProfile> = async {
            let headers = merge_headers(token, &HeaderMap::new())
                .ok_or_else(|| SessionError::ProfileFetch("token is not a valid header value".to_string()))?;
            let response = self
                .inner
                .http
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| SessionError::ProfileFetch(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(SessionError::AuthExpired);
            }
            if !status.is_success() {
                return Err(SessionError::ProfileFetch(format!(
                    "HTTP {}",
                    status.as_u16()
                )));
            }

            response
                .json::<UserProfile>()
                .await
                .map_err(|e| SessionError::ProfileFetch(format!("invalid profile body: {e}")))
        }
        .await;

        match result {
            Ok(profile) => {
                self.commit_profile(generation, token, profile.clone());
                Ok(profile)
            }
            Err(SessionError::AuthExpired) => {
                tracing::info!("profile request rejected, token expired or invalid");
                self.inner.logout_if_current(generation);
                Err(SessionError::AuthExpired)
            }
            Err(err) => {
                tracing::warn!(error = %err, "profile request failed");
                if self.inner.config.logout_on_profile_error {
                    self.inner.logout_if_current(generation);
                }
                Err(err)
            }
        }
    }

    /// Clears the session and the persisted token. Never fails.
    pub fn logout(&self) {
        self.inner.logout();
    }

    /// Calls a backend endpoint with the session's bearer token.
    ///
    /// Caller headers override the JSON content-type default; `Authorization`
    /// is always the session's. Returns the parsed JSON body (`Null` for an
    /// empty body).
    ///
    /// # Errors
    /// - `NoToken` without a token (no request is sent).
    /// - `AuthExpired` on 401, after logging out.
    /// - `Http` for other non-2xx responses, carrying the body's `detail`.
    /// - `Network` for transport failures, `Decode` for non-JSON success bodies.
    pub async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> SessionResult<Value> {
        let (token, generation) = {
            let state = self.inner.lock();
            let token = state.token.clone().ok_or(SessionError::NoToken)?;
            (token, state.generation)
        };

        let url = self.endpoint(path)?;
        let Some(headers) = merge_headers(&token, &options.headers) else {
            tracing::warn!("held token cannot be sent as a header, signing out");
            self.inner.logout_if_current(generation);
            return Err(SessionError::AuthExpired);
        };

        tracing::debug!(method = %options.method, %path, "authenticated request");
        let mut request = self
            .inner
            .http
            .request(options.method, url)
            .headers(headers);
        if let Some(body) = &options.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| SessionError::Decode(format!("Failed to encode request body: {e}")))?;
            request = request.body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::info!(%path, "request rejected with 401, signing out");
            self.inner.logout_if_current(generation);
            return Err(SessionError::AuthExpired);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::Network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(match error_detail(&body) {
                Some(message) => SessionError::Http { status, message },
                None => SessionError::http_status(status),
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| SessionError::Decode(e.to_string()))
    }

    /// [`Self::authenticated_request`] deserialized into `T`.
    ///
    /// # Errors
    /// As `authenticated_request`, plus `Decode` if the body does not fit `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> SessionResult<T> {
        let value = self.authenticated_request(path, options).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Decode(e.to_string()))
    }

    /// Runs one expiry check immediately. Returns true if it signed out.
    pub fn check_expiry_now(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        let was_authenticated = self.is_authenticated();
        self.inner.sweep_once(now) == SweepOutcome::Stop && was_authenticated && !self.is_authenticated()
    }

    /// Installs and persists `token` as the held credential in one critical
    /// section. Returns the session generation the token belongs to.
    fn install_token(&self, token: &str) -> SessionResult<u64> {
        let mut state = self.inner.lock();
        if state.token.as_deref() != Some(token) {
            self.inner
                .storage
                .set(AUTH_TOKEN_KEY, token)
                .map_err(SessionError::Storage)?;
            state.generation += 1;
            state.token = Some(token.to_string());
            state.user = None;
            state.is_authenticated = false;
            state.stop_sweep();
        }
        Ok(state.generation)
    }

    fn commit_profile(&self, generation: u64, token: &str, profile: UserProfile) {
        let mut state = self.inner.lock();
        if state.generation != generation || state.token.as_deref() != Some(token) {
            tracing::debug!("discarding profile for a superseded session");
            return;
        }

        state.user = Some(profile);
        state.is_authenticated = true;
        state.stop_sweep();

        let cancel = CancellationToken::new();
        state.sweep = Some(cancel.clone());
        drop(state);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        sweep::spawn_sweep(self.inner.config.expiry_check_interval, cancel, move || {
            match weak.upgrade() {
                Some(inner) => inner.sweep_once(chrono::Utc::now().timestamp()),
                None => SweepOutcome::Stop,
            }
        });
    }

    fn endpoint(&self, path: &str) -> SessionResult<Url> {
        let base = self.inner.config.base_url.trim_end_matches('/');
        let raw = if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&raw).map_err(|e| SessionError::Network(format!("Invalid request URL '{raw}': {e}")))
    }
}

/// Builds request headers: JSON content-type default, caller headers on top,
/// bearer authorization last. Returns `None` if the token is not a valid
/// header value.
fn merge_headers(token: &str, caller: &HeaderMap) -> Option<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for name in caller.keys() {
        if *name == AUTHORIZATION {
            continue;
        }
        headers.remove(name);
        for value in caller.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut bearer = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    Some(headers)
}

/// Extracts the human-readable `detail` from an error body.
fn error_detail(body: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(body).ok()?;
    match json.get("detail")? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
