//! Authenticated session client.
//!
//! ARCHITECTURE
//! ============
//! Every call goes through [`SessionClient::send`]: the stored access token
//! is attached as a bearer header, the request is executed, and a 401 on a
//! request that has not been retried yet triggers one refresh exchange
//! followed by exactly one retry with the new token.
//!
//! State machine:
//!
//! ```text
//! Authenticated --401--> Refreshing --ok--> Authenticated
//!                                   --err-> LoggedOut (tokens cleared, redirect)
//! ```
//!
//! SINGLE-FLIGHT REFRESH
//! =====================
//! Concurrent 401s share one exchange. The first request to see a 401 takes
//! the refresh gate and becomes the leader; the rest park a oneshot sender
//! in the gate and receive the leader's outcome. A request whose 401 came
//! from a token that has since been replaced skips the exchange and retries
//! with the current token. If the leader's future is dropped mid-exchange,
//! its guard fails the parked requests with `RefreshError::Abandoned` and
//! reopens the gate.
//!
//! LOCKING
//! =======
//! State, default headers and the gate use `std::sync` locks that are never
//! held across `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::config::{AuthHeaderPolicy, SessionConfig};
use crate::error::{RefreshError, SessionError};
use crate::navigator::Navigator;
use crate::state::{SessionPhase, SessionState, UserProfile};
use crate::storage::{
    ACCESS_TOKEN_KEY, Credentials, TokenStore, clear_credentials, load_access_token, load_credentials,
    load_refresh_token, store_credentials,
};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, bearer_header, json_headers};

/// Username/password exchange for a token pair.
pub const TOKEN_PATH: &str = "token/";
/// Refresh-token exchange for a new access token.
pub const REFRESH_PATH: &str = "token/refresh/";
/// Profile of the authenticated user.
pub const CURRENT_USER_PATH: &str = "user/current/";

/// Login failure message when the backend gives no `detail`.
pub const LOGIN_FAILED_MESSAGE: &str = "Error en el inicio de sesión";

type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshGate {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum RefreshTurn {
    Lead,
    Wait(oneshot::Receiver<RefreshOutcome>),
}

pub struct SessionClient {
    config: SessionConfig,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    default_headers: RwLock<HeaderMap>,
    state: RwLock<SessionState>,
    gate: Mutex<RefreshGate>,
}

impl SessionClient {
    /// Build a client over an explicit transport.
    ///
    /// The initial phase is `Authenticated` when an access token is already
    /// stored, `LoggedOut` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the stored token is
    /// not a valid header value.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        let access = load_access_token(store.as_ref())?;
        let mut default_headers = json_headers();
        if let Some(token) = &access {
            default_headers.insert(AUTHORIZATION, bearer_header(token)?);
        }

        Ok(Self {
            config,
            transport,
            store,
            navigator,
            default_headers: RwLock::new(default_headers),
            state: RwLock::new(SessionState::initial(access.is_some())),
            gate: Mutex::new(RefreshGate::default()),
        })
    }

    /// Build a client that talks to the network through `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the store
    /// cannot be read.
    pub fn from_config(
        config: SessionConfig,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeouts)?);
        Self::new(config, transport, store, navigator)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.read().unwrap_or_else(PoisonError::into_inner).phase
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).is_authenticated
    }

    /// Copy of the headers attached to every request before per-request ones.
    #[must_use]
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // =========================================================================
    // SEND
    // =========================================================================

    /// Send a request with the current credentials attached.
    ///
    /// Any status other than 401 is returned as-is. A first 401 is recovered
    /// by refreshing the access token and retrying once.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transport`] if no response arrived (never retried)
    /// - [`SessionError::Unauthorized`] for a 401 that cannot be recovered:
    ///   no refresh token stored, or the retry was rejected too
    /// - [`SessionError::RefreshFailed`] if the refresh exchange failed; the
    ///   session has been logged out and the login redirect issued
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let (request, attached) = self.prepare(request)?;
        let response = self.transport.execute(request.clone()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if request.retried {
            return Err(SessionError::Unauthorized { body: response.text() });
        }
        self.recover(request, attached, response).await
    }

    /// Send and decode a JSON success body.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus [`SessionError::Status`]
    /// for non-2xx responses and [`SessionError::Decode`] for bad bodies.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, SessionError> {
        self.send(request).await?.error_for_status()?.json()
    }

    /// `GET` a JSON resource.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// `POST` a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, SessionError> {
        self.send_json(ApiRequest::post(path, body)).await
    }

    /// Resolve the URL and layer default headers, caller headers and the
    /// stored bearer token, in that order of precedence.
    ///
    /// Also returns the stored token attached, `None` when the request went
    /// out without it.
    fn prepare(&self, mut request: ApiRequest) -> Result<(ApiRequest, Option<String>), SessionError> {
        request.url = self.config.resolve(&request.url);

        let caller_headers = std::mem::take(&mut request.headers);
        let caller_set_auth = caller_headers.contains_key(AUTHORIZATION);
        let mut headers = self.default_headers();
        headers.extend(caller_headers);

        let keep_caller_auth = caller_set_auth && self.config.auth_header_policy == AuthHeaderPolicy::Preserve;
        let mut attached = None;
        if !keep_caller_auth {
            if let Some(token) = load_access_token(self.store.as_ref())? {
                headers.insert(AUTHORIZATION, bearer_header(&token)?);
                attached = Some(token);
            }
        }

        request.headers = headers;
        Ok((request, attached))
    }

    async fn recover(
        &self,
        mut request: ApiRequest,
        attached: Option<String>,
        rejected: ApiResponse,
    ) -> Result<ApiResponse, SessionError> {
        request.retried = true;

        if load_refresh_token(self.store.as_ref())?.is_none() {
            tracing::debug!(url = %request.url, "401 with no refresh token stored");
            return Err(SessionError::Unauthorized { body: rejected.text() });
        }

        let token = self.fresh_access_token(attached.as_deref()).await?;
        request.headers.insert(AUTHORIZATION, bearer_header(&token)?);

        tracing::debug!(method = %request.method, url = %request.url, "retrying after refresh");
        let response = self.transport.execute(request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            return Err(SessionError::Unauthorized { body: response.text() });
        }
        Ok(response)
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// An access token newer than `stale`, refreshing if nobody else has.
    ///
    /// `stale` is the stored token the rejected request carried. Without one
    /// (caller header kept, or nothing stored) the exchange always runs.
    async fn fresh_access_token(&self, stale: Option<&str>) -> Result<String, SessionError> {
        let turn = {
            let mut gate = self.lock_gate();
            if gate.in_flight {
                let (tx, rx) = oneshot::channel();
                gate.waiters.push(tx);
                RefreshTurn::Wait(rx)
            } else {
                // Already replaced since this request went out.
                if let (Some(stale), Some(current)) = (stale, load_access_token(self.store.as_ref())?) {
                    if stale != current {
                        return Ok(current);
                    }
                }
                gate.in_flight = true;
                RefreshTurn::Lead
            }
        };

        match turn {
            RefreshTurn::Wait(rx) => {
                let outcome = rx.await.unwrap_or(Err(RefreshError::Abandoned));
                outcome.map_err(SessionError::from)
            }
            RefreshTurn::Lead => {
                let leader = RefreshLeader { client: self, settled: false };
                self.set_phase(SessionPhase::Refreshing);
                tracing::info!("access token rejected, refreshing");

                let outcome = self.exchange_refresh_token().await;
                match &outcome {
                    Ok(token) => self.on_refresh_success(token),
                    Err(error) => self.on_refresh_failure(error),
                }
                leader.settle(&outcome);
                outcome.map_err(SessionError::from)
            }
        }
    }

    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        #[derive(Deserialize)]
        struct RefreshResponse {
            access: String,
        }

        let refresh = match load_refresh_token(self.store.as_ref()) {
            Ok(Some(token)) => token,
            Ok(None) => return Err(RefreshError::MissingRefreshToken),
            Err(e) => return Err(RefreshError::Storage(e.to_string())),
        };

        let mut request = ApiRequest::post(self.config.resolve(REFRESH_PATH), json!({ "refresh": refresh }));
        request.headers = json_headers();

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(RefreshError::Rejected { status: response.status.as_u16(), body: response.text() });
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
        if body.access.is_empty() {
            return Err(RefreshError::MalformedResponse("empty access token".into()));
        }
        if bearer_header(&body.access).is_err() {
            return Err(RefreshError::MalformedResponse("access token is not a valid header value".into()));
        }

        self.store
            .set(ACCESS_TOKEN_KEY, &body.access)
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        Ok(body.access)
    }

    /// Publish a token the exchange has already validated and persisted.
    fn on_refresh_success(&self, token: &str) {
        if let Err(e) = self.set_default_authorization(Some(token)) {
            tracing::error!(error = %e, "refreshed access token is not a valid header");
        }
        let mut state = self.write_state();
        state.is_authenticated = true;
        state.phase = SessionPhase::Authenticated;
        drop(state);
        tracing::info!("access token refreshed");
    }

    fn on_refresh_failure(&self, error: &RefreshError) {
        tracing::warn!(error = %error, "refresh failed, ending session");
        self.clear_session();
        self.navigator.redirect(&self.config.login_path);
    }

    fn release_gate(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut gate = self.lock_gate();
            gate.in_flight = false;
            std::mem::take(&mut gate.waiters)
        };
        for waiter in waiters {
            // A dropped receiver means that request was cancelled.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, RefreshGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // LOGIN / LOGOUT
    // =========================================================================

    /// Exchange username and password for a token pair and load the profile.
    ///
    /// Any previous session is cleared first. On failure nothing is left in
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LoginFailed`] with the backend's `detail`
    /// message when it sent one.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.logout()?;

        let (request, _) = self.prepare(ApiRequest::post(
            TOKEN_PATH,
            json!({ "username": username.trim(), "password": password }),
        ))?;
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.abort_login(format!("connection error: {e}"))),
        };
        if !response.is_success() {
            let message = response.detail().unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string());
            return Err(self.abort_login(message));
        }

        let credentials: Credentials = match response.json() {
            Ok(credentials) => credentials,
            Err(e) => return Err(self.abort_login(e.to_string())),
        };
        if let Err(e) = store_credentials(self.store.as_ref(), &credentials) {
            return Err(self.abort_login(e.to_string()));
        }
        if let Err(e) = self.set_default_authorization(Some(&credentials.access)) {
            return Err(self.abort_login(e.to_string()));
        }

        let user = match self.fetch_current_user().await {
            Ok(user) => user,
            Err(e) => return Err(self.abort_login(e.to_string())),
        };
        *self.write_state() = SessionState::authenticated(user.clone());
        tracing::info!(username = %user.username, role = user.role(), "login succeeded");
        Ok(user)
    }

    /// Re-establish the session from stored tokens at start-up.
    ///
    /// Without both tokens the session is logged out. Otherwise the profile
    /// is fetched through [`send`](Self::send), so an expired access token is
    /// refreshed on the way; any failure ends the session.
    ///
    /// # Errors
    ///
    /// Only storage and header errors surface; a rejected session is
    /// reported through the returned state.
    pub async fn restore(&self) -> Result<SessionState, SessionError> {
        let Some(credentials) = load_credentials(self.store.as_ref())? else {
            *self.write_state() = SessionState::logged_out();
            return Ok(self.state());
        };

        self.set_default_authorization(Some(&credentials.access))?;
        match self.fetch_current_user().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "session restored");
                *self.write_state() = SessionState::authenticated(user);
            }
            Err(e) => {
                tracing::warn!(error = %e, "session restore failed");
                self.clear_session();
            }
        }
        Ok(self.state())
    }

    /// Forget the session: tokens, default Authorization header and user.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens cannot be removed from storage; the
    /// in-memory session is cleared regardless.
    pub fn logout(&self) -> Result<(), SessionError> {
        let cleared = clear_credentials(self.store.as_ref());
        self.remove_default_authorization();
        *self.write_state() = SessionState::logged_out();
        cleared?;
        Ok(())
    }

    /// Log out if the access token was deleted from storage by someone else.
    ///
    /// Returns `true` when that happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn sync_with_storage(&self) -> Result<bool, SessionError> {
        if !self.is_authenticated() || load_access_token(self.store.as_ref())?.is_some() {
            return Ok(false);
        }
        tracing::info!("access token removed externally, logging out");
        self.logout()?;
        Ok(true)
    }

    /// Profile of the authenticated user.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    pub async fn fetch_current_user(&self) -> Result<UserProfile, SessionError> {
        self.get_json(CURRENT_USER_PATH).await
    }

    fn abort_login(&self, message: String) -> SessionError {
        tracing::warn!(error = %message, "login failed");
        self.clear_session();
        SessionError::LoginFailed(message)
    }

    /// `logout` for paths that already have an error to report.
    fn clear_session(&self) {
        if let Err(e) = self.logout() {
            tracing::error!(error = %e, "failed to clear stored credentials");
        }
    }

    // =========================================================================
    // STATE HELPERS
    // =========================================================================

    fn set_default_authorization(&self, token: Option<&str>) -> Result<(), SessionError> {
        let Some(token) = token else {
            self.remove_default_authorization();
            return Ok(());
        };
        let value = bearer_header(token)?;
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(AUTHORIZATION, value);
        Ok(())
    }

    fn remove_default_authorization(&self) {
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(AUTHORIZATION);
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.write_state().phase = phase;
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the request performing a refresh exchange.
///
/// Dropping it without [`settle`](Self::settle) fails the parked requests.
struct RefreshLeader<'a> {
    client: &'a SessionClient,
    settled: bool,
}

impl RefreshLeader<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.client.release_gate(outcome);
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!("refresh abandoned mid-exchange");
        let mut state = self.client.write_state();
        if state.phase == SessionPhase::Refreshing {
            state.phase = SessionPhase::Authenticated;
        }
        drop(state);
        self.client.release_gate(&Err(RefreshError::Abandoned));
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
