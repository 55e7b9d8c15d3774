//! Login state machine tying the identity provider to the wallet SDK.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{Session, SessionStore, aa_error_code, fingerprint};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sdk::{IdentityEvent, IdentityProvider, OAuthParams, SdkError, WalletSdk};

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Login,
    Home,
    Diagnostics,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/",
            Self::Home => "/home",
            Self::Diagnostics => "/test",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "" => Some(Self::Login),
            "/home" => Some(Self::Home),
            "/test" => Some(Self::Diagnostics),
            _ => None,
        }
    }
}

/// Where the shell should go after an auth operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    To(Route),
}

/// Resolve the route actually shown for `requested` in `state`.
pub fn guard_route(requested: Route, state: &AuthState) -> Route {
    match (requested, state.is_signed_in()) {
        (Route::Home, false) => Route::Login,
        (Route::Login, true) => Route::Home,
        (route, _) => route,
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFailureKind {
    /// The sign-in widget produced no credential.
    IdentityProvider,
    /// The SDK backend reported an account-abstraction error (`AAnn`).
    Paymaster { code: String },
    /// Any other structured rejection from the SDK backend.
    Api { status: Option<u16> },
    /// The request got no response at all.
    Network,
    /// Login reported success but produced no session handle.
    MissingSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub message: String,
    pub details: Option<String>,
    pub solutions: Vec<String>,
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AuthFailure {
    pub fn no_credential() -> Self {
        Self {
            kind: AuthFailureKind::IdentityProvider,
            message: "No credential received from Google login".into(),
            details: None,
            solutions: lines(&[
                "Check the Google client ID configuration",
                "Make sure this origin is listed as authorized",
                "Try logging in again",
            ]),
        }
    }

    pub fn identity_provider_failed() -> Self {
        Self {
            kind: AuthFailureKind::IdentityProvider,
            message: "Google OAuth failed. Please try again.".into(),
            details: None,
            solutions: lines(&[
                "Check the Google client ID",
                "Verify the authorized origins",
            ]),
        }
    }

    pub fn missing_session() -> Self {
        Self {
            kind: AuthFailureKind::MissingSession,
            message: "Login returned no wallet session".into(),
            details: Some("The wallet SDK reported success without handing over a session.".into()),
            solutions: lines(&[
                "Try logging in again",
                "Verify the client keys belong to the selected environment",
            ]),
        }
    }

    /// Whether the user can reasonably retry with the same credential.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, AuthFailureKind::Paymaster { .. })
    }
}

/// Turn a rejected login call into an [`AuthFailure`].
pub fn classify_login_error(error: &SdkError) -> AuthFailure {
    let Some(body) = error.response_body.as_ref() else {
        return AuthFailure {
            kind: AuthFailureKind::Network,
            message: error
                .message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Network or configuration error".into()),
            details: error.code.clone(),
            solutions: lines(&[
                "Check the network connection",
                "Verify the client configuration values",
                "Try again",
            ]),
        };
    };

    if let Some(code) = error.api_error_data().as_deref().and_then(aa_error_code) {
        let (message, details, solutions) = match code.as_str() {
            "AA33" => (
                "AA33 paymaster error during authentication".to_string(),
                "Authentication should not involve user operations; the SDK or project setup is misconfigured.",
                lines(&[
                    "Check whether gas sponsorship is enabled for authentication",
                    "Verify the client keys are for the selected environment",
                    "Contact the wallet provider's support",
                ]),
            ),
            "AA31" => (
                "Paymaster deposit too low".to_string(),
                "The paymaster contract does not have enough funds to sponsor the operation.",
                lines(&[
                    "Top up the paymaster deposit",
                    "Verify the paymaster address",
                    "Contact the wallet provider's support if it persists",
                ]),
            ),
            other => (
                format!("{other} account abstraction error"),
                "The wallet service rejected a user operation.",
                lines(&["Verify the project configuration", "Contact the wallet provider's support"]),
            ),
        };
        return AuthFailure {
            kind: AuthFailureKind::Paymaster { code },
            message,
            details: Some(details.to_string()),
            solutions,
        };
    }

    AuthFailure {
        kind: AuthFailureKind::Api {
            status: error.status,
        },
        message: error
            .api_message()
            .unwrap_or("Authentication API error")
            .to_string(),
        details: serde_json::to_string_pretty(body).ok(),
        solutions: lines(&[
            "Check the client keys",
            "Verify the environment (sandbox or production)",
            "Make sure the project has sufficient credits",
        ]),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    SignedOut,
    Authenticating,
    SignedIn {
        session: Session,
    },
    Error(AuthFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoginStarted,
    LoginSucceeded(Session),
    LoginFailed(AuthFailure),
    LoggedOut,
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn { .. })
    }

    pub fn is_authenticating(&self) -> bool {
        matches!(self, Self::Authenticating)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn { session } => Some(session),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether `event` is a legal transition from this state.
    pub fn permits(&self, event: &AuthEvent) -> bool {
        match event {
            AuthEvent::LoginStarted => matches!(self, Self::SignedOut | Self::Error(_)),
            AuthEvent::LoginSucceeded(_) => self.is_authenticating(),
            // Identity provider failures arrive before any login started.
            AuthEvent::LoginFailed(_) => !self.is_signed_in(),
            AuthEvent::LoggedOut => true,
        }
    }

    /// The state after `event`. Illegal transitions return the state
    /// unchanged.
    pub fn apply(self, event: AuthEvent) -> AuthState {
        if !self.permits(&event) {
            return self;
        }
        match event {
            AuthEvent::LoginStarted => Self::Authenticating,
            AuthEvent::LoginSucceeded(session) => Self::SignedIn { session },
            AuthEvent::LoginFailed(failure) => Self::Error(failure),
            AuthEvent::LoggedOut => Self::SignedOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn(Navigation),
    Failed(AuthFailure),
    /// Empty credential; nothing happened.
    Rejected,
    AlreadyInProgress,
    AlreadySignedIn,
    /// A logout or newer attempt overtook this one; its result was dropped.
    Superseded,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

struct Inner {
    state: AuthState,
    /// Bumped on every login start and logout; a login whose attempt no
    /// longer matches has been overtaken.
    attempt: u64,
    /// Credential of the last attempt, for a manual retry after failure
    /// cleared storage.
    last_token: Option<String>,
}

/// Drives login, logout and session restore.
pub struct AuthOrchestrator {
    sdk: Arc<dyn WalletSdk>,
    identity: Option<Arc<dyn IdentityProvider>>,
    sessions: SessionStore,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<AuthState>,
}

impl AuthOrchestrator {
    pub fn new(sdk: Arc<dyn WalletSdk>, sessions: SessionStore) -> Self {
        let (state_tx, _) = watch::channel(AuthState::SignedOut);
        Self {
            sdk,
            identity: None,
            sessions,
            inner: Mutex::new(Inner {
                state: AuthState::SignedOut,
                attempt: 0,
                last_token: None,
            }),
            state_tx,
        }
    }

    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state.clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn route(&self, requested: Route) -> Route {
        guard_route(requested, &self.inner.lock().state)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn transition(&self, inner: &mut Inner, event: AuthEvent) -> bool {
        if !inner.state.permits(&event) {
            debug!(state = ?inner.state, event = ?event, "ignoring illegal auth transition");
            return false;
        }
        let next = std::mem::take(&mut inner.state).apply(event);
        inner.state = next.clone();
        self.state_tx.send_replace(next);
        true
    }

    /// React to the sign-in widget.
    pub async fn handle_identity_event(&self, event: IdentityEvent) -> LoginOutcome {
        let failure = match event {
            IdentityEvent::Credential(token) if !token.trim().is_empty() => {
                if let Err(e) = self.sessions.save_identity_token(&token) {
                    warn!("could not persist identity token: {e:#}");
                }
                return self.begin_login(&token).await;
            }
            IdentityEvent::Credential(_) => AuthFailure::no_credential(),
            IdentityEvent::Error => AuthFailure::identity_provider_failed(),
        };
        warn!("identity provider: {}", failure.message);
        self.transition(&mut self.inner.lock(), AuthEvent::LoginFailed(failure.clone()));
        LoginOutcome::Failed(failure)
    }

    /// Exchange an identity token for a wallet session.
    pub async fn begin_login(&self, id_token: &str) -> LoginOutcome {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            debug!("login requested without a credential");
            return LoginOutcome::Rejected;
        }

        let attempt = {
            let mut inner = self.inner.lock();
            match inner.state {
                AuthState::Authenticating => return LoginOutcome::AlreadyInProgress,
                AuthState::SignedIn { .. } => return LoginOutcome::AlreadySignedIn,
                _ => {}
            }
            self.transition(&mut inner, AuthEvent::LoginStarted);
            inner.attempt += 1;
            inner.last_token = Some(id_token.to_string());
            inner.attempt
        };
        info!(token = %fingerprint(id_token), attempt, "starting wallet login");

        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let result = self
            .sdk
            .login_using_oauth(
                OAuthParams::google(id_token),
                Box::new(move |session| *sink.lock() = Some(session)),
            )
            .await;

        let mut inner = self.inner.lock();
        if inner.attempt != attempt || !inner.state.is_authenticating() {
            debug!(attempt, "login overtaken, dropping its result");
            return LoginOutcome::Superseded;
        }

        let failure = match result {
            Ok(_) => match usable_session(captured.lock().take()) {
                Some(token) => {
                    let session = Session::new(token);
                    if let Err(e) = self.sessions.save_session(&session) {
                        warn!("could not persist wallet session: {e:#}");
                    }
                    self.transition(&mut inner, AuthEvent::LoginSucceeded(session));
                    info!(attempt, "wallet login succeeded");
                    return LoginOutcome::SignedIn(Navigation::To(Route::Home));
                }
                None => {
                    self.sdk.session_clear();
                    AuthFailure::missing_session()
                }
            },
            Err(e) => classify_login_error(&e),
        };

        warn!(kind = ?failure.kind, "wallet login failed: {}", failure.message);
        if let Err(e) = self.sessions.clear_all() {
            warn!("could not clear stored credentials: {e:#}");
        }
        self.transition(&mut inner, AuthEvent::LoginFailed(failure.clone()));
        LoginOutcome::Failed(failure)
    }

    /// Replay the credential of the last attempt.
    pub async fn retry_login(&self) -> LoginOutcome {
        let remembered = self.inner.lock().last_token.clone();
        let token = match remembered {
            Some(token) => Some(token),
            None => self.stored_identity_token(),
        };
        match token {
            Some(token) => self.begin_login(&token).await,
            None => LoginOutcome::Rejected,
        }
    }

    /// Run once at startup. Signs back in with whatever was persisted;
    /// does nothing unless currently signed out.
    pub async fn restore_session(&self) -> Option<LoginOutcome> {
        {
            let mut inner = self.inner.lock();
            if inner.state != AuthState::SignedOut {
                debug!(state = ?inner.state, "skipping session restore");
                return None;
            }
            if self.sdk.is_logged_in() {
                if let Ok(Some(session)) = self.sessions.session() {
                    info!("wallet SDK already signed in, reusing stored session");
                    self.transition(&mut inner, AuthEvent::LoginStarted);
                    self.transition(&mut inner, AuthEvent::LoginSucceeded(session));
                    return Some(LoginOutcome::SignedIn(Navigation::To(Route::Home)));
                }
            }
        }

        let token = self.stored_identity_token()?;
        info!("found stored identity token, restoring session");
        Some(self.begin_login(&token).await)
    }

    fn stored_identity_token(&self) -> Option<String> {
        self.sessions.identity_token().unwrap_or_else(|e| {
            warn!("could not read identity token: {e:#}");
            None
        })
    }

    /// Sign out everywhere. Local state is always cleared; failures of the
    /// remote calls are only logged.
    pub async fn logout(&self) -> Navigation {
        {
            let mut inner = self.inner.lock();
            inner.attempt += 1;
            inner.last_token = None;
            self.transition(&mut inner, AuthEvent::LoggedOut);
        }
        if let Err(e) = self.sessions.clear_all() {
            warn!("could not clear stored credentials: {e:#}");
        }

        if let Err(e) = self.sdk.logout().await {
            warn!("wallet SDK logout failed: {e}");
        }
        self.sdk.session_clear();
        if let Some(identity) = &self.identity {
            identity.sign_out();
        }

        info!("logged out");
        Navigation::To(Route::Login)
    }
}

/// The session blob as a string, or `None` if it cannot identify a session.
fn usable_session(session: Option<Value>) -> Option<String> {
    match session? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Object(obj) if obj.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockIdentity, MockSdk};
    use serde_json::json;
    use tessera_core::{KeyValueStore, MemoryStore};

    struct Harness {
        sdk: Arc<MockSdk>,
        identity: Arc<MockIdentity>,
        storage: Arc<MemoryStore>,
        auth: Arc<AuthOrchestrator>,
    }

    fn harness() -> Harness {
        let sdk = Arc::new(MockSdk::new());
        let identity = Arc::new(MockIdentity::default());
        let storage = Arc::new(MemoryStore::new());
        let auth = AuthOrchestrator::new(sdk.clone(), SessionStore::new(storage.clone()))
            .with_identity_provider(identity.clone());
        Harness {
            sdk,
            identity,
            storage,
            auth: Arc::new(auth),
        }
    }

    fn api_error(data: &str) -> SdkError {
        SdkError::new("Request failed with status code 400").with_response(
            400,
            json!({ "error": { "message": "user operation rejected", "data": data } }),
        )
    }

    #[tokio::test]
    async fn empty_token_does_nothing() {
        let h = harness();
        assert_eq!(h.auth.begin_login("").await, LoginOutcome::Rejected);
        assert_eq!(h.auth.begin_login("   ").await, LoginOutcome::Rejected);
        assert_eq!(h.auth.state(), AuthState::SignedOut);
        assert_eq!(h.sdk.call_count("loginUsingOAuth"), 0);
    }

    #[tokio::test]
    async fn successful_login_persists_session() {
        let h = harness();
        let outcome = h.auth.begin_login("id-token").await;
        assert_eq!(outcome, LoginOutcome::SignedIn(Navigation::To(Route::Home)));

        let session = h.auth.state().session().cloned().unwrap();
        assert!(session.token.contains("sk-1"));
        assert_eq!(h.auth.sessions().session().unwrap(), Some(session));

        let sent = &h.sdk.requests("loginUsingOAuth")[0];
        assert_eq!(sent["idToken"], "id-token");
        assert_eq!(sent["provider"], "google");
    }

    #[tokio::test]
    async fn missing_session_is_an_error() {
        for session in [None, Some(Value::Null), Some(json!({})), Some(json!(""))] {
            let h = harness();
            h.sdk.set_session(session.clone());
            h.auth.sessions().save_identity_token("id-token").unwrap();

            let outcome = h.auth.begin_login("id-token").await;
            assert!(
                matches!(&outcome, LoginOutcome::Failed(f) if f.kind == AuthFailureKind::MissingSession),
                "session {session:?} gave {outcome:?}"
            );
            assert!(!h.auth.state().is_signed_in());
            assert!(h.auth.sessions().session().unwrap().is_none());
            assert!(h.auth.sessions().identity_token().unwrap().is_none());
            assert_eq!(h.sdk.call_count("sessionClear"), 1);
        }
    }

    #[tokio::test]
    async fn paymaster_failure_is_classified() {
        let h = harness();
        h.sdk.respond("loginUsingOAuth", Err(api_error("execution reverted: AA33 reverted")));
        h.auth.sessions().save_identity_token("id-token").unwrap();

        let LoginOutcome::Failed(failure) = h.auth.begin_login("id-token").await else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, AuthFailureKind::Paymaster { code: "AA33".into() });
        assert!(!failure.is_retryable());
        assert_eq!(h.auth.state(), AuthState::Error(failure));
        assert!(h.auth.sessions().identity_token().unwrap().is_none());
    }

    #[test]
    fn login_error_classification() {
        let f = classify_login_error(&api_error("AA31 paymaster deposit too low"));
        assert_eq!(f.kind, AuthFailureKind::Paymaster { code: "AA31".into() });
        assert_eq!(f.message, "Paymaster deposit too low");

        let f = classify_login_error(&api_error("invalid id token"));
        assert_eq!(f.kind, AuthFailureKind::Api { status: Some(400) });
        assert_eq!(f.message, "user operation rejected");
        assert!(f.details.unwrap().contains("invalid id token"));

        let f = classify_login_error(&SdkError::empty().with_response(401, json!({})));
        assert_eq!(f.message, "Authentication API error");

        let f = classify_login_error(&SdkError::new("Network Error").with_code("ERR_NETWORK"));
        assert_eq!(f.kind, AuthFailureKind::Network);
        assert_eq!(f.message, "Network Error");
        assert_eq!(f.details.as_deref(), Some("ERR_NETWORK"));

        let f = classify_login_error(&SdkError::empty());
        assert_eq!(f.message, "Network or configuration error");
    }

    #[tokio::test]
    async fn identity_errors_skip_the_sdk() {
        let h = harness();
        let outcome = h.auth.handle_identity_event(IdentityEvent::Error).await;
        assert!(matches!(outcome, LoginOutcome::Failed(ref f) if f.kind == AuthFailureKind::IdentityProvider));
        assert!(matches!(h.auth.state(), AuthState::Error(_)));

        let outcome = h.auth.handle_identity_event(IdentityEvent::Credential(String::new())).await;
        assert_eq!(outcome, LoginOutcome::Failed(AuthFailure::no_credential()));
        assert_eq!(h.sdk.call_count("loginUsingOAuth"), 0);
    }

    #[tokio::test]
    async fn credential_is_stored_then_used() {
        let h = harness();
        let outcome = h
            .auth
            .handle_identity_event(IdentityEvent::Credential("id-token".into()))
            .await;
        assert_eq!(outcome, LoginOutcome::SignedIn(Navigation::To(Route::Home)));
        assert_eq!(h.auth.sessions().identity_token().unwrap().as_deref(), Some("id-token"));
    }

    #[tokio::test]
    async fn concurrent_login_is_refused() {
        let h = harness();
        let gate = h.sdk.gate_login();

        let auth = h.auth.clone();
        let first = tokio::spawn(async move { auth.begin_login("id-token").await });
        while !h.auth.state().is_authenticating() {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.auth.begin_login("id-token").await, LoginOutcome::AlreadyInProgress);
        assert_eq!(h.auth.restore_session().await, None);

        gate.notify_one();
        assert_eq!(
            first.await.unwrap(),
            LoginOutcome::SignedIn(Navigation::To(Route::Home))
        );
        assert_eq!(h.auth.begin_login("id-token").await, LoginOutcome::AlreadySignedIn);
    }

    #[tokio::test]
    async fn logout_during_login_drops_the_result() {
        let h = harness();
        let gate = h.sdk.gate_login();

        let auth = h.auth.clone();
        let pending = tokio::spawn(async move { auth.begin_login("id-token").await });
        while !h.auth.state().is_authenticating() {
            tokio::task::yield_now().await;
        }

        h.auth.logout().await;
        gate.notify_one();

        assert_eq!(pending.await.unwrap(), LoginOutcome::Superseded);
        assert_eq!(h.auth.state(), AuthState::SignedOut);
        assert!(h.auth.sessions().session().unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything_even_when_sdk_fails() {
        let h = harness();
        h.auth.begin_login("id-token").await;
        h.storage.set("unrelated", "kept").unwrap();
        h.sdk.respond("logout", Err(SdkError::new("server unreachable")));

        assert_eq!(h.auth.logout().await, Navigation::To(Route::Login));
        assert_eq!(h.auth.state(), AuthState::SignedOut);
        assert!(h.auth.sessions().session().unwrap().is_none());
        assert!(h.auth.sessions().identity_token().unwrap().is_none());
        assert_eq!(h.storage.get("unrelated").unwrap().as_deref(), Some("kept"));
        assert_eq!(*h.identity.sign_outs.lock(), 1);
        assert!(h.sdk.calls().contains(&"sessionClear".to_string()));
    }

    #[tokio::test]
    async fn restore_replays_stored_token_once() {
        let h = harness();
        assert_eq!(h.auth.restore_session().await, None);

        h.auth.sessions().save_identity_token("stored").unwrap();
        assert_eq!(
            h.auth.restore_session().await,
            Some(LoginOutcome::SignedIn(Navigation::To(Route::Home)))
        );
        assert_eq!(h.auth.restore_session().await, None);
        assert_eq!(h.sdk.call_count("loginUsingOAuth"), 1);
        assert_eq!(h.sdk.requests("loginUsingOAuth")[0]["idToken"], "stored");
    }

    #[tokio::test]
    async fn restore_reuses_live_sdk_session() {
        let h = harness();
        h.sdk.set_logged_in(true);
        h.auth.sessions().save_session(&Session::new("blob")).unwrap();

        let outcome = h.auth.restore_session().await;
        assert_eq!(outcome, Some(LoginOutcome::SignedIn(Navigation::To(Route::Home))));
        assert_eq!(h.auth.state().session().unwrap().token, "blob");
        assert_eq!(h.sdk.call_count("loginUsingOAuth"), 0);
    }

    #[tokio::test]
    async fn manual_retry_after_failure() {
        let h = harness();
        h.sdk.respond("loginUsingOAuth", Err(SdkError::new("timeout")));
        h.sdk.respond("loginUsingOAuth", Ok(json!({ "userSWA": "0xuser" })));

        assert!(matches!(h.auth.begin_login("id-token").await, LoginOutcome::Failed(_)));
        assert_eq!(
            h.auth.retry_login().await,
            LoginOutcome::SignedIn(Navigation::To(Route::Home))
        );
        assert_eq!(h.sdk.call_count("loginUsingOAuth"), 2);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let h = harness();
        let mut rx = h.auth.subscribe();
        h.auth.begin_login("id-token").await;
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_signed_in());
    }

    #[test]
    fn transition_table() {
        let session = Session::new("s");
        let failure = AuthFailure::missing_session();

        let s = AuthState::SignedOut.apply(AuthEvent::LoginStarted);
        assert_eq!(s, AuthState::Authenticating);
        let s = s.apply(AuthEvent::LoginSucceeded(session.clone()));
        assert!(s.is_signed_in());
        // Illegal: already signed in.
        let s = s.apply(AuthEvent::LoginStarted);
        assert!(s.is_signed_in());
        assert!(s.clone().apply(AuthEvent::LoginFailed(failure.clone())).is_signed_in());
        assert_eq!(s.apply(AuthEvent::LoggedOut), AuthState::SignedOut);

        let s = AuthState::Authenticating.apply(AuthEvent::LoginFailed(failure.clone()));
        assert_eq!(s, AuthState::Error(failure.clone()));
        assert_eq!(s.clone().apply(AuthEvent::LoginStarted), AuthState::Authenticating);
        assert_eq!(
            s.apply(AuthEvent::LoginSucceeded(session.clone())),
            AuthState::Error(failure)
        );
        assert_eq!(
            AuthState::SignedOut.apply(AuthEvent::LoginSucceeded(session)),
            AuthState::SignedOut
        );
    }

    #[test]
    fn route_guard() {
        let signed_in = AuthState::SignedIn {
            session: Session::new("s"),
        };
        let cases = [
            (Route::Home, AuthState::SignedOut, Route::Login),
            (Route::Home, AuthState::Authenticating, Route::Login),
            (Route::Home, signed_in.clone(), Route::Home),
            (Route::Login, signed_in.clone(), Route::Home),
            (Route::Login, AuthState::SignedOut, Route::Login),
            (Route::Diagnostics, AuthState::SignedOut, Route::Diagnostics),
            (Route::Diagnostics, signed_in, Route::Diagnostics),
        ];
        for (requested, state, expected) in cases {
            assert_eq!(guard_route(requested, &state), expected, "{requested:?} in {state:?}");
        }
    }

    #[test]
    fn route_paths() {
        for route in [Route::Login, Route::Home, Route::Diagnostics] {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
        assert_eq!(Route::from_path("/home/"), Some(Route::Home));
        assert_eq!(Route::from_path("/nowhere"), None);
    }
}
