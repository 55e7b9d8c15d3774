//! Self-checks behind the diagnostics route. Nothing here touches persisted
//! storage or the auth state machine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tessera_core::{ConfigStatus, TesseraConfig};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthFailure, AuthFailureKind, classify_login_error};
use crate::sdk::{OAuthParams, WalletSdk};

/// Snapshot of the SDK client and its configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub logged_in: bool,
    pub user_address: Option<String>,
    pub config: ConfigStatus,
    /// Displayable reason the configuration is unusable, if it is.
    pub config_error: Option<String>,
    /// Redacted config values.
    pub summary: BTreeMap<&'static str, String>,
    pub checked_at: DateTime<Utc>,
}

pub fn client_status(sdk: &dyn WalletSdk, config: &TesseraConfig) -> ClientStatus {
    ClientStatus {
        logged_in: sdk.is_logged_in(),
        user_address: sdk.user_address(),
        config: config.validate(),
        config_error: config.require_valid().err().map(|e| e.user_message()),
        summary: config.summary(),
        checked_at: Utc::now(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeStep {
    pub number: u8,
    pub action: &'static str,
    pub status: StepStatus,
    pub detail: Option<String>,
}

/// Record of a login attempt made purely to see where it breaks.
#[derive(Debug, Clone, Serialize)]
pub struct LoginProbe {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<ProbeStep>,
    pub failure: Option<AuthFailure>,
    pub conclusion: String,
}

impl LoginProbe {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.steps.iter().all(|s| s.status == StepStatus::Passed)
    }

    fn step(&mut self, action: &'static str, status: StepStatus, detail: Option<String>) {
        let number = self.steps.len() as u8 + 1;
        self.steps.push(ProbeStep {
            number,
            action,
            status,
            detail,
        });
    }

    fn skip_rest(&mut self, actions: &[&'static str]) {
        for action in actions {
            self.step(action, StepStatus::Skipped, None);
        }
    }
}

const STEP_CREDENTIAL: &str = "Check identity credential";
const STEP_LOGIN: &str = "Call wallet login";
const STEP_SESSION: &str = "Session callback";
const STEP_COMPLETE: &str = "Authentication complete";

/// Run the wallet login with `id_token` and record each stage.
///
/// The session handed to the callback is only inspected, never stored.
pub async fn probe_login(sdk: &dyn WalletSdk, id_token: &str) -> LoginProbe {
    let mut probe = LoginProbe {
        id: Uuid::new_v4(),
        started_at: Utc::now(),
        steps: Vec::new(),
        failure: None,
        conclusion: String::new(),
    };

    let id_token = id_token.trim();
    if id_token.is_empty() {
        probe.step(STEP_CREDENTIAL, StepStatus::Failed, Some("no ID token received".into()));
        probe.skip_rest(&[STEP_LOGIN, STEP_SESSION, STEP_COMPLETE]);
        probe.failure = Some(AuthFailure::no_credential());
        probe.conclusion = "The identity provider produced no credential".into();
        return probe;
    }
    probe.step(
        STEP_CREDENTIAL,
        StepStatus::Passed,
        Some(format!("{} characters", id_token.len())),
    );

    let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let result = sdk
        .login_using_oauth(
            OAuthParams::google(id_token),
            Box::new(move |session| *sink.lock() = Some(session)),
        )
        .await;

    match result {
        Ok(_) => {
            probe.step(STEP_LOGIN, StepStatus::Passed, None);
            match seen.lock().take() {
                Some(session) => {
                    let keys = session
                        .as_object()
                        .map(|obj| obj.keys().cloned().collect::<Vec<_>>().join(", "))
                        .unwrap_or_default();
                    probe.step(STEP_SESSION, StepStatus::Passed, Some(format!("keys: [{keys}]")));
                }
                None => {
                    probe.step(STEP_SESSION, StepStatus::Failed, Some("callback never invoked".into()));
                    probe.failure = Some(AuthFailure::missing_session());
                }
            }
            let logged_in = sdk.is_logged_in();
            let detail = format!(
                "logged in: {logged_in}, address: {}",
                sdk.user_address().as_deref().unwrap_or("unknown")
            );
            let status = if logged_in {
                StepStatus::Passed
            } else {
                StepStatus::Failed
            };
            probe.step(STEP_COMPLETE, status, Some(detail));
        }
        Err(e) => {
            let failure = classify_login_error(&e);
            probe.step(STEP_LOGIN, StepStatus::Failed, Some(e.to_string()));
            probe.skip_rest(&[STEP_SESSION, STEP_COMPLETE]);
            probe.failure = Some(failure);
        }
    }

    probe.conclusion = match &probe.failure {
        None if probe.succeeded() => "Authentication completed successfully".into(),
        None => "Login returned but the SDK does not report a signed-in user".into(),
        Some(AuthFailure {
            kind: AuthFailureKind::Paymaster { code },
            ..
        }) => format!("{code} error during login; authentication should not involve user operations"),
        Some(failure) => format!("Authentication failed: {}", failure.message),
    };
    info!(probe = %probe.id, ok = probe.succeeded(), "login probe finished");
    probe
}
