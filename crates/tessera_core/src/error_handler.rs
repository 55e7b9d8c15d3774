use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::session::SessionStore;

/// Errors raised by the core crate at its typed seams.
#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing the persisted credentials failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TesseraError {
    /// A message fit for display; storage internals are hidden.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Configuration issue: {msg}"),
            Self::Storage(_) => "Storage error. Check disk space and permissions.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Message-pattern classification for anyhow::Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    /// The client may be in an inconsistent state.
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifiedCategory {
    /// ERC-4337 validation failure (`AA21`, `AA31`, `AA33`, ...).
    AccountAbstraction,
    Authentication,
    Network,
    RateLimit,
    Configuration,
    Storage,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub severity: ErrorSeverity,
    pub category: ClassifiedCategory,
    pub message: String,
    pub user_message: String,
    pub recoverable: bool,
}

/// Matches an account-abstraction error code such as `AA33`.
pub fn aa_error_code(text: &str) -> Option<String> {
    static AA_CODE: OnceLock<Regex> = OnceLock::new();
    let re = AA_CODE.get_or_init(|| Regex::new(r"\bAA[1-9][0-9]\b").expect("static regex"));
    re.find(text).map(|m| m.as_str().to_string())
}

/// Classify an error by the patterns in its message.
pub fn classify_error(error: &anyhow::Error) -> ClassifiedError {
    let original = format!("{error:#}");
    let msg = original.to_lowercase();

    let (category, severity, user_msg) = if aa_error_code(&original).is_some() {
        (
            ClassifiedCategory::AccountAbstraction,
            ErrorSeverity::Critical,
            "The wallet service rejected a user operation. This usually means the SDK or paymaster is misconfigured.",
        )
    } else if msg.contains("rate limit") || msg.contains("429") {
        (
            ClassifiedCategory::RateLimit,
            ErrorSeverity::Medium,
            "Too many requests. Wait a moment and try again.",
        )
    } else if msg.contains("unauthorized") || msg.contains("401") || msg.contains("invalid token") {
        (
            ClassifiedCategory::Authentication,
            ErrorSeverity::High,
            "Your session is no longer valid. Log in again.",
        )
    } else if msg.contains("timeout") || msg.contains("connection") || msg.contains("dns") {
        (
            ClassifiedCategory::Network,
            ErrorSeverity::Medium,
            "Network error. Check your connection.",
        )
    } else if msg.contains("config") || msg.contains("environment variable") {
        (
            ClassifiedCategory::Configuration,
            ErrorSeverity::High,
            "Configuration error. Check your client keys and environment.",
        )
    } else if msg.contains("storage") || msg.contains("permission denied") {
        (
            ClassifiedCategory::Storage,
            ErrorSeverity::Medium,
            "Local storage error. Clearing storage may help.",
        )
    } else {
        (
            ClassifiedCategory::Internal,
            ErrorSeverity::Medium,
            "An unexpected error occurred.",
        )
    };

    ClassifiedError {
        severity,
        category,
        message: original,
        user_message: user_msg.to_string(),
        recoverable: severity != ErrorSeverity::Critical,
    }
}

// ---------------------------------------------------------------------------
// Catch-all boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    Reload,
    ClearStorageAndReload,
}

/// What the shell shows when something escaped every local handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPanel {
    pub title: String,
    pub detail: String,
    pub hint: String,
    pub classified: ClassifiedError,
    pub actions: Vec<RecoveryAction>,
}

impl RecoveryPanel {
    pub fn from_error(error: &anyhow::Error) -> Self {
        let classified = classify_error(error);
        let title = match aa_error_code(&classified.message) {
            Some(code) => format!("{code} wallet service error"),
            None => "Wallet client error".to_string(),
        };
        Self {
            title,
            detail: classified.message.clone(),
            hint: classified.user_message.clone(),
            classified,
            actions: vec![RecoveryAction::Reload, RecoveryAction::ClearStorageAndReload],
        }
    }

    /// Carry out the storage half of a recovery action. Reloading itself is
    /// the shell's job.
    pub fn perform(action: RecoveryAction, sessions: &SessionStore) -> Result<(), TesseraError> {
        match action {
            RecoveryAction::Reload => Ok(()),
            RecoveryAction::ClearStorageAndReload => sessions.wipe(),
        }
    }
}

/// Runs top-level work and converts errors and panics into a
/// [`RecoveryPanel`] instead of letting them take the process down.
pub struct ErrorBoundary;

impl ErrorBoundary {
    pub fn catch<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, RecoveryPanel> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("unhandled error reached the boundary: {e:#}");
                Err(RecoveryPanel::from_error(&e))
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());
                error!("panic reached the boundary: {message}");
                Err(RecoveryPanel::from_error(&anyhow::anyhow!(message)))
            }
        }
    }
}
