use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error_handler::TesseraError;
use crate::secure_storage::fingerprint;
use crate::storage::KeyValueStore;

type Result<T> = std::result::Result<T, TesseraError>;

/// Storage key holding the identity provider credential (an OAuth ID token).
pub const IDENTITY_TOKEN_KEY: &str = "identity_token";
/// Storage key holding the serialized [`Session`].
pub const WALLET_SESSION_KEY: &str = "wallet_session";

/// A wallet session handed back by the wallet SDK after login.
///
/// `token` is opaque to this crate; it is whatever the SDK's session
/// callback produced, serialized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persists the identity credential and the wallet session so a reload can
/// restore the signed-in state.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub fn save_identity_token(&self, token: &str) -> Result<()> {
        debug!(token = %fingerprint(token), "storing identity token");
        self.storage
            .set(IDENTITY_TOKEN_KEY, token)
            .map_err(storage_error("Failed to store identity token"))
    }

    /// The stored identity token. Empty values read as `None`.
    pub fn identity_token(&self) -> Result<Option<String>> {
        Ok(self
            .storage
            .get(IDENTITY_TOKEN_KEY)
            .map_err(storage_error("Failed to read identity token"))?
            .filter(|t| !t.is_empty()))
    }

    pub fn clear_identity_token(&self) -> Result<()> {
        self.storage
            .remove(IDENTITY_TOKEN_KEY)
            .map_err(storage_error("Failed to remove identity token"))
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let content = serde_json::to_string(session)
            .map_err(|e| TesseraError::Storage(format!("Failed to serialize wallet session: {e}")))?;
        self.storage
            .set(WALLET_SESSION_KEY, &content)
            .map_err(storage_error("Failed to store wallet session"))
    }

    /// The stored session, or `None` when absent or unreadable. A corrupt
    /// entry is logged and otherwise ignored.
    pub fn session(&self) -> Result<Option<Session>> {
        let Some(content) = self
            .storage
            .get(WALLET_SESSION_KEY)
            .map_err(storage_error("Failed to read wallet session"))?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("ignoring unreadable wallet session: {e}");
                Ok(None)
            }
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        self.storage
            .remove(WALLET_SESSION_KEY)
            .map_err(storage_error("Failed to remove wallet session"))
    }

    /// Remove both the identity token and the session. Both removals are
    /// attempted; the first failure is returned.
    pub fn clear_all(&self) -> Result<()> {
        let token = self.clear_identity_token();
        let session = self.clear_session();
        token.and(session)
    }

    /// Drop everything in the underlying storage, not only the keys this
    /// store owns. Used by the "clear storage and reload" recovery action.
    pub fn wipe(&self) -> Result<()> {
        self.storage
            .clear()
            .map_err(storage_error("Failed to clear storage"))
    }
}

fn storage_error(action: &'static str) -> impl FnOnce(anyhow::Error) -> TesseraError {
    move |e| TesseraError::Storage(format!("{action}: {e:#}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
