use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

/// What the OAuth sign-in widget reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// Sign-in succeeded and produced an ID token.
    Credential(String),
    /// The widget failed; it carries no payload.
    Error,
}

/// Client-side state held by the identity provider (e.g. the Google
/// sign-in library's cached account).
pub trait IdentityProvider: Send + Sync {
    fn sign_out(&self);
}

// ---------------------------------------------------------------------------
// Wallet SDK types
// ---------------------------------------------------------------------------

/// Parameters for the SDK's OAuth login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthParams {
    pub id_token: String,
    pub provider: String,
}

impl OAuthParams {
    pub fn google(id_token: impl Into<String>) -> Self {
        Self {
            id_token: id_token.into(),
            provider: "google".into(),
        }
    }
}

/// Invoked by the SDK with the wallet session it created during login.
pub type SessionCallback = Box<dyn Fn(Value) + Send + Sync>;

/// Identifier of a submitted transaction whose outcome is polled for.
pub type JobId = String;

/// An unsigned user operation as built by the SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserOp(pub Value);

/// A user operation after the SDK signed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedUserOp(pub Value);

/// ERC-20 or native transfer. `amount` is in the token's smallest unit;
/// an empty `token` address means the chain's native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferParams {
    pub amount: String,
    pub recipient: String,
    pub token: String,
    #[serde(rename = "caip2Id")]
    pub caip2_id: String,
}

impl TokenTransferParams {
    pub fn is_native(&self) -> bool {
        self.token.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCall {
    pub to: String,
    /// Wei, as a decimal integer string.
    pub value: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionParams {
    #[serde(rename = "caip2Id")]
    pub caip2_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub transaction: RawCall,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A rejected SDK call.
///
/// `response_body` is the structured body of a failed API response when
/// there was one; its absence means the request never got a response.
#[derive(Debug, Clone, Default, thiserror::Error)]
#[error("{}", self.message.as_deref().unwrap_or("wallet SDK call failed"))]
pub struct SdkError {
    pub message: Option<String>,
    pub code: Option<String>,
    pub status: Option<u16>,
    pub response_body: Option<Value>,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A rejection that carries nothing at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_response(mut self, status: u16, body: Value) -> Self {
        self.status = Some(status);
        self.response_body = Some(body);
        self
    }

    /// `body.error.message`, the SDK backend's own description.
    pub fn api_message(&self) -> Option<&str> {
        self.response_body
            .as_ref()?
            .pointer("/error/message")?
            .as_str()
            .filter(|m| !m.is_empty())
    }

    /// `body.error.data`, where chain-level revert reasons end up.
    pub fn api_error_data(&self) -> Option<String> {
        let data = self.response_body.as_ref()?.pointer("/error/data")?;
        match data {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The wallet-as-a-service client. Authentication, key management, signing
/// and chain submission all happen behind this seam.
///
/// Read calls return the SDK's JSON as-is; its shape is not stable, which is
/// why [`crate::normalizer`] exists.
#[async_trait]
pub trait WalletSdk: Send + Sync {
    fn is_logged_in(&self) -> bool;

    /// Smart-wallet address of the signed-in user, if known.
    fn user_address(&self) -> Option<String>;

    async fn login_using_oauth(
        &self,
        params: OAuthParams,
        on_session: SessionCallback,
    ) -> Result<Value, SdkError>;

    async fn logout(&self) -> Result<(), SdkError>;

    /// Drop the SDK's local session without contacting the backend.
    fn session_clear(&self);

    async fn get_account(&self) -> Result<Value, SdkError>;
    async fn get_portfolio(&self) -> Result<Value, SdkError>;
    async fn get_tokens(&self) -> Result<Value, SdkError>;
    async fn get_chains(&self) -> Result<Value, SdkError>;
    async fn get_orders_history(&self) -> Result<Value, SdkError>;

    async fn token_transfer(&self, params: &TokenTransferParams) -> Result<UserOp, SdkError>;
    async fn evm_raw_transaction(&self, params: &RawTransactionParams) -> Result<JobId, SdkError>;
    async fn sign_user_op(&self, op: &UserOp) -> Result<SignedUserOp, SdkError>;
    async fn execute_user_op(&self, op: &SignedUserOp) -> Result<JobId, SdkError>;
}
