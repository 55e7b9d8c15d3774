use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::catalog::{TokenInfo, account_address};
use crate::dispatcher::FailureMessage;
use crate::sdk::{
    JobId, RawCall, RawTransactionParams, SdkError, SignedUserOp, TokenTransferParams, UserOp,
    WalletSdk,
};

/// Chain used by the raw transaction form until the user picks another.
pub const DEFAULT_RAW_CAIP2: &str = "eip155:1";

/// Call data for a plain value transfer.
const EMPTY_CALLDATA: &str = "0x";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Please select a valid token")]
    MissingToken,

    #[error("Please enter a valid amount")]
    InvalidAmount,

    #[error("Amount has more decimal places ({places}) than the token supports ({decimals})")]
    TooManyDecimals { places: usize, decimals: u8 },

    #[error("Please enter a valid recipient address")]
    InvalidRecipient,

    #[error("Invalid value amount. Please enter a valid number.")]
    InvalidValue,

    #[error("Please select a network")]
    MissingNetwork,

    #[error("Unable to get account details. Please make sure you are logged in and try again.")]
    MissingSender,

    #[error("Please log in first")]
    NotLoggedIn,

    #[error("No transaction to sign")]
    NothingToSign,

    #[error("No signed transaction to execute")]
    NothingToExecute,

    #[error(transparent)]
    Sdk(#[from] SdkError),
}

impl FailureMessage for TransferError {
    fn failure_message(&self) -> Option<String> {
        match self {
            Self::Sdk(e) => e.failure_message(),
            other => Some(other.to_string()),
        }
    }
}

/// Scale a decimal amount to the token's smallest unit, e.g. `"1.5"` with 6
/// decimals becomes `"1500000"`.
///
/// Works on the digit string directly, so precision is never lost.
pub fn to_smallest_unit(amount: &str, decimals: u8) -> Result<String, TransferError> {
    let amount = amount.trim();
    let (int_part, frac_part) = amount.split_once('.').unwrap_or((amount, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(TransferError::InvalidAmount);
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(TransferError::InvalidAmount);
    }
    if frac_part.len() > usize::from(decimals) {
        return Err(TransferError::TooManyDecimals {
            places: frac_part.len(),
            decimals,
        });
    }

    let mut scaled = String::with_capacity(int_part.len() + usize::from(decimals));
    scaled.push_str(int_part);
    scaled.push_str(frac_part);
    scaled.extend(std::iter::repeat_n('0', usize::from(decimals) - frac_part.len()));

    let trimmed = scaled.trim_start_matches('0');
    if trimmed.is_empty() {
        return Err(TransferError::InvalidAmount);
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Token transfer
// ---------------------------------------------------------------------------

/// User input for a token transfer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferForm {
    pub token: Option<TokenInfo>,
    /// Human-readable decimal amount.
    pub amount: String,
    pub recipient: String,
    /// Target chain; the token's chain when empty.
    pub caip2_id: String,
}

impl TransferForm {
    pub fn validate(&self) -> Result<TokenTransferParams, TransferError> {
        let token = self.token.as_ref().ok_or(TransferError::MissingToken)?;
        let amount = to_smallest_unit(&self.amount, token.decimals)?;

        let recipient = self.recipient.trim();
        if !recipient.starts_with("0x") {
            return Err(TransferError::InvalidRecipient);
        }

        let caip2_id = match self.caip2_id.trim() {
            "" => token.caip_id.clone(),
            chain => chain.to_string(),
        };
        if caip2_id.is_empty() {
            return Err(TransferError::MissingNetwork);
        }

        Ok(TokenTransferParams {
            amount,
            recipient: recipient.to_string(),
            token: token.address.clone(),
            caip2_id,
        })
    }
}

/// Submit a transfer in one go. Native currency goes out as a raw value
/// transfer; tokens go through build, sign and execute.
pub async fn submit_transfer(
    sdk: &dyn WalletSdk,
    params: &TokenTransferParams,
) -> Result<JobId, TransferError> {
    let job_id = if params.is_native() {
        let raw = RawTransactionParams {
            caip2_id: params.caip2_id.clone(),
            from: None,
            transaction: RawCall {
                to: params.recipient.clone(),
                value: params.amount.clone(),
                data: EMPTY_CALLDATA.to_string(),
            },
        };
        sdk.evm_raw_transaction(&raw).await?
    } else {
        let op = sdk.token_transfer(params).await?;
        let signed = sdk.sign_user_op(&op).await?;
        sdk.execute_user_op(&signed).await?
    };
    info!(job = %job_id, chain = %params.caip2_id, native = params.is_native(), "transfer submitted");
    Ok(job_id)
}

/// The build, sign and execute steps of a token transfer, each triggered
/// separately so intermediate operations can be inspected.
#[derive(Debug, Default)]
pub struct TransferFlow {
    user_op: Option<UserOp>,
    signed: Option<SignedUserOp>,
    job_id: Option<JobId>,
}

impl TransferFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn build(
        &mut self,
        sdk: &dyn WalletSdk,
        params: &TokenTransferParams,
    ) -> Result<&UserOp, TransferError> {
        let op = sdk.token_transfer(params).await?;
        self.signed = None;
        self.job_id = None;
        Ok(&*self.user_op.insert(op))
    }

    pub async fn sign(&mut self, sdk: &dyn WalletSdk) -> Result<&SignedUserOp, TransferError> {
        let op = self.user_op.as_ref().ok_or(TransferError::NothingToSign)?;
        let signed = sdk.sign_user_op(op).await?;
        Ok(&*self.signed.insert(signed))
    }

    pub async fn execute(&mut self, sdk: &dyn WalletSdk) -> Result<JobId, TransferError> {
        let signed = self.signed.as_ref().ok_or(TransferError::NothingToExecute)?;
        let job_id = sdk.execute_user_op(signed).await?;
        info!(job = %job_id, "user operation executed");
        self.job_id = Some(job_id.clone());
        Ok(job_id)
    }

    pub fn user_op(&self) -> Option<&UserOp> {
        self.user_op.as_ref()
    }

    pub fn signed_user_op(&self) -> Option<&SignedUserOp> {
        self.signed.as_ref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Raw transaction
// ---------------------------------------------------------------------------

/// User input for an arbitrary EVM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionForm {
    pub caip2_id: String,
    pub to: String,
    /// Wei, as a decimal integer. Empty means zero.
    pub value: String,
    /// Hex call data. Empty means none.
    pub data: String,
}

impl Default for RawTransactionForm {
    fn default() -> Self {
        Self {
            caip2_id: DEFAULT_RAW_CAIP2.to_string(),
            to: String::new(),
            value: String::new(),
            data: String::new(),
        }
    }
}

impl RawTransactionForm {
    fn call(&self) -> Result<RawCall, TransferError> {
        let to = self.to.trim();
        if !to.starts_with("0x") {
            return Err(TransferError::InvalidRecipient);
        }

        let value = self.value.trim();
        let value = if value.is_empty() {
            "0".to_string()
        } else if value.bytes().all(|b| b.is_ascii_digit()) {
            match value.trim_start_matches('0') {
                "" => "0".to_string(),
                digits => digits.to_string(),
            }
        } else {
            return Err(TransferError::InvalidValue);
        };

        let data = match self.data.trim() {
            "" => EMPTY_CALLDATA.to_string(),
            data => data.to_string(),
        };

        Ok(RawCall {
            to: to.to_string(),
            value,
            data,
        })
    }

    fn chain(&self) -> String {
        match self.caip2_id.trim() {
            "" => DEFAULT_RAW_CAIP2.to_string(),
            chain => chain.to_string(),
        }
    }

    pub fn into_params(&self, from: Option<&str>) -> Result<RawTransactionParams, TransferError> {
        let transaction = self.call()?;
        let from = from
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or(TransferError::MissingSender)?;
        Ok(RawTransactionParams {
            caip2_id: self.chain(),
            from: Some(from.to_string()),
            transaction,
        })
    }
}

/// Validate the form, resolve the sender and submit.
pub async fn submit_raw_transaction(
    sdk: &dyn WalletSdk,
    form: &RawTransactionForm,
) -> Result<JobId, TransferError> {
    if !sdk.is_logged_in() {
        return Err(TransferError::NotLoggedIn);
    }
    form.call()?;

    let from = match sdk.user_address() {
        Some(address) => Some(address),
        None => account_address(&sdk.get_account().await?, Some(&form.chain())),
    };
    let params = form.into_params(from.as_deref())?;
    let job_id = sdk.evm_raw_transaction(&params).await?;
    info!(job = %job_id, chain = %params.caip2_id, "raw transaction submitted");
    Ok(job_id)
}
