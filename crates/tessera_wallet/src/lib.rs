// Embedded-wallet client: login orchestration, SDK call dispatch, and
// normalization of wallet SDK responses.

pub mod app;
pub mod auth;
pub mod catalog;
pub mod diagnostics;
pub mod dispatcher;
mod fields;
pub mod normalizer;
pub mod sdk;
pub mod tracker;
pub mod transfer;

#[cfg(test)]
pub(crate) mod mock;

// Re-export primary types for convenient access.
pub use app::WalletApp;
pub use auth::{
    AuthEvent, AuthFailure, AuthFailureKind, AuthOrchestrator, AuthState, LoginOutcome,
    Navigation, Route, classify_login_error, guard_route,
};
pub use catalog::{ChainInfo, TokenInfo, account_address, explorer_tx_url, parse_chains, parse_tokens};
pub use diagnostics::{ClientStatus, LoginProbe, ProbeStep, StepStatus, client_status, probe_login};
pub use dispatcher::{
    ActionBoard, ActionDispatcher, ActionEvent, ActionResult, ActionStatus, FailureMessage,
    SettlePolicy, UNKNOWN_ERROR,
};
pub use normalizer::{JobStatus, TransactionRecord, classify_status, find_record, normalize_transactions};
pub use sdk::{
    IdentityEvent, IdentityProvider, JobId, OAuthParams, RawCall, RawTransactionParams,
    SessionCallback, SdkError, SignedUserOp, TokenTransferParams, UserOp, WalletSdk,
};
pub use tracker::{JobTracker, JobWatch, WatchUpdate};
pub use transfer::{
    RawTransactionForm, TransferError, TransferFlow, TransferForm, submit_raw_transaction,
    submit_transfer, to_smallest_unit,
};
