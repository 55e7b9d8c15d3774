use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tessera_core::TesseraConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{AuthOrchestrator, AuthState, LoginOutcome, Navigation, Route};
use crate::catalog::{ChainInfo, TokenInfo, parse_chains, parse_tokens};
use crate::dispatcher::{ActionDispatcher, ActionResult, FailureMessage};
use crate::normalizer::{TransactionRecord, normalize_transactions};
use crate::sdk::WalletSdk;
use crate::tracker::{JobTracker, JobWatch};
use crate::transfer::{RawTransactionForm, TransferForm, submit_raw_transaction, submit_transfer};

/// Action names used for the dispatcher slots.
pub mod actions {
    pub const GET_ACCOUNT: &str = "getAccount";
    pub const GET_PORTFOLIO: &str = "getPortfolio";
    pub const GET_TOKENS: &str = "getTokens";
    pub const GET_CHAINS: &str = "getChains";
    pub const GET_ORDERS_HISTORY: &str = "getOrdersHistory";
    pub const TOKEN_TRANSFER: &str = "tokenTransfer";
    pub const RAW_TRANSACTION: &str = "rawTransaction";
}

/// The signed-in home screen: every SDK call goes through the dispatcher,
/// scoped to the current view so results arriving after logout are dropped.
pub struct WalletApp {
    sdk: Arc<dyn WalletSdk>,
    auth: Arc<AuthOrchestrator>,
    dispatcher: ActionDispatcher,
    tracker: JobTracker,
    history_limit: usize,
    scope: Mutex<CancellationToken>,
}

impl WalletApp {
    pub fn new(sdk: Arc<dyn WalletSdk>, auth: Arc<AuthOrchestrator>, config: &TesseraConfig) -> Self {
        let tracker = JobTracker::new(sdk.clone())
            .with_interval(Duration::from_secs(config.poll_interval_secs.max(1)));
        Self {
            sdk,
            auth,
            dispatcher: ActionDispatcher::new(),
            tracker,
            history_limit: config.history_display_limit,
            scope: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn auth(&self) -> &AuthOrchestrator {
        &self.auth
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    /// Startup hook: restore a persisted session if there is one.
    pub async fn start(&self) -> Option<LoginOutcome> {
        self.auth.restore_session().await
    }

    pub fn route(&self, requested: Route) -> Route {
        self.auth.route(requested)
    }

    async fn dispatch<T, E, F>(&self, name: &str, call: F) -> Option<ActionResult>
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: FailureMessage,
    {
        let scope = self.scope.lock().clone();
        self.dispatcher.run_scoped(name, &scope, call).await
    }

    pub async fn get_account(&self) -> Option<ActionResult> {
        self.dispatch(actions::GET_ACCOUNT, self.sdk.get_account()).await
    }

    pub async fn get_portfolio(&self) -> Option<ActionResult> {
        self.dispatch(actions::GET_PORTFOLIO, self.sdk.get_portfolio()).await
    }

    pub async fn get_tokens(&self) -> Option<ActionResult> {
        self.dispatch(actions::GET_TOKENS, self.sdk.get_tokens()).await
    }

    pub async fn get_chains(&self) -> Option<ActionResult> {
        self.dispatch(actions::GET_CHAINS, self.sdk.get_chains()).await
    }

    pub async fn get_orders_history(&self) -> Option<ActionResult> {
        self.dispatch(actions::GET_ORDERS_HISTORY, self.sdk.get_orders_history())
            .await
    }

    /// Load everything the home screen shows, concurrently. Each call lands
    /// in its own slot; a failure in one does not hold up the others.
    pub async fn refresh(&self) {
        let _ = futures::join!(
            self.get_account(),
            self.get_portfolio(),
            self.get_tokens(),
            self.get_chains(),
            self.get_orders_history(),
        );
    }

    /// Validate and submit a transfer. The payload is the job id.
    pub async fn transfer(&self, form: &TransferForm) -> Option<ActionResult> {
        let sdk = self.sdk.as_ref();
        self.dispatch(actions::TOKEN_TRANSFER, async move {
            let params = form.validate()?;
            submit_transfer(sdk, &params).await
        })
        .await
    }

    pub async fn raw_transaction(&self, form: &RawTransactionForm) -> Option<ActionResult> {
        self.dispatch(
            actions::RAW_TRANSACTION,
            submit_raw_transaction(self.sdk.as_ref(), form),
        )
        .await
    }

    fn payload_of(&self, name: &str) -> Option<serde_json::Value> {
        self.dispatcher
            .get(name)
            .filter(ActionResult::is_success)
            .and_then(|r| r.payload)
    }

    /// Chains from the last successful `getChains`.
    pub fn chains(&self) -> Vec<ChainInfo> {
        self.payload_of(actions::GET_CHAINS)
            .map(|p| parse_chains(&p))
            .unwrap_or_default()
    }

    /// Tokens from the last successful `getTokens`.
    pub fn tokens(&self) -> Vec<TokenInfo> {
        self.payload_of(actions::GET_TOKENS)
            .map(|p| parse_tokens(&p))
            .unwrap_or_default()
    }

    /// Records from the last successful `getOrdersHistory`.
    pub fn order_history(&self) -> Vec<TransactionRecord> {
        self.payload_of(actions::GET_ORDERS_HISTORY)
            .map(|p| normalize_transactions(&p))
            .unwrap_or_default()
    }

    /// The first records of [`order_history`](Self::order_history), as many
    /// as the configured display limit.
    pub fn recent_orders(&self) -> Vec<TransactionRecord> {
        let mut records = self.order_history();
        records.truncate(self.history_limit);
        records
    }

    pub fn track_job(&self, job_id: impl Into<String>) -> JobWatch {
        self.tracker.watch(job_id)
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn clear_results(&self) {
        self.dispatcher.clear_results();
    }

    /// Tear the home view down and sign out.
    pub async fn logout(&self) -> Navigation {
        {
            let mut scope = self.scope.lock();
            scope.cancel();
            *scope = CancellationToken::new();
        }
        self.dispatcher.clear_results();
        let nav = self.auth.logout().await;
        info!("home view torn down");
        nav
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ActionStatus;
    use crate::mock::MockSdk;
    use crate::sdk::SdkError;
    use serde_json::json;
    use tessera_core::{MemoryStore, SessionStore};

    fn app_with(sdk: &Arc<MockSdk>) -> WalletApp {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()));
        let auth = Arc::new(AuthOrchestrator::new(sdk.clone(), sessions));
        let config = TesseraConfig {
            history_display_limit: 2,
            ..Default::default()
        };
        WalletApp::new(sdk.clone(), auth, &config)
    }

    #[tokio::test]
    async fn reads_go_through_named_slots() {
        let sdk = Arc::new(MockSdk::new());
        sdk.respond("getPortfolio", Ok(json!({ "result": { "total": "12.5" } })));
        sdk.respond("getAccount", Err(SdkError::empty()));
        let app = app_with(&sdk);

        app.get_portfolio().await.unwrap();
        app.get_account().await.unwrap();

        let portfolio = app.dispatcher().get(actions::GET_PORTFOLIO).unwrap();
        assert_eq!(portfolio.payload, Some(json!({ "total": "12.5" })));
        let account = app.dispatcher().get(actions::GET_ACCOUNT).unwrap();
        assert_eq!(account.status, ActionStatus::Error);
        assert_eq!(account.error.as_deref(), Some("Unknown error"));
    }

    #[tokio::test]
    async fn refresh_fills_every_slot() {
        let sdk = Arc::new(MockSdk::new());
        sdk.respond("getTokens", Err(SdkError::new("tokens unavailable")));
        let app = app_with(&sdk);

        app.refresh().await;

        let names: Vec<_> = app.dispatcher().snapshot().into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            ["getAccount", "getChains", "getOrdersHistory", "getPortfolio", "getTokens"]
        );
        let tokens = app.dispatcher().get(actions::GET_TOKENS).unwrap();
        assert_eq!(tokens.error.as_deref(), Some("tokens unavailable"));
        assert!(app.dispatcher().get(actions::GET_CHAINS).unwrap().is_success());
    }

    #[tokio::test]
    async fn history_is_normalized_and_limited() {
        let sdk = Arc::new(MockSdk::new());
        sdk.respond(
            "getOrdersHistory",
            Ok(json!({ "data": [{ "jobId": "a" }, { "jobId": "b" }, { "jobId": "c" }] })),
        );
        let app = app_with(&sdk);
        assert!(app.order_history().is_empty());

        app.get_orders_history().await;
        assert_eq!(app.order_history().len(), 3);
        let recent: Vec<_> = app.recent_orders().into_iter().map(|r| r.job_id).collect();
        assert_eq!(recent, ["a", "b"]);
    }

    #[tokio::test]
    async fn catalog_views_follow_slots() {
        let sdk = Arc::new(MockSdk::new());
        sdk.respond("getChains", Ok(json!([{ "caipId": "eip155:137", "networkName": "POLYGON" }])));
        sdk.respond(
            "getTokens",
            Ok(json!([{ "address": "", "symbol": "POL", "decimals": 18, "caipId": "eip155:137" }])),
        );
        let app = app_with(&sdk);

        app.get_chains().await;
        app.get_tokens().await;
        assert_eq!(app.chains()[0].network_name, "POLYGON");
        assert!(app.tokens()[0].is_native());
    }

    #[tokio::test]
    async fn transfer_validation_errors_land_in_the_slot() {
        let sdk = Arc::new(MockSdk::new());
        let app = app_with(&sdk);

        let result = app.transfer(&TransferForm::default()).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("Please select a valid token"));
        assert!(sdk.calls().is_empty());
    }

    #[tokio::test]
    async fn transfer_records_job_id() {
        let sdk = Arc::new(MockSdk::new());
        let app = app_with(&sdk);
        let form = TransferForm {
            token: Some(TokenInfo {
                address: "0xusdc".into(),
                symbol: "USDC".into(),
                name: "USD Coin".into(),
                decimals: 6,
                caip_id: "eip155:137".into(),
            }),
            amount: "3".into(),
            recipient: "0xfriend".into(),
            caip2_id: String::new(),
        };
        app.transfer(&form).await.unwrap();
        assert_eq!(
            app.dispatcher().get(actions::TOKEN_TRANSFER).unwrap().payload,
            Some(json!("job-1"))
        );
    }

    #[tokio::test]
    async fn logout_clears_results_and_routes_to_login() {
        let sdk = Arc::new(MockSdk::new());
        let app = app_with(&sdk);
        app.auth().begin_login("id-token").await;
        assert_eq!(app.route(Route::Login), Route::Home);

        app.get_portfolio().await;
        assert!(!app.dispatcher().snapshot().is_empty());

        assert_eq!(app.logout().await, Navigation::To(Route::Login));
        assert!(app.dispatcher().snapshot().is_empty());
        assert_eq!(app.route(Route::Home), Route::Login);

        // A fresh scope is in place after logout.
        app.get_portfolio().await.unwrap();
        assert!(app.dispatcher().get(actions::GET_PORTFOLIO).is_some());
    }
}
