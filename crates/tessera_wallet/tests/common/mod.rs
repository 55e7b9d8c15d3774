#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tessera_core::{MemoryStore, SessionStore};
use tessera_wallet::{
    AuthOrchestrator, JobId, OAuthParams, RawTransactionParams, SdkError, SessionCallback,
    SignedUserOp, TokenTransferParams, UserOp, WalletSdk,
};

/// Wallet SDK double: scripted responses per method, a call log, and a
/// login that hands `session` to the callback when set.
pub struct StubSdk {
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Value, SdkError>>>>,
    pub session: Mutex<Option<Value>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub requests: Mutex<Vec<Value>>,
    logged_in: AtomicBool,
}

impl StubSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            session: Mutex::new(Some(json!({ "sessionKey": "sk", "userSWA": "0xuser" }))),
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            logged_in: AtomicBool::new(false),
        })
    }

    /// Queue a response; the last queued one repeats.
    pub fn script(&self, method: &'static str, result: Result<Value, SdkError>) {
        self.responses.lock().entry(method).or_default().push_back(result);
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == method).count()
    }

    fn answer(&self, method: &'static str, fallback: Value) -> Result<Value, SdkError> {
        self.calls.lock().push(method);
        let mut responses = self.responses.lock();
        match responses.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Ok(fallback),
        }
    }
}

fn as_job(value: Value) -> Result<JobId, SdkError> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| SdkError::new("job id missing"))
}

#[async_trait]
impl WalletSdk for StubSdk {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn user_address(&self) -> Option<String> {
        None
    }

    async fn login_using_oauth(
        &self,
        _params: OAuthParams,
        on_session: SessionCallback,
    ) -> Result<Value, SdkError> {
        let result = self.answer("loginUsingOAuth", json!({ "status": "ok" }))?;
        if let Some(session) = self.session.lock().clone() {
            on_session(session);
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(result)
    }

    async fn logout(&self) -> Result<(), SdkError> {
        self.logged_in.store(false, Ordering::SeqCst);
        self.answer("logout", Value::Null).map(|_| ())
    }

    fn session_clear(&self) {
        self.calls.lock().push("sessionClear");
        self.logged_in.store(false, Ordering::SeqCst);
    }

    async fn get_account(&self) -> Result<Value, SdkError> {
        self.answer("getAccount", json!([{ "caipId": "eip155:1", "address": "0xuser" }]))
    }

    async fn get_portfolio(&self) -> Result<Value, SdkError> {
        self.answer("getPortfolio", json!({}))
    }

    async fn get_tokens(&self) -> Result<Value, SdkError> {
        self.answer("getTokens", json!([]))
    }

    async fn get_chains(&self) -> Result<Value, SdkError> {
        self.answer("getChains", json!([]))
    }

    async fn get_orders_history(&self) -> Result<Value, SdkError> {
        self.answer("getOrdersHistory", json!([]))
    }

    async fn token_transfer(&self, params: &TokenTransferParams) -> Result<UserOp, SdkError> {
        self.requests.lock().push(serde_json::to_value(params).unwrap());
        self.answer("tokenTransfer", json!({ "callData": "0x01" })).map(UserOp)
    }

    async fn evm_raw_transaction(&self, params: &RawTransactionParams) -> Result<JobId, SdkError> {
        self.requests.lock().push(serde_json::to_value(params).unwrap());
        self.answer("evmRawTransaction", json!("raw-job")).and_then(as_job)
    }

    async fn sign_user_op(&self, op: &UserOp) -> Result<SignedUserOp, SdkError> {
        let mut signed = op.0.clone();
        signed["signature"] = json!("0xsig");
        self.answer("signUserOp", signed).map(SignedUserOp)
    }

    async fn execute_user_op(&self, _op: &SignedUserOp) -> Result<JobId, SdkError> {
        self.answer("executeUserOp", json!("op-job")).and_then(as_job)
    }
}

pub fn memory_auth(sdk: Arc<StubSdk>) -> (Arc<MemoryStore>, Arc<AuthOrchestrator>) {
    let storage = Arc::new(MemoryStore::new());
    let auth = AuthOrchestrator::new(sdk, SessionStore::new(storage.clone()));
    (storage, Arc::new(auth))
}
