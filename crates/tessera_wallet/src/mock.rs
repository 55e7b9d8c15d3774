//! Scriptable in-memory [`WalletSdk`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::sdk::{
    IdentityProvider, JobId, OAuthParams, RawTransactionParams, SdkError, SessionCallback,
    SignedUserOp, TokenTransferParams, UserOp, WalletSdk,
};

pub(crate) struct MockSdk {
    /// Queued results per method; the last one repeats once the queue is
    /// down to a single entry.
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Value, SdkError>>>>,
    /// What the login call hands to the session callback. `None` means the
    /// callback is never invoked.
    session: Mutex<Option<Value>>,
    calls: Mutex<Vec<String>>,
    /// Parameters of write calls, serialized.
    requests: Mutex<Vec<(String, Value)>>,
    logged_in: AtomicBool,
    address: Mutex<Option<String>>,
    login_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockSdk {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            session: Mutex::new(Some(json!({ "sessionKey": "sk-1", "userSWA": "0xuser" }))),
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            logged_in: AtomicBool::new(false),
            address: Mutex::new(None),
            login_gate: Mutex::new(None),
        }
    }

    pub fn respond(&self, method: &'static str, result: Result<Value, SdkError>) {
        self.responses.lock().entry(method).or_default().push_back(result);
    }

    pub fn set_session(&self, session: Option<Value>) {
        *self.session.lock() = session;
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    pub fn set_address(&self, address: Option<&str>) {
        *self.address.lock() = address.map(String::from);
    }

    /// Hold login calls until the returned handle is notified.
    pub fn gate_login(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.login_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == method).count()
    }

    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn record<T: serde::Serialize>(&self, method: &str, params: &T) {
        let value = serde_json::to_value(params).unwrap_or(Value::Null);
        self.requests.lock().push((method.to_string(), value));
    }

    fn next(&self, method: &'static str) -> Result<Value, SdkError> {
        self.calls.lock().push(method.to_string());
        let mut responses = self.responses.lock();
        match responses.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(Value::Null)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(Value::Null)),
            None => Ok(default_response(method)),
        }
    }
}

fn default_response(method: &str) -> Value {
    match method {
        "tokenTransfer" => json!({ "callData": "0xunsigned" }),
        "signUserOp" => json!({ "callData": "0xunsigned", "signature": "0xsig" }),
        "executeUserOp" | "evmRawTransaction" => json!("job-1"),
        "loginUsingOAuth" => json!({ "userSWA": "0xuser" }),
        _ => json!({}),
    }
}

fn job_id(value: Value) -> Result<JobId, SdkError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(SdkError::new(format!("unexpected job id: {other}"))),
    }
}

#[async_trait]
impl WalletSdk for MockSdk {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn user_address(&self) -> Option<String> {
        self.address.lock().clone()
    }

    async fn login_using_oauth(
        &self,
        params: OAuthParams,
        on_session: SessionCallback,
    ) -> Result<Value, SdkError> {
        self.record("loginUsingOAuth", &params);
        let gate = self.login_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let result = self.next("loginUsingOAuth")?;
        let session = self.session.lock().clone();
        if let Some(session) = session {
            on_session(session);
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(result)
    }

    async fn logout(&self) -> Result<(), SdkError> {
        self.logged_in.store(false, Ordering::SeqCst);
        self.next("logout").map(|_| ())
    }

    fn session_clear(&self) {
        self.calls.lock().push("sessionClear".into());
        self.logged_in.store(false, Ordering::SeqCst);
    }

    async fn get_account(&self) -> Result<Value, SdkError> {
        self.next("getAccount")
    }

    async fn get_portfolio(&self) -> Result<Value, SdkError> {
        self.next("getPortfolio")
    }

    async fn get_tokens(&self) -> Result<Value, SdkError> {
        self.next("getTokens")
    }

    async fn get_chains(&self) -> Result<Value, SdkError> {
        self.next("getChains")
    }

    async fn get_orders_history(&self) -> Result<Value, SdkError> {
        self.next("getOrdersHistory")
    }

    async fn token_transfer(&self, params: &TokenTransferParams) -> Result<UserOp, SdkError> {
        self.record("tokenTransfer", params);
        self.next("tokenTransfer").map(UserOp)
    }

    async fn evm_raw_transaction(&self, params: &RawTransactionParams) -> Result<JobId, SdkError> {
        self.record("evmRawTransaction", params);
        self.next("evmRawTransaction").and_then(job_id)
    }

    async fn sign_user_op(&self, _op: &UserOp) -> Result<SignedUserOp, SdkError> {
        self.next("signUserOp").map(SignedUserOp)
    }

    async fn execute_user_op(&self, _op: &SignedUserOp) -> Result<JobId, SdkError> {
        self.next("executeUserOp").and_then(job_id)
    }
}

#[derive(Default)]
pub(crate) struct MockIdentity {
    pub sign_outs: Mutex<usize>,
}

impl IdentityProvider for MockIdentity {
    fn sign_out(&self) {
        *self.sign_outs.lock() += 1;
    }
}
