use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sdk::SdkError;

/// Stored when a failed call carries no usable message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

// ---------------------------------------------------------------------------
// Result slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Loading,
    Success,
    Error,
}

/// The last known outcome of a named action.
///
/// While a call is `Loading` the previous payload or error stays in place so
/// it can still be shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub name: String,
    pub status: ActionStatus,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ActionResult {
    fn loading(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ActionStatus::Loading,
            payload: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    fn settled(name: &str, outcome: Result<Value, String>) -> Self {
        let (status, payload, error) = match outcome {
            Ok(value) => (ActionStatus::Success, Some(value), None),
            Err(message) => (ActionStatus::Error, None, Some(message)),
        };
        Self {
            name: name.to_string(),
            status,
            payload,
            error,
            updated_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// Which settlement wins when calls under one name overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlePolicy {
    /// Only the most recently started call may write its outcome; older
    /// calls that settle later are discarded.
    #[default]
    LatestStarted,
    /// Whichever call settles last overwrites the slot, regardless of start
    /// order.
    LastSettled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    Started {
        name: String,
        ticket: u64,
    },
    Settled {
        name: String,
        ticket: u64,
        outcome: Result<Value, String>,
    },
    /// The owner of a call went away before it settled. A slot that was
    /// only loading for this call goes back to what it showed before.
    Abandoned {
        name: String,
        ticket: u64,
    },
    Clear {
        name: String,
    },
    ClearAll,
}

/// Per-action state. A plain reducer: no I/O, no clock other than the
/// `updated_at` stamp.
#[derive(Debug, Default)]
pub struct ActionBoard {
    policy: SettlePolicy,
    slots: BTreeMap<String, ActionResult>,
    /// Highest ticket started per name. Survives clears.
    latest: HashMap<String, u64>,
}

impl ActionBoard {
    pub fn new(policy: SettlePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> SettlePolicy {
        self.policy
    }

    /// Apply one event. Returns `false` when the event was discarded.
    pub fn apply(&mut self, event: ActionEvent) -> bool {
        match event {
            ActionEvent::Started { name, ticket } => {
                let latest = self.latest.entry(name.clone()).or_default();
                *latest = (*latest).max(ticket);
                let slot = self
                    .slots
                    .entry(name.clone())
                    .or_insert_with(|| ActionResult::loading(&name));
                slot.status = ActionStatus::Loading;
                slot.updated_at = Utc::now();
                true
            }
            ActionEvent::Settled {
                name,
                ticket,
                outcome,
            } => {
                if self.policy == SettlePolicy::LatestStarted && self.is_stale(&name, ticket) {
                    return false;
                }
                let result = ActionResult::settled(&name, outcome);
                self.slots.insert(name, result);
                true
            }
            ActionEvent::Abandoned { name, ticket } => {
                if self.is_stale(&name, ticket) {
                    return false;
                }
                match self.slots.get_mut(&name) {
                    Some(slot) if slot.status == ActionStatus::Loading => {
                        if slot.payload.is_some() {
                            slot.status = ActionStatus::Success;
                        } else if slot.error.is_some() {
                            slot.status = ActionStatus::Error;
                        } else {
                            self.slots.remove(&name);
                        }
                        true
                    }
                    _ => false,
                }
            }
            ActionEvent::Clear { name } => self.slots.remove(&name).is_some(),
            ActionEvent::ClearAll => {
                let had_any = !self.slots.is_empty();
                self.slots.clear();
                had_any
            }
        }
    }

    fn is_stale(&self, name: &str, ticket: u64) -> bool {
        self.latest.get(name).is_some_and(|latest| ticket < *latest)
    }

    pub fn get(&self, name: &str) -> Option<&ActionResult> {
        self.slots.get(name)
    }

    pub fn results(&self) -> impl Iterator<Item = &ActionResult> {
        self.slots.values()
    }
}

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

/// Extracts a displayable message from a failed call. `None` (or an empty
/// string) means the failure carried nothing usable.
pub trait FailureMessage {
    fn failure_message(&self) -> Option<String>;
}

impl FailureMessage for SdkError {
    fn failure_message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.api_message().map(String::from))
    }
}

impl FailureMessage for anyhow::Error {
    fn failure_message(&self) -> Option<String> {
        Some(format!("{self:#}"))
    }
}

impl FailureMessage for String {
    fn failure_message(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl FailureMessage for &str {
    fn failure_message(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

fn message_or_fallback<E: FailureMessage>(error: &E) -> String {
    error
        .failure_message()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// Strip one level of `{ "result": X }`. Objects with other keys are kept.
fn unwrap_result(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.len() == 1 && obj.contains_key("result") => {
            obj.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs SDK calls under an action name and tracks their loading, success
/// and error state.
///
/// Calls are never deduplicated or queued. What happens when two calls
/// under the same name overlap is decided by the [`SettlePolicy`].
pub struct ActionDispatcher {
    board: Mutex<ActionBoard>,
    next_ticket: AtomicU64,
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::with_policy(SettlePolicy::default())
    }

    pub fn with_policy(policy: SettlePolicy) -> Self {
        Self {
            board: Mutex::new(ActionBoard::new(policy)),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> SettlePolicy {
        self.board.lock().policy()
    }

    /// Run `call` under `name` and record its outcome.
    ///
    /// Returns this call's own outcome, which may differ from what the slot
    /// ends up holding if a newer call superseded it.
    pub async fn run<T, E, F>(&self, name: &str, call: F) -> ActionResult
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: FailureMessage,
    {
        let pending = self.start(name);
        let outcome = settle(call.await);
        self.finish(pending, outcome)
    }

    /// Like [`run`](Self::run), but the outcome is dropped if `scope` was
    /// cancelled before the call settled. The call itself always runs to
    /// completion.
    ///
    /// Dropping either future before it settles abandons the call, so the
    /// slot does not stay `Loading`.
    pub async fn run_scoped<T, E, F>(
        &self,
        name: &str,
        scope: &CancellationToken,
        call: F,
    ) -> Option<ActionResult>
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: FailureMessage,
    {
        let pending = self.start(name);
        let outcome = settle(call.await);
        if scope.is_cancelled() {
            debug!(action = name, ticket = pending.ticket, "scope cancelled, dropping result");
            return None;
        }
        Some(self.finish(pending, outcome))
    }

    fn start<'a>(&'a self, name: &'a str) -> PendingAction<'a> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        debug!(action = name, ticket, "action started");
        self.board.lock().apply(ActionEvent::Started {
            name: name.to_string(),
            ticket,
        });
        PendingAction {
            board: &self.board,
            name,
            ticket,
            settled: false,
        }
    }

    fn finish(&self, mut pending: PendingAction<'_>, outcome: Result<Value, String>) -> ActionResult {
        pending.settled = true;
        let (name, ticket) = (pending.name, pending.ticket);
        let own = ActionResult::settled(name, outcome.clone());
        let applied = self.board.lock().apply(ActionEvent::Settled {
            name: name.to_string(),
            ticket,
            outcome,
        });
        if applied {
            debug!(action = name, ticket, status = ?own.status, "action settled");
        } else {
            debug!(action = name, ticket, "superseded by a newer call, result discarded");
        }
        own
    }

    pub fn get(&self, name: &str) -> Option<ActionResult> {
        self.board.lock().get(name).cloned()
    }

    /// All slots, ordered by action name.
    pub fn snapshot(&self) -> Vec<ActionResult> {
        self.board.lock().results().cloned().collect()
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.board
            .lock()
            .get(name)
            .is_some_and(|r| r.status == ActionStatus::Loading)
    }

    pub fn clear(&self, name: &str) {
        self.board.lock().apply(ActionEvent::Clear {
            name: name.to_string(),
        });
    }

    pub fn clear_results(&self) {
        self.board.lock().apply(ActionEvent::ClearAll);
    }
}

/// A started call that has not settled yet. Dropped unsettled, it marks the
/// call abandoned.
struct PendingAction<'a> {
    board: &'a Mutex<ActionBoard>,
    name: &'a str,
    ticket: u64,
    settled: bool,
}

impl Drop for PendingAction<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(action = self.name, ticket = self.ticket, "action abandoned");
        self.board.lock().apply(ActionEvent::Abandoned {
            name: self.name.to_string(),
            ticket: self.ticket,
        });
    }
}

fn settle<T: Serialize, E: FailureMessage>(result: Result<T, E>) -> Result<Value, String> {
    match result {
        Ok(value) => serde_json::to_value(value)
            .map(unwrap_result)
            .map_err(|e| format!("Unreadable response: {e}")),
        Err(e) => Err(message_or_fallback(&e)),
    }
}
