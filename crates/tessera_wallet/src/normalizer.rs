//! Converts order/transaction history from the wallet SDK into a single
//! canonical list.
//!
//! The SDK returns history in several shapes: a bare array, an object
//! wrapping a `data` array, an object keyed by transaction-like entries, or
//! entries that carry their own nested `transactions` list. Everything past
//! this module works with [`TransactionRecord`] only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fields::{first_string, has_any, scalar_string};

const JOB_ID_KEYS: &[&str] = &["jobId", "id", "orderId", "job_id", "intentId", "intent_id", "order_id"];
const HASH_KEYS: &[&str] = &["transactionHash", "txHash", "hash", "tx_hash", "transaction_hash"];
const STATUS_KEYS: &[&str] = &["status", "state", "orderState"];
const NETWORK_KEYS: &[&str] = &["network", "networkName", "caip2Id", "caipId", "chain"];
const AMOUNT_KEYS: &[&str] = &["amount", "value", "quantity"];
const TOKEN_KEYS: &[&str] = &["token", "symbol", "tokenSymbol", "tokenAddress"];
const FROM_KEYS: &[&str] = &["fromAddress", "from", "sender"];
const TO_KEYS: &[&str] = &["toAddress", "to", "recipient"];
const CREATED_KEYS: &[&str] = &["createdAt", "timestamp", "created_at"];

/// Keys under which an entry may carry its own list of transactions.
const NESTED_LIST_KEYS: &[&str] = &["transactions", "orders", "history", "items", "records"];

/// Key under which a canonical record keeps the payload it came from.
const RAW_SOURCE_KEY: &str = "rawSource";

/// Status written when the source carries none.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// One order or transaction, as the rest of the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Never empty.
    pub job_id: String,
    pub status: String,
    pub network: Option<String>,
    pub amount: Option<String>,
    pub token: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub raw_source: Value,
}

impl TransactionRecord {
    pub fn job_status(&self) -> JobStatus {
        classify_status(&self.status)
    }

    /// Block explorer link for the transaction, once it has a hash.
    pub fn explorer_url(&self) -> Option<String> {
        let hash = self.transaction_hash.as_deref()?;
        crate::catalog::explorer_tx_url(self.network.as_deref(), hash)
    }
}

/// Coarse lifecycle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
    Unknown,
}

impl JobStatus {
    /// Whether the job can still change state.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Map a status string from the SDK onto [`JobStatus`]. Case-insensitive.
pub fn classify_status(status: &str) -> JobStatus {
    match status.trim().to_ascii_lowercase().as_str() {
        "pending" | "processing" | "in_progress" => JobStatus::Pending,
        "completed" | "success" | "confirmed" => JobStatus::Succeeded,
        "failed" | "error" | "rejected" => JobStatus::Failed,
        _ => JobStatus::Unknown,
    }
}

/// Normalize any history payload into canonical records.
///
/// Source order is preserved: array order for arrays, key order for
/// objects. Entries without an identifier are dropped. The function is
/// pure, and feeding its serialized output back in yields the same list.
pub fn normalize_transactions(payload: &Value) -> Vec<TransactionRecord> {
    let mut raw = Vec::new();
    collect_raw(payload, &mut raw);
    raw.into_iter().filter_map(to_record).collect()
}

/// Look a job up by its canonical id or by the raw `id`/`orderId` it was
/// reported under.
pub fn find_record<'a>(records: &'a [TransactionRecord], id: &str) -> Option<&'a TransactionRecord> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    records.iter().find(|r| {
        r.job_id == id
            || ["jobId", "id", "orderId"].iter().any(|k| {
                r.raw_source
                    .get(*k)
                    .and_then(scalar_string)
                    .is_some_and(|v| v == id)
            })
    })
}

fn is_record_like(obj: &Map<String, Value>) -> bool {
    has_any(obj, JOB_ID_KEYS) || has_any(obj, HASH_KEYS)
}

fn nested_list(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    NESTED_LIST_KEYS.iter().find_map(|k| obj.get(*k)?.as_array())
}

fn collect_raw<'a>(payload: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match payload {
        Value::Array(items) => push_objects(items, out),
        Value::Object(obj) => {
            let start = out.len();
            let record_like = is_record_like(obj);
            // Under an identified envelope only nested lists count; an object
            // entry there (`chain: { id: 137 }`) belongs to the envelope.
            for value in obj.values() {
                match value {
                    Value::Array(items) => push_objects(items, out),
                    Value::Object(entry) => collect_entry(entry, !record_like, out),
                    _ => {}
                }
            }
            if record_like && !out[start..].iter().any(|entry| is_record_like(entry)) {
                out.truncate(start);
                out.push(obj);
            }
        }
        _ => {}
    }
}

/// An object found under some key of the top-level mapping.
fn collect_entry<'a>(
    entry: &'a Map<String, Value>,
    keep_records: bool,
    out: &mut Vec<&'a Map<String, Value>>,
) {
    if let Some(items) = nested_list(entry) {
        push_objects(items, out);
    } else if keep_records && is_record_like(entry) {
        out.push(entry);
    } else if let Some(Value::Object(inner)) = entry.get("data") {
        // `{ data: { orders: [...] } }`
        collect_entry(inner, keep_records, out);
    }
}

fn push_objects<'a>(items: &'a [Value], out: &mut Vec<&'a Map<String, Value>>) {
    out.extend(items.iter().filter_map(Value::as_object));
}

fn to_record(obj: &Map<String, Value>) -> Option<TransactionRecord> {
    let transaction_hash = first_string(obj, HASH_KEYS);
    let job_id = first_string(obj, JOB_ID_KEYS).or_else(|| transaction_hash.clone())?;

    let raw_source = match obj.get(RAW_SOURCE_KEY) {
        Some(source) if !source.is_null() => source.clone(),
        _ => Value::Object(obj.clone()),
    };

    Some(TransactionRecord {
        job_id,
        status: first_string(obj, STATUS_KEYS).unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        network: first_string(obj, NETWORK_KEYS),
        amount: first_string(obj, AMOUNT_KEYS),
        token: first_string(obj, TOKEN_KEYS),
        from_address: first_string(obj, FROM_KEYS),
        to_address: first_string(obj, TO_KEYS),
        transaction_hash,
        created_at: CREATED_KEYS.iter().find_map(|k| obj.get(*k).and_then(parse_timestamp)),
        raw_source,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<i64>().ok().and_then(from_epoch)
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
