use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::fields::{first_string, list_payload};

/// A chain the wallet SDK can submit to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    /// CAIP-2 identifier, e.g. `eip155:137`.
    pub caip_id: String,
    pub network_name: String,
    pub chain_id: Option<String>,
    /// Whether the SDK's paymaster covers gas on this chain.
    pub sponsorship_enabled: bool,
}

/// A token the wallet SDK knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// Contract address; empty for the chain's native currency.
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub caip_id: String,
}

impl TokenInfo {
    pub fn is_native(&self) -> bool {
        self.address.is_empty()
    }
}

/// Parse `getChains` output. Entries without a CAIP id are skipped.
pub fn parse_chains(payload: &Value) -> Vec<ChainInfo> {
    list_payload(payload)
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let caip_id = first_string(obj, &["caipId", "caip2Id", "caip_id"])?;
            Some(ChainInfo {
                network_name: first_string(obj, &["networkName", "network_name", "name"])
                    .unwrap_or_else(|| caip_id.clone()),
                chain_id: first_string(obj, &["chainId", "chain_id"]),
                sponsorship_enabled: obj
                    .get("sponsorshipEnabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                caip_id,
            })
        })
        .collect()
}

/// Parse `getTokens` output. Entries without a symbol, CAIP id or decimals
/// are skipped.
pub fn parse_tokens(payload: &Value) -> Vec<TokenInfo> {
    list_payload(payload)
        .iter()
        .filter_map(Value::as_object)
        .filter_map(parse_token)
        .collect()
}

fn parse_token(obj: &Map<String, Value>) -> Option<TokenInfo> {
    let symbol = first_string(obj, &["symbol"])?;
    let caip_id = first_string(obj, &["caipId", "caip2Id", "caip_id"])?;
    let decimals = first_string(obj, &["decimals", "precision"])?.parse().ok()?;
    Some(TokenInfo {
        address: first_string(obj, &["address", "tokenAddress"]).unwrap_or_default(),
        name: first_string(obj, &["shortName", "name"]).unwrap_or_else(|| symbol.clone()),
        symbol,
        decimals,
        caip_id,
    })
}

pub fn tokens_for_chain<'a>(tokens: &'a [TokenInfo], caip_id: &str) -> Vec<&'a TokenInfo> {
    tokens.iter().filter(|t| t.caip_id == caip_id).collect()
}

pub fn find_token<'a>(tokens: &'a [TokenInfo], caip_id: &str, symbol: &str) -> Option<&'a TokenInfo> {
    tokens
        .iter()
        .find(|t| t.caip_id == caip_id && t.symbol == symbol)
}

pub fn find_chain<'a>(chains: &'a [ChainInfo], caip_id: &str) -> Option<&'a ChainInfo> {
    chains.iter().find(|c| c.caip_id == caip_id)
}

/// The wallet address in a `getAccount` response.
///
/// The SDK returns either a single `{ address }` object or one entry per
/// network; with `caip_id` the matching network's entry is preferred.
pub fn account_address(account: &Value, caip_id: Option<&str>) -> Option<String> {
    if let Some(address) = account.as_object().and_then(|obj| first_string(obj, &["address"])) {
        return Some(address);
    }

    let entries: Vec<&Map<String, Value>> = list_payload(account)
        .iter()
        .filter_map(Value::as_object)
        .collect();

    let matching = caip_id.and_then(|caip| {
        entries
            .iter()
            .find(|e| first_string(e, &["caipId", "caip2Id"]).as_deref() == Some(caip))
            .and_then(|e| first_string(e, &["address"]))
    });
    matching.or_else(|| entries.iter().find_map(|e| first_string(e, &["address"])))
}

// ---------------------------------------------------------------------------
// Block explorers
// ---------------------------------------------------------------------------

const DEFAULT_EXPLORER: &str = "https://polygonscan.com/tx/";

fn explorer_base(network: &str) -> Option<&'static str> {
    let base = match network.trim().to_ascii_lowercase().as_str() {
        "polygon" | "matic" | "eip155:137" => "https://polygonscan.com/tx/",
        "ethereum" | "eth" | "eip155:1" => "https://etherscan.io/tx/",
        "base" | "eip155:8453" => "https://basescan.org/tx/",
        "arbitrum" | "eip155:42161" => "https://arbiscan.io/tx/",
        _ => return None,
    };
    Some(base)
}

/// Explorer link for a transaction hash. Unknown or missing networks fall
/// back to Polygon. Returns `None` for an empty or non-path-safe hash.
pub fn explorer_tx_url(network: Option<&str>, tx_hash: &str) -> Option<String> {
    let hash = tx_hash.trim();
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let base = network.and_then(explorer_base).unwrap_or(DEFAULT_EXPLORER);
    Url::parse(base).ok()?.join(hash).ok().map(String::from)
}
