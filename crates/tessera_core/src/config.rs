use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error_handler::TesseraError;
use crate::secure_storage::SecureStorage;

pub const ENV_ENVIRONMENT: &str = "TESSERA_ENVIRONMENT";
pub const ENV_CLIENT_PRIVATE_KEY: &str = "TESSERA_CLIENT_PRIVATE_KEY";
pub const ENV_CLIENT_SWA: &str = "TESSERA_CLIENT_SWA";
pub const ENV_GOOGLE_CLIENT_ID: &str = "TESSERA_GOOGLE_CLIENT_ID";

const KEY_CLIENT_PRIVATE_KEY: &str = "client_private_key";

// 0x + 32 bytes, and 0x + 20 bytes.
const PRIVATE_KEY_LEN: usize = 66;
const SWA_LEN: usize = 42;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Which wallet SDK deployment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    /// Build type string the SDK expects.
    pub fn build_type(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX",
            Environment::Production => "PRODUCTION",
        }
    }

    /// Lenient parse for environment variables; anything unrecognized is
    /// sandbox.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Sandbox
        }
    }
}

// ---------------------------------------------------------------------------
// TesseraConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.tessera/config.json`.
///
/// The client private key is never written to the JSON file. It lives in
/// `~/.tessera/keys.enc`, encrypted by [`SecureStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    #[serde(skip)]
    pub client_private_key: Option<String>,

    pub environment: Environment,
    pub client_swa: Option<String>,
    pub google_client_id: Option<String>,

    /// Seconds between order-history refreshes while a job is pending.
    pub poll_interval_secs: u64,
    /// How many history rows a caller should show.
    pub history_display_limit: usize,

    pub log_level: String,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            client_private_key: None,
            environment: Environment::Sandbox,
            client_swa: None,
            google_client_id: None,
            poll_interval_secs: 10,
            history_display_limit: 10,
            log_level: "info".into(),
        }
    }
}

/// Result of [`TesseraConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub environment: Environment,
    pub has_client_private_key: bool,
    pub has_client_swa: bool,
    pub has_google_client_id: bool,
    /// Names of the environment variables that would supply the missing values.
    pub missing: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigStatus {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_ref().is_some_and(|v| !v.trim().is_empty())
}

fn redact(value: &Option<String>, visible: usize) -> String {
    match value {
        Some(v) if !v.is_empty() => {
            let head: String = v.chars().take(visible).collect();
            format!("{head}...")
        }
        _ => "[MISSING]".into(),
    }
}

impl TesseraConfig {
    /// Returns the base config directory: `~/.tessera/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".tessera"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    pub fn keys_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("keys.enc"))
    }

    /// Persistent key/value storage used for the session (`storage.json`).
    pub fn storage_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("storage.json"))
    }

    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    pub fn ensure_dirs() -> Result<()> {
        for dir in [Self::base_dir()?, Self::logs_dir()?] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Load config from a specific file path, writing defaults if missing.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(env) = get(ENV_ENVIRONMENT) {
            self.environment = Environment::parse(&env);
        }
        if let Some(key) = get(ENV_CLIENT_PRIVATE_KEY) {
            self.client_private_key = Some(key);
        }
        if let Some(swa) = get(ENV_CLIENT_SWA) {
            self.client_swa = Some(swa);
        }
        if let Some(id) = get(ENV_GOOGLE_CLIENT_ID) {
            self.google_client_id = Some(id);
        }
    }

    /// Check that the SDK and identity provider can be configured from this
    /// config. Missing values make the config invalid; malformed ones only
    /// produce warnings.
    pub fn validate(&self) -> ConfigStatus {
        let mut missing = Vec::new();
        let mut warnings = Vec::new();

        if !present(&self.client_private_key) {
            missing.push(ENV_CLIENT_PRIVATE_KEY.to_string());
        }
        if !present(&self.client_swa) {
            missing.push(ENV_CLIENT_SWA.to_string());
        }
        if !present(&self.google_client_id) {
            missing.push(ENV_GOOGLE_CLIENT_ID.to_string());
        }

        if let Some(key) = self.client_private_key.as_deref().filter(|k| !k.is_empty()) {
            if !key.starts_with("0x") {
                warnings.push("client private key should start with 0x".to_string());
            }
            if key.len() != PRIVATE_KEY_LEN {
                warnings.push(
                    "client private key should be 64 hex characters (plus 0x prefix)".to_string(),
                );
            }
        }
        if let Some(swa) = self.client_swa.as_deref().filter(|s| !s.is_empty()) {
            if !swa.starts_with("0x") {
                warnings.push("client SWA should start with 0x".to_string());
            }
            if swa.len() != SWA_LEN {
                warnings.push("client SWA should be 40 hex characters (plus 0x prefix)".to_string());
            }
        }

        ConfigStatus {
            environment: self.environment,
            has_client_private_key: present(&self.client_private_key),
            has_client_swa: present(&self.client_swa),
            has_google_client_id: present(&self.google_client_id),
            missing,
            warnings,
        }
    }

    /// Like [`validate`](Self::validate) but fails when anything is missing.
    pub fn require_valid(&self) -> Result<ConfigStatus, TesseraError> {
        let status = self.validate();
        if !status.is_valid() {
            return Err(TesseraError::Config(format!(
                "missing {}",
                status.missing.join(", ")
            )));
        }
        for warning in &status.warnings {
            warn!("configuration warning: {warning}");
        }
        Ok(status)
    }

    /// Redacted view for logging.
    pub fn summary(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("environment", format!("{:?}", self.environment).to_lowercase()),
            ("build_type", self.environment.build_type().to_string()),
            ("client_private_key", redact(&self.client_private_key, 10)),
            ("client_swa", redact(&self.client_swa, 10)),
            ("google_client_id", redact(&self.google_client_id, 20)),
        ])
    }
}

// ---------------------------------------------------------------------------
// Encrypted key file helpers
// ---------------------------------------------------------------------------

fn load_key_map(path: &Path) -> HashMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

fn save_key_map(path: &Path, map: &HashMap<String, String>) -> Result<()> {
    let content = serde_json::to_string_pretty(map)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write key store: {}", path.display()))?;
    Ok(())
}

/// A private key typed into `config.json` by hand belongs in `keys.enc`.
/// Pull it out of the raw JSON and return the cleaned document.
fn extract_plaintext_key(raw_json: &str) -> Result<(Option<String>, String)> {
    let mut value: serde_json::Value =
        serde_json::from_str(raw_json).context("Failed to parse config JSON")?;
    let plaintext = value
        .as_object_mut()
        .and_then(|obj| obj.remove(KEY_CLIENT_PRIVATE_KEY))
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|v| !v.is_empty());

    match plaintext {
        Some(key) => Ok((Some(key), serde_json::to_string_pretty(&value)?)),
        None => Ok((None, raw_json.to_string())),
    }
}

// ---------------------------------------------------------------------------
// ConfigManager
// ---------------------------------------------------------------------------

/// Thread-safe config holder. Non-secret fields go to `config.json`; the
/// client private key goes to the encrypted key file.
pub struct ConfigManager {
    config: Arc<RwLock<TesseraConfig>>,
    config_path: PathBuf,
    keys_path: PathBuf,
    secure_storage: Option<SecureStorage>,
}

impl ConfigManager {
    /// Open the config under `~/.tessera/`, then apply environment overrides.
    pub fn new() -> Result<Self> {
        TesseraConfig::ensure_dirs()?;
        let secure_storage = match SecureStorage::new() {
            Ok(ss) => Some(ss),
            Err(e) => {
                warn!("SecureStorage init failed ({e}); the client private key will not be persisted");
                None
            }
        };
        let manager = Self::open(
            TesseraConfig::config_path()?,
            TesseraConfig::keys_path()?,
            secure_storage,
        )?;
        manager.config.write().apply_env_overrides();
        Ok(manager)
    }

    /// Open with explicit paths (tests, embedding).
    pub fn open(
        config_path: PathBuf,
        keys_path: PathBuf,
        secure_storage: Option<SecureStorage>,
    ) -> Result<Self> {
        let config = Self::load(&config_path, &keys_path, &secure_storage)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            keys_path,
            secure_storage,
        })
    }

    fn load(
        config_path: &Path,
        keys_path: &Path,
        secure_storage: &Option<SecureStorage>,
    ) -> Result<TesseraConfig> {
        if !config_path.exists() {
            return TesseraConfig::load_from_path(config_path);
        }

        let raw_json = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
        let (plaintext_key, cleaned_json) = extract_plaintext_key(&raw_json)?;

        if let Some(key) = &plaintext_key {
            info!("Moving hand-edited client private key from config.json into keys.enc");
            match secure_storage {
                Some(ss) => {
                    let mut map = load_key_map(keys_path);
                    map.insert(KEY_CLIENT_PRIVATE_KEY.to_string(), ss.encrypt(key)?);
                    save_key_map(keys_path, &map)?;
                }
                None => warn!("SecureStorage unavailable; plaintext key dropped from config.json"),
            }
            std::fs::write(config_path, &cleaned_json)
                .with_context(|| "Failed to write config.json after moving the private key")?;
        }

        let mut config: TesseraConfig =
            serde_json::from_str(&cleaned_json).with_context(|| "Failed to parse config.json")?;

        if let Some(ss) = secure_storage {
            let map = load_key_map(keys_path);
            config.client_private_key = map
                .get(KEY_CLIENT_PRIVATE_KEY)
                .and_then(|enc| ss.decrypt(enc).ok())
                .filter(|k| !k.is_empty());
        }
        if config.client_private_key.is_none() {
            // Keep a key we could not persist for this process at least.
            config.client_private_key = plaintext_key;
        }

        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn get(&self) -> TesseraConfig {
        self.config.read().clone()
    }

    /// Mutate the config and persist both halves.
    pub fn update(&self, f: impl FnOnce(&mut TesseraConfig)) -> Result<()> {
        let mut config = self.config.write();
        f(&mut config);
        config.save_to_path(&self.config_path)?;
        self.save_private_key(&config.client_private_key)
    }

    pub fn set_client_private_key(&self, key: Option<String>) -> Result<()> {
        self.config.write().client_private_key = key.clone();
        self.save_private_key(&key)
    }

    fn save_private_key(&self, key: &Option<String>) -> Result<()> {
        let Some(ss) = &self.secure_storage else {
            anyhow::bail!("SecureStorage unavailable; the client private key cannot be saved");
        };
        let mut map = load_key_map(&self.keys_path);
        match key {
            Some(k) if !k.is_empty() => {
                map.insert(KEY_CLIENT_PRIVATE_KEY.to_string(), ss.encrypt(k)?);
            }
            _ => {
                map.remove(KEY_CLIENT_PRIVATE_KEY);
            }
        }
        save_key_map(&self.keys_path, &map)
    }
}
