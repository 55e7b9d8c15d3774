use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::config::TesseraConfig;

const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;
pub const SALT_FILENAME: &str = "vault.salt";

// Argon2id, m=19456 KiB, t=2, p=1.
const KDF_MEMORY_KIB: u32 = 19_456;
const KDF_ITERATIONS: u32 = 2;
const KDF_LANES: u32 = 1;

/// Symmetric encryption for values that must not sit on disk in the clear:
/// the client private key, the identity credential and the wallet session
/// blob.
///
/// AES-256-GCM; the key is derived with Argon2id from the local user context
/// and a random salt persisted next to the data. Ciphertext is hex-encoded
/// `nonce || ciphertext || tag`.
pub struct SecureStorage {
    cipher: Aes256Gcm,
    key_material: [u8; 32],
}

impl SecureStorage {
    /// Open the vault rooted at `~/.tessera/`.
    pub fn new() -> Result<Self> {
        let salt_path = TesseraConfig::base_dir()?.join(SALT_FILENAME);
        Self::with_salt_path(&salt_path)
    }

    /// Open a vault whose salt lives at `salt_path` (created on first use).
    pub fn with_salt_path(salt_path: &Path) -> Result<Self> {
        let salt = load_or_create_salt(salt_path)?;
        let key_material = derive_key(local_context().as_bytes(), &salt)?;
        Ok(Self::from_key_material(key_material))
    }

    /// A second handle on the same derived key, without re-running Argon2.
    pub fn duplicate(&self) -> Self {
        Self::from_key_material(self.key_material)
    }

    fn from_key_material(key_material: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_material));
        Self { cipher, key_material }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {e}"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    pub fn decrypt(&self, hex_ciphertext: &str) -> Result<String> {
        let data = hex::decode(hex_ciphertext).context("Invalid hex")?;
        if data.len() < NONCE_LEN {
            anyhow::bail!("Ciphertext too short");
        }
        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {e}"))?;

        String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
    }
}

/// Short, stable, non-reversible tag for a secret, safe to put in logs.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..4])
}

fn local_context() -> String {
    let username = whoami::username();
    let home = dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("tessera-vault-v1:{username}:{home}")
}

fn load_or_create_salt(salt_path: &Path) -> Result<[u8; SALT_LEN]> {
    if let Ok(data) = fs::read(salt_path) {
        if let Ok(salt) = <[u8; SALT_LEN]>::try_from(data.as_slice()) {
            return Ok(salt);
        }
        // Wrong length: regenerate below.
    }

    let salt: [u8; SALT_LEN] = rand::random();
    if let Some(parent) = salt_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(salt_path, salt)
        .with_context(|| format!("Failed to write salt file {}", salt_path.display()))?;
    Ok(salt)
}

fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<[u8; 32]> {
    let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_LANES, Some(32))
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2 key derivation failed: {e}"))?;
    Ok(key)
}
