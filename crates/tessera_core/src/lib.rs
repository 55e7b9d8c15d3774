pub mod config;
pub mod error_handler;
pub mod logging;
pub mod secure_storage;
pub mod session;
pub mod storage;

pub use config::{ConfigManager, ConfigStatus, Environment, TesseraConfig};
pub use error_handler::{
    aa_error_code, classify_error, ClassifiedCategory, ClassifiedError, ErrorBoundary,
    ErrorSeverity, RecoveryAction, RecoveryPanel, TesseraError,
};
pub use secure_storage::{fingerprint, SecureStorage};
pub use session::{Session, SessionStore, IDENTITY_TOKEN_KEY, WALLET_SESSION_KEY};
pub use storage::{EncryptedStore, FileStore, KeyValueStore, MemoryStore};
