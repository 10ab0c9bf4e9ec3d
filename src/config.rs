// === CONFIGURATION CONSTANTS ===
// Configuration values shared across the orchestrator and the engine runtime

use sha2::{Digest, Sha256};

use crate::encoders::base64_url_encode;

// === CRYPTOGRAPHIC CONSTANTS ===

/// ChaCha20Poly1305 nonce size in bytes (96 bits / 12 bytes, same as AES-GCM)
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// ChaCha20 key size in bytes (256 bits / 32 bytes)
pub const CHACHA20_KEY_SIZE: usize = 32;

/// Ed25519 private key size in bytes
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Info string for Ed25519 signing key derivation from dual PRF
pub const ED25519_HKDF_KEY_INFO: &str = "ed25519-signing-key-dual-prf-v1";

/// Constant used for HKDF info when deriving the KEK from the ChaCha20 PRF output
pub const NEAR_KEK_INFO: &[u8] = b"near-kek";

/// PRF eval salt label for the encryption-purpose (ChaCha20) output
pub const CHACHA20_SALT_LABEL: &str = "chacha20-salt:";

/// PRF eval salt label for the signing-purpose (Ed25519) output
pub const ED25519_SALT_LABEL: &str = "ed25519-salt:";

// === CONFIRMATION PROTOCOL CONSTANTS ===

/// Only schemaVersion 2 confirmation requests are accepted
pub const CONFIRMATION_SCHEMA_VERSION: u32 = 2;

/// Delay applied when an auto-proceed behavior arrives without one (ms)
pub const DEFAULT_AUTO_PROCEED_DELAY_MS: u32 = 2000;

// === POOL DEFAULTS ===

pub const DEFAULT_POOL_CAPACITY: usize = 3;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;

// === RECOVERY ===

/// Account hint used when a recovery credential arrives without one
pub const RECOVERY_ACCOUNT_FALLBACK: &str = "recovery-account.testnet";

// === ERROR MESSAGES ===

/// Error message for invalid key size
pub const ERROR_INVALID_KEY_SIZE: &str = "Invalid key size for ChaCha20Poly1305";

// === UTILITY FUNCTIONS ===

/// Generate account-specific NEAR key derivation salt
pub fn near_key_salt_for_account(account_id: &str) -> String {
    format!("near-key-derivation:{}", account_id)
}

/// Account-scoped PRF eval salt for the encryption-purpose output.
/// SHA-256 over the label + account id, base64url for the ceremony options.
pub fn chacha20_prf_salt_for_account(account_id: &str) -> String {
    labeled_account_salt(CHACHA20_SALT_LABEL, account_id)
}

/// Account-scoped PRF eval salt for the signing-purpose output.
pub fn ed25519_prf_salt_for_account(account_id: &str) -> String {
    labeled_account_salt(ED25519_SALT_LABEL, account_id)
}

fn labeled_account_salt(label: &str, account_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(account_id.as_bytes());
    base64_url_encode(&hasher.finalize())
}
