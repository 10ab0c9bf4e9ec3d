//! NEP-413 off-chain message signing.
//!
//! Messages are Borsh-serialized with the NEP-413 prefix prepended,
//! hashed with SHA-256, and the hash signed. The prefix (2^31 + 413)
//! keeps the payload from ever being a valid on-chain transaction.

use borsh::BorshSerialize;
use ed25519_dalek::Signer;
use sha2::{Digest, Sha256};

use crate::crypto::near_public_key_str;
use crate::encoders::{base64_standard_decode, base64_standard_encode};
use crate::error::{OrchestratorError, Result};

const NEP413_PREFIX: u32 = 2147484061;

#[derive(BorshSerialize)]
struct Nep413Payload {
    message: String,
    recipient: String,
    nonce: [u8; 32],
    state: Option<String>,
}

/// Decode a base64 nonce and require exactly 32 bytes.
pub fn decode_nonce(nonce_b64: &str) -> Result<[u8; 32]> {
    let nonce_bytes = base64_standard_decode(nonce_b64).map_err(|e| {
        OrchestratorError::Protocol(format!("Failed to decode nonce from base64: {}", e))
    })?;
    if nonce_bytes.len() != 32 {
        return Err(OrchestratorError::Protocol(format!(
            "Invalid nonce length: expected 32 bytes, got {}",
            nonce_bytes.len()
        )));
    }
    let nonce: [u8; 32] = nonce_bytes
        .try_into()
        .map_err(|_| OrchestratorError::Protocol("Failed to convert nonce to 32-byte array".to_string()))?;
    Ok(nonce)
}

/// SHA-256 over the prefixed Borsh payload. This is what gets signed.
pub fn nep413_signing_hash(
    message: &str,
    recipient: &str,
    nonce: [u8; 32],
    state: Option<&str>,
) -> Result<[u8; 32]> {
    let payload = Nep413Payload {
        message: message.to_string(),
        recipient: recipient.to_string(),
        nonce,
        state: state.map(str::to_string),
    };
    let serialized = borsh::to_vec(&payload)
        .map_err(|e| OrchestratorError::Protocol(format!("Borsh serialization failed: {}", e)))?;

    let mut prefixed_data = NEP413_PREFIX.to_le_bytes().to_vec();
    prefixed_data.extend_from_slice(&serialized);

    let mut hasher = Sha256::new();
    hasher.update(&prefixed_data);
    Ok(hasher.finalize().into())
}

pub struct Nep413Signature {
    /// Base64 of the raw Ed25519 signature bytes.
    pub signature: String,
    /// `ed25519:<base58>` of the signing key's public half.
    pub public_key: String,
}

/// Sign a NEP-413 message hash with the given key.
pub fn sign_nep413_message(
    signing_key: &ed25519_dalek::SigningKey,
    message: &str,
    recipient: &str,
    nonce_b64: &str,
    state: Option<&str>,
) -> Result<Nep413Signature> {
    let nonce = decode_nonce(nonce_b64)?;
    let hash = nep413_signing_hash(message, recipient, nonce, state)?;
    let signature = signing_key.sign(&hash);

    Ok(Nep413Signature {
        signature: base64_standard_encode(&signature.to_bytes()),
        public_key: near_public_key_str(&signing_key.verifying_key()),
    })
}
