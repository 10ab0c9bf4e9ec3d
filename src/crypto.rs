use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use log::debug;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::{
    near_key_salt_for_account, CHACHA20_KEY_SIZE, CHACHA20_NONCE_SIZE, ED25519_HKDF_KEY_INFO,
    ED25519_PRIVATE_KEY_SIZE, ERROR_INVALID_KEY_SIZE, NEAR_KEK_INFO,
};
use crate::encoders::{base64_url_decode, base64_url_encode};
use crate::error::{OrchestratorError, Result};

/// Ciphertext + nonce pair produced by [`encrypt_data_chacha20`], both base64url.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedChaCha20Data {
    pub encrypted_data_b64u: String,
    pub iv_b64u: String,
}

// === KEY ENCRYPTION KEY ===

/// Derive the ChaCha20Poly1305 key-encryption key from the encryption-purpose
/// PRF output (HKDF-SHA256, no salt, fixed info string).
pub fn derive_encryption_key_from_prf_output(
    prf_output_b64u: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let prf_output = Zeroizing::new(
        base64_url_decode(prf_output_b64u).map_err(OrchestratorError::Derivation)?,
    );
    if prf_output.is_empty() {
        return Err(OrchestratorError::Derivation(
            "Empty PRF output".to_string(),
        ));
    }

    let hk = Hkdf::<Sha256>::new(None, &prf_output);
    let mut kek = Zeroizing::new(vec![0u8; CHACHA20_KEY_SIZE]);
    hk.expand(NEAR_KEK_INFO, &mut kek)
        .map_err(|_| OrchestratorError::Derivation("HKDF expand failed".to_string()))?;
    Ok(kek)
}

// === CHACHA20POLY1305 ENCRYPTION/DECRYPTION ===

/// Encrypt data using ChaCha20Poly1305 with a fresh random nonce.
pub fn encrypt_data_chacha20(
    plain_text_data_str: &str,
    key_bytes: &[u8],
) -> Result<EncryptedChaCha20Data> {
    if key_bytes.len() != CHACHA20_KEY_SIZE {
        return Err(OrchestratorError::Derivation(
            ERROR_INVALID_KEY_SIZE.to_string(),
        ));
    }

    let key = chacha20poly1305::Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);

    let mut nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
    getrandom(&mut nonce_bytes)
        .map_err(|e| OrchestratorError::Derivation(format!("Failed to generate nonce: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plain_text_data_str.as_bytes())
        .map_err(|e| OrchestratorError::Derivation(format!("Encryption error: {}", e)))?;

    Ok(EncryptedChaCha20Data {
        encrypted_data_b64u: base64_url_encode(&ciphertext),
        iv_b64u: base64_url_encode(&nonce_bytes),
    })
}

/// Decrypt data using ChaCha20Poly1305
pub fn decrypt_data_chacha20(
    encrypted_data_b64u: &str,
    iv_b64u: &str,
    key_bytes: &[u8],
) -> Result<Zeroizing<String>> {
    if key_bytes.len() != CHACHA20_KEY_SIZE {
        return Err(OrchestratorError::Derivation(
            ERROR_INVALID_KEY_SIZE.to_string(),
        ));
    }

    let key = chacha20poly1305::Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);

    let nonce_bytes = base64_url_decode(iv_b64u).map_err(|e| {
        OrchestratorError::Derivation(format!("Base64 decode error for ChaCha20 nonce: {}", e))
    })?;
    if nonce_bytes.len() != CHACHA20_NONCE_SIZE {
        return Err(OrchestratorError::Derivation(format!(
            "Decryption ChaCha20 nonce must be {} bytes.",
            CHACHA20_NONCE_SIZE
        )));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let encrypted_data = base64_url_decode(encrypted_data_b64u).map_err(|e| {
        OrchestratorError::Derivation(format!("Base64 decode error for encrypted data: {}", e))
    })?;

    let decrypted_bytes = cipher
        .decrypt(nonce, encrypted_data.as_slice())
        .map_err(|e| OrchestratorError::Derivation(format!("Decryption error: {}", e)))?;

    String::from_utf8(decrypted_bytes)
        .map(Zeroizing::new)
        .map_err(|e| OrchestratorError::Derivation(format!("UTF-8 decoding error: {}", e)))
}

// === KEY GENERATION ===

/// Ed25519 key derivation from the signing-purpose PRF output.
/// Account-scoped HKDF salt keeps keys unlinkable across accounts sharing
/// one authenticator.
pub fn derive_ed25519_key_from_prf_output(
    prf_output_base64: &str,
    account_id: &str,
) -> Result<(Zeroizing<String>, String)> {
    let prf_output = Zeroizing::new(
        base64_url_decode(prf_output_base64).map_err(OrchestratorError::Derivation)?,
    );

    if prf_output.is_empty() {
        return Err(OrchestratorError::Derivation(
            "Empty PRF output".to_string(),
        ));
    }

    // Account-specific salt for Ed25519 key derivation (different from ChaCha20)
    let ed25519_salt = near_key_salt_for_account(account_id);
    let salt_bytes = ed25519_salt.as_bytes();

    let hk = Hkdf::<Sha256>::new(Some(salt_bytes), &prf_output);
    let mut ed25519_key_material = Zeroizing::new([0u8; ED25519_PRIVATE_KEY_SIZE]);

    let info = ED25519_HKDF_KEY_INFO.as_bytes();
    hk.expand(info, &mut *ed25519_key_material)
        .map_err(|_| OrchestratorError::Derivation("HKDF expand failed".to_string()))?;

    let signing_key = ed25519_dalek::SigningKey::from_bytes(&ed25519_key_material);
    let verifying_key = signing_key.verifying_key();

    // NEAR private key format: seed + public key concatenated (64 bytes total)
    let seed_bytes = signing_key.to_bytes();
    let public_key_bytes = verifying_key.to_bytes();

    let mut near_private_key_bytes = Zeroizing::new(Vec::with_capacity(64));
    near_private_key_bytes.extend_from_slice(&seed_bytes);
    near_private_key_bytes.extend_from_slice(&public_key_bytes);

    let private_key_b58 = Zeroizing::new(bs58::encode(near_private_key_bytes.as_slice()).into_string());
    let public_key_b58 = bs58::encode(&public_key_bytes).into_string();

    let near_private_key = Zeroizing::new(format!("ed25519:{}", private_key_b58.as_str()));
    let near_public_key = format!("ed25519:{}", public_key_b58);

    debug!("Derived Ed25519 key for account: {}", account_id);
    Ok((near_private_key, near_public_key))
}

/// Parse a NEAR-format private key (`ed25519:<base58 of seed||pubkey>`) into
/// a signing key.
pub fn parse_near_private_key(near_private_key: &str) -> Result<ed25519_dalek::SigningKey> {
    let private_key_str = near_private_key.strip_prefix("ed25519:").ok_or_else(|| {
        OrchestratorError::Derivation("Private key must be in ed25519: format".to_string())
    })?;

    let private_key_bytes = Zeroizing::new(
        bs58::decode(private_key_str)
            .into_vec()
            .map_err(|e| {
                OrchestratorError::Derivation(format!("Failed to decode private key: {}", e))
            })?,
    );

    if private_key_bytes.len() != 64 {
        return Err(OrchestratorError::Derivation(format!(
            "Invalid private key length: expected 64 bytes, got {}",
            private_key_bytes.len()
        )));
    }

    let seed_bytes: [u8; 32] = private_key_bytes[0..32].try_into().map_err(|_| {
        OrchestratorError::Derivation("Failed to extract seed from private key".to_string())
    })?;

    Ok(ed25519_dalek::SigningKey::from_bytes(&seed_bytes))
}

/// NEAR public key string for a verifying key.
pub fn near_public_key_str(verifying_key: &ed25519_dalek::VerifyingKey) -> String {
    format!("ed25519:{}", bs58::encode(verifying_key.to_bytes()).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::base64_url_encode;

    fn test_prf_output() -> String {
        let bytes: Vec<u8> = (0..32u8).map(|i| i + 42).collect();
        base64_url_encode(&bytes)
    }

    #[test]
    fn test_ed25519_derivation_is_deterministic() {
        let prf = test_prf_output();
        let (sk1, pk1) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet").unwrap();
        let (sk2, pk2) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet").unwrap();
        assert_eq!(*sk1, *sk2, "Same PRF output must derive the same keypair");
        assert_eq!(pk1, pk2);
        assert!(pk1.starts_with("ed25519:"));
        assert!(sk1.starts_with("ed25519:"));
    }

    #[test]
    fn test_ed25519_derivation_differs_per_account() {
        let prf = test_prf_output();
        let (_, pk_alice) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet").unwrap();
        let (_, pk_bob) = derive_ed25519_key_from_prf_output(&prf, "bob.testnet").unwrap();
        assert_ne!(pk_alice, pk_bob);
    }

    #[test]
    fn test_kek_differs_from_signing_material() {
        let prf = test_prf_output();
        let kek = derive_encryption_key_from_prf_output(&prf).unwrap();
        let (sk, _) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet").unwrap();
        let seed = parse_near_private_key(&sk).unwrap().to_bytes();
        assert_ne!(kek.as_slice(), seed.as_slice());
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let kek = derive_encryption_key_from_prf_output(&test_prf_output()).unwrap();
        let encrypted = encrypt_data_chacha20("ed25519:not-a-real-key", &kek).unwrap();
        let decrypted =
            decrypt_data_chacha20(&encrypted.encrypted_data_b64u, &encrypted.iv_b64u, &kek)
                .unwrap();
        assert_eq!(decrypted.as_str(), "ed25519:not-a-real-key");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let kek = derive_encryption_key_from_prf_output(&test_prf_output()).unwrap();
        let encrypted = encrypt_data_chacha20("ed25519:not-a-real-key", &kek).unwrap();

        let other_bytes: Vec<u8> = (0..32u8).map(|i| i + 7).collect();
        let other_kek =
            derive_encryption_key_from_prf_output(&base64_url_encode(&other_bytes)).unwrap();
        let result =
            decrypt_data_chacha20(&encrypted.encrypted_data_b64u, &encrypted.iv_b64u, &other_kek);
        assert!(result.is_err(), "Wrong KEK must not decrypt");
    }

    #[test]
    fn test_parse_near_private_key_round_trip() {
        let (sk_str, pk_str) =
            derive_ed25519_key_from_prf_output(&test_prf_output(), "alice.testnet").unwrap();
        let signing_key = parse_near_private_key(&sk_str).unwrap();
        assert_eq!(near_public_key_str(&signing_key.verifying_key()), pk_str);
    }

    #[test]
    fn test_parse_rejects_bad_prefix_and_length() {
        assert!(parse_near_private_key("secp256k1:abc").is_err());
        let short = format!("ed25519:{}", bs58::encode([1u8; 16]).into_string());
        assert!(parse_near_private_key(&short).is_err());
    }

    #[test]
    fn test_empty_prf_output_rejected() {
        assert!(derive_encryption_key_from_prf_output("").is_err());
        assert!(derive_ed25519_key_from_prf_output("", "alice.testnet").is_err());
    }
}
