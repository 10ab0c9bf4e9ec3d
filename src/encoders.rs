//! Encoding utilities for the signer orchestrator.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};

// === BASE64URL (URL-SAFE, NO PADDING) ===

/// Decode a base64url string using base64ct library
/// This function uses the `base64ct` library with `Base64UrlUnpadded` encoding,
/// which is the standard for WebAuthn and cryptographic operations.
pub fn base64_url_decode(input: &str) -> Result<Vec<u8>, String> {
    Base64UrlUnpadded::decode_vec(input).map_err(|e| format!("Base64 decode error: {}", e))
}

/// Encode bytes to a base64url string using base64ct library
///
/// This function uses the `base64ct` library with `Base64UrlUnpadded` encoding,
/// which is the standard for WebAuthn and cryptographic operations.
pub fn base64_url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

// === BASE64 STANDARD (FOR JSON WIRE FIELDS) ===

/// Encode bytes to a standard base64 string
/// Used for JSON payloads where standard base64 is expected (NEP-413 signatures, nonces).
pub fn base64_standard_encode(data: &[u8]) -> String {
    Base64::encode_string(data)
}

/// Decode a standard base64 string
pub fn base64_standard_decode(input: &str) -> Result<Vec<u8>, String> {
    Base64::decode_vec(input).map_err(|e| format!("Base64 decode error: {}", e))
}
