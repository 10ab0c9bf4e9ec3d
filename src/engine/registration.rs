//! WebAuthn registration material.
//!
//! Pulls the COSE public key out of an attestation object so the
//! contract can verify future assertions against it. Only the CBOR
//! envelope and authenticator-data framing are interpreted here; the
//! COSE key itself stays opaque bytes.

use ciborium::Value as CborValue;
use log::debug;

use crate::encoders::{base64_url_decode, base64_url_encode};
use crate::error::{OrchestratorError, Result};
use crate::types::SerializedRegistrationCredential;

/// Parse a WebAuthn attestation object and return its authData bytes.
pub fn parse_attestation_object(attestation_object_bytes: &[u8]) -> Result<Vec<u8>> {
    let cbor_value: CborValue = ciborium::from_reader(attestation_object_bytes)
        .map_err(|e| OrchestratorError::Ceremony(format!("Failed to parse CBOR: {}", e)))?;

    if let CborValue::Map(map) = cbor_value {
        for (key, value) in map.iter() {
            if let CborValue::Text(key_str) = key {
                if key_str == "authData" {
                    if let CborValue::Bytes(auth_data_bytes) = value {
                        return Ok(auth_data_bytes.clone());
                    }
                }
            }
        }
        Err(OrchestratorError::Ceremony(
            "authData not found in attestation object".to_string(),
        ))
    } else {
        Err(OrchestratorError::Ceremony(
            "Attestation object is not a CBOR map".to_string(),
        ))
    }
}

/// Parse authenticator data and return the attested COSE public key.
///
/// Layout: rpIdHash(32) + flags(1) + counter(4) + AAGUID(16) +
/// credIdLen(2, BE) + credId + COSE key.
pub fn parse_authenticator_data(auth_data_bytes: &[u8]) -> Result<Vec<u8>> {
    if auth_data_bytes.len() < 37 {
        return Err(OrchestratorError::Ceremony(
            "Authenticator data too short".to_string(),
        ));
    }

    let flags = auth_data_bytes[32];

    // AT flag (bit 6) marks attested credential data
    if (flags & 0x40) == 0 {
        return Err(OrchestratorError::Ceremony(
            "No attested credential data present".to_string(),
        ));
    }

    let mut offset = 37;

    if auth_data_bytes.len() < offset + 16 {
        return Err(OrchestratorError::Ceremony(
            "Authenticator data too short for AAGUID".to_string(),
        ));
    }
    offset += 16;

    if auth_data_bytes.len() < offset + 2 {
        return Err(OrchestratorError::Ceremony(
            "Authenticator data too short for credential ID length".to_string(),
        ));
    }
    let cred_id_length =
        u16::from_be_bytes([auth_data_bytes[offset], auth_data_bytes[offset + 1]]) as usize;
    offset += 2;

    if auth_data_bytes.len() < offset + cred_id_length {
        return Err(OrchestratorError::Ceremony(
            "Authenticator data too short for credential ID".to_string(),
        ));
    }
    offset += cred_id_length;

    Ok(auth_data_bytes[offset..].to_vec())
}

/// Decode a base64url attestation object and extract the COSE public key.
pub fn extract_cose_public_key_from_attestation(attestation_object_b64u: &str) -> Result<Vec<u8>> {
    let attestation_object_bytes = base64_url_decode(attestation_object_b64u).map_err(|e| {
        OrchestratorError::Ceremony(format!("Failed to decode attestation object: {:?}", e))
    })?;

    let auth_data_bytes = parse_attestation_object(&attestation_object_bytes)?;
    let cose_public_key_bytes = parse_authenticator_data(&auth_data_bytes)?;

    debug!(
        "Extracted COSE public key ({} bytes)",
        cose_public_key_bytes.len()
    );
    Ok(cose_public_key_bytes)
}

/// COSE public key from a registration credential, base64url-encoded for
/// transport.
pub fn cose_public_key_from_credential(
    credential: &SerializedRegistrationCredential,
) -> Result<String> {
    let cose_bytes = extract_cose_public_key_from_attestation(&credential.response.attestation_object)?;
    Ok(base64_url_encode(&cose_bytes))
}
