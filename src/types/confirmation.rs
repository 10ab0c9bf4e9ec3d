//! Confirmation handshake wire types.
//!
//! `SecureConfirmRequest` travels engine -> orchestrator (camelCase, like every
//! protocol-facing struct). `ConfirmationDecision` travels back snake_case and
//! is the only message that ever carries PRF material.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::types::handlers::TransactionContext;

/// Request emitted by an engine instance when an operation needs a fresh
/// credential and a user decision. Matched to its decision solely by
/// `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecureConfirmRequest {
    pub schema_version: u32,
    pub request_id: String,
    /// Flow discriminant: signTransaction, registerAccount, linkDevice,
    /// signNep413Message or decryptPrivateKeyWithPrf.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Render projection for the consent surface.
    pub summary: serde_json::Value,
    /// Flow-specific material the orchestrator needs to resolve the request.
    /// Screened by the forbidden-key guard before it leaves the engine.
    pub payload: serde_json::Value,
    /// SHA-256 (base64url) of the alphabetized user-intent JSON.
    pub intent_digest: String,
}

/// Both PRF outputs from one registration-grade ceremony.
/// Lives for a single operation and is zeroized on drop.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct DualPrfOutputs {
    pub chacha20_prf_output: String,
    pub ed25519_prf_output: String,
}

impl fmt::Debug for DualPrfOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualPrfOutputs")
            .field("chacha20_prf_output", &"[REDACTED]")
            .field("ed25519_prf_output", &"[REDACTED]")
            .finish()
    }
}

/// Exactly one decision resolves each confirmation request.
/// `confirmed=true` carries the credential and the flow's required PRF
/// output(s); `confirmed=false` never carries credential material.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ConfirmationDecision {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_digest: Option<String>,
    pub confirmed: bool,
    /// Serialized WebAuthn credential JSON. Parsed per flow: assertion shape
    /// for signing flows, attestation shape for registration flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<serde_json::Value>,
    /// Base64url ChaCha20-purpose PRF output (single-output flows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prf_output: Option<String>,
    /// Both PRF outputs (registration-grade flows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_prf_outputs: Option<DualPrfOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf_challenge: Option<VrfChallenge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_context: Option<TransactionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfirmationDecision {
    /// Plain user cancellation: confirmed=false, no credential material,
    /// no error string.
    pub fn cancelled(request_id: &str, intent_digest: Option<String>) -> Self {
        ConfirmationDecision {
            request_id: request_id.to_string(),
            intent_digest,
            confirmed: false,
            ..Default::default()
        }
    }

    /// Rejection with a reason (protocol violations, missing collaborators).
    pub fn rejected(request_id: &str, error: String) -> Self {
        ConfirmationDecision {
            request_id: request_id.to_string(),
            confirmed: false,
            error: Some(error),
            ..Default::default()
        }
    }
}

impl fmt::Debug for ConfirmationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationDecision")
            .field("request_id", &self.request_id)
            .field("intent_digest", &self.intent_digest)
            .field("confirmed", &self.confirmed)
            .field("credential", &self.credential.as_ref().map(|_| "[present]"))
            .field("prf_output", &self.prf_output.as_ref().map(|_| "[REDACTED]"))
            .field("dual_prf_outputs", &self.dual_prf_outputs)
            .field("vrf_challenge", &self.vrf_challenge.as_ref().map(|_| "[present]"))
            .field("transaction_context", &self.transaction_context)
            .field("error", &self.error)
            .finish()
    }
}

// === SERIALIZED CREDENTIALS ===

/// WebAuthn authentication (assertion) credential as serialized by the
/// ceremony platform. PRF extension outputs ride inside
/// `clientExtensionResults.prf.results`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SerializedCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(alias = "type")]
    pub credential_type: String,
    pub authenticator_attachment: Option<String>,
    pub response: AuthenticationResponse,
    pub client_extension_results: ClientExtensionResults,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRegistrationCredential {
    pub id: String,
    pub raw_id: String,
    #[serde(alias = "type")]
    pub credential_type: String,
    pub authenticator_attachment: Option<String>,
    pub response: RegistrationResponse,
    pub client_extension_results: ClientExtensionResults,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    #[serde(alias = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(alias = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(alias = "userHandle")]
    pub user_handle: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(alias = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(alias = "attestationObject")]
    pub attestation_object: String,
    pub transports: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientExtensionResults {
    pub prf: PrfResults,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PrfResults {
    pub results: PrfOutputs,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PrfOutputs {
    pub first: Option<String>,
    pub second: Option<String>,
}

/// VRF challenge material generated outside this layer; carried opaquely
/// into the ceremony (as the WebAuthn challenge) and echoed in decisions.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VrfChallenge {
    pub vrf_input: String,
    pub vrf_output: String,
    pub vrf_proof: String,
    pub vrf_public_key: String,
    pub user_id: String,
    pub rp_id: String,
    pub block_height: String,
    pub block_hash: String,
    /// Optional base64url-encoded 32-byte digest bound into the VRF input derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_digest: Option<String>,
}
