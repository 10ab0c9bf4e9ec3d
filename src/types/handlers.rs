//! Per-operation payload and result types.
//!
//! Everything here crosses the engine message boundary, so every struct is
//! serde camelCase on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::confirmation::{
    DualPrfOutputs, SerializedCredential, SerializedRegistrationCredential,
};

// ******************************************************************************
// *                                                                            *
// *                        TRANSACTION CONTEXT TYPES                           *
// *                                                                            *
// ******************************************************************************

/// Chain context resolved on the orchestrator side and attached to signing
/// and registration decisions. All fields are strings on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub near_public_key_str: String,
    pub next_nonce: String,
    pub tx_block_height: String,
    pub tx_block_hash: String,
}

/// One transaction to sign: receiver plus an opaque JSON string of actions.
/// Nonce and block hash are assigned from the `TransactionContext` at
/// signing time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSigningRequest {
    pub near_account_id: String,
    pub receiver_id: String,
    // JSON string of the action list; complex action enums stay opaque here
    #[serde(deserialize_with = "deserialize_actions_flexible")]
    pub actions: String,
}

impl TransactionSigningRequest {
    /// Parse the actions JSON string into `serde_json::Value`.
    /// Returns an empty array on parse failure.
    pub fn parsed_actions_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.actions).unwrap_or_else(|_| serde_json::json!([]))
    }
}

/// Accepts either a pre-stringified action list or an inline JSON array.
fn deserialize_actions_flexible<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        other => serde_json::to_string(&other).map_err(serde::de::Error::custom),
    }
}

/// Canonically-digested transaction plus its Ed25519 signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub transaction: serde_json::Value,
    pub signature: String,
    pub public_key: String,
}

/// Per-transaction outcome inside a batch signing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransactionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<SignedTransaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ******************************************************************************
// *                                                                            *
// *                    CONFIRMATION CONFIGURATION TYPES                        *
// *                                                                            *
// ******************************************************************************

/// UI mode for confirmation display
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationUIMode {
    #[serde(rename = "skip")]
    Skip,
    #[serde(rename = "modal")]
    Modal,
    #[serde(rename = "drawer")]
    Drawer,
}

/// Behavior mode for confirmation flow
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationBehavior {
    #[serde(rename = "requireClick")]
    RequireClick,
    #[serde(rename = "autoProceed")]
    AutoProceed,
    #[serde(rename = "autoProceedWithDelay")]
    AutoProceedWithDelay,
}

/// Unified confirmation configuration resolved per request from defaults,
/// stored per-account preference and request override.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationConfig {
    /// Type of UI to display for confirmation
    pub ui_mode: ConfirmationUIMode,

    /// How the confirmation UI behaves
    pub behavior: ConfirmationBehavior,

    /// Delay in milliseconds before auto-proceeding (only used with autoProceedWithDelay)
    pub auto_proceed_delay: Option<u32>,

    /// UI theme preference (dark/light)
    pub theme: Option<String>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ui_mode: ConfirmationUIMode::Modal,
            behavior: ConfirmationBehavior::RequireClick,
            auto_proceed_delay: Some(crate::config::DEFAULT_AUTO_PROCEED_DELAY_MS),
            theme: Some("dark".to_string()),
        }
    }
}

// ******************************************************************************
// *                                                                            *
// *                         OPERATION REQUEST TYPES                            *
// *                                                                            *
// ******************************************************************************

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptRequest {
    pub near_account_id: String,
    pub device_number: Option<u32>,
    /// Registration transaction to sign with the freshly derived key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_tx: Option<TransactionSigningRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_config: Option<ConfirmationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyRequest {
    pub near_account_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckRegistrationEligibilityRequest {
    pub near_account_id: String,
    pub device_number: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignAndRegisterUserRequest {
    pub near_account_id: String,
    pub device_number: Option<u32>,
    /// Device-linking registration rather than a first-time one.
    #[serde(default)]
    pub link_device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_tx: Option<TransactionSigningRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_config: Option<ConfirmationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionsWithActionsRequest {
    pub near_account_id: String,
    pub tx_signing_requests: Vec<TransactionSigningRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_config: Option<ConfirmationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairRequest {
    pub credential: SerializedCredential,
    pub dual_prf_outputs: DualPrfOutputs,
    pub account_id_hint: Option<String>,
    pub device_number: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractCosePublicKeyRequest {
    pub credential: SerializedRegistrationCredential,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionWithKeyPairRequest {
    pub near_private_key: String, // ed25519:... format
    pub signer_account_id: String,
    pub receiver_id: String,
    pub nonce: String,
    pub block_hash: String,
    #[serde(deserialize_with = "deserialize_actions_flexible")]
    pub actions: String,
}

impl fmt::Debug for SignTransactionWithKeyPairRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignTransactionWithKeyPairRequest")
            .field("near_private_key", &"[REDACTED]")
            .field("signer_account_id", &self.signer_account_id)
            .field("receiver_id", &self.receiver_id)
            .field("nonce", &self.nonce)
            .field("block_hash", &self.block_hash)
            .field("actions", &self.actions)
            .finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Request {
    pub account_id: String,
    pub message: String,
    pub recipient: String,
    /// Base64-encoded 32-byte nonce.
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_config: Option<ConfirmationConfig>,
}

// ******************************************************************************
// *                                                                            *
// *                          OPERATION RESULT TYPES                            *
// *                                                                            *
// ******************************************************************************

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptResult {
    pub near_account_id: String,
    pub public_key: String,
    pub stored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction: Option<SignedTransaction>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyResult {
    pub private_key: String,
    pub near_account_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEligibilityResult {
    pub eligible: bool,
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignAndRegisterUserResult {
    pub success: bool,
    pub public_key: String,
    /// Base64url COSE key bytes extracted from the attestation object.
    pub cose_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_registration: Option<SignedTransaction>,
    pub stored: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairResult {
    pub public_key: String,
    pub near_account_id: String,
    pub stored: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractCosePublicKeyResult {
    pub cose_public_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionWithKeyPairResult {
    pub signed_transaction: SignedTransaction,
    pub transaction_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Result {
    pub account_id: String,
    pub public_key: String,
    /// Base64-encoded Ed25519 signature over the prefixed payload hash.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Failure envelope payload. `kind` names the error taxonomy branch so the
/// caller side can rebuild the typed error after transport.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FailurePayload {
    pub error: String,
    pub kind: String,
}
