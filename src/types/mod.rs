// === TYPES MODULE ===

pub mod confirmation;
pub mod handlers;
pub mod progress;

// Re-export commonly used types
pub use confirmation::*;
pub use handlers::*;
pub use progress::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

// === CLEAN RUST ENUMS WITH NUMERIC CONVERSION ===
// Discriminants are stable wire values; request and response tables must
// stay index-aligned (success = request, failure = request + failure base).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRequestType {
    DeriveNearKeypairAndEncrypt,
    DecryptPrivateKeyWithPrf,
    CheckRegistrationEligibility,
    SignAndRegisterUser,
    SignTransactionsWithActions,
    RecoverKeypairFromCredential,
    ExtractCosePublicKey,
    SignTransactionWithKeyPair,
    SignNep413Message,
}

const FAILURE_DISCRIMINANT_BASE: u32 = 9;
const READY_DISCRIMINANT: u32 = 18;
const PROGRESS_DISCRIMINANT: u32 = 19;
const CONFIRM_REQUEST_DISCRIMINANT: u32 = 20;

impl From<EngineRequestType> for u32 {
    fn from(value: EngineRequestType) -> Self {
        match value {
            EngineRequestType::DeriveNearKeypairAndEncrypt => 0,
            EngineRequestType::DecryptPrivateKeyWithPrf => 1,
            EngineRequestType::CheckRegistrationEligibility => 2,
            EngineRequestType::SignAndRegisterUser => 3,
            EngineRequestType::SignTransactionsWithActions => 4,
            EngineRequestType::RecoverKeypairFromCredential => 5,
            EngineRequestType::ExtractCosePublicKey => 6,
            EngineRequestType::SignTransactionWithKeyPair => 7,
            EngineRequestType::SignNep413Message => 8,
        }
    }
}

impl TryFrom<u32> for EngineRequestType {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(EngineRequestType::DeriveNearKeypairAndEncrypt),
            1 => Ok(EngineRequestType::DecryptPrivateKeyWithPrf),
            2 => Ok(EngineRequestType::CheckRegistrationEligibility),
            3 => Ok(EngineRequestType::SignAndRegisterUser),
            4 => Ok(EngineRequestType::SignTransactionsWithActions),
            5 => Ok(EngineRequestType::RecoverKeypairFromCredential),
            6 => Ok(EngineRequestType::ExtractCosePublicKey),
            7 => Ok(EngineRequestType::SignTransactionWithKeyPair),
            8 => Ok(EngineRequestType::SignNep413Message),
            _ => Err(format!("Invalid EngineRequestType value: {}", value)),
        }
    }
}

impl EngineRequestType {
    pub fn name(&self) -> &'static str {
        match self {
            EngineRequestType::DeriveNearKeypairAndEncrypt => "DERIVE_NEAR_KEYPAIR_AND_ENCRYPT",
            EngineRequestType::DecryptPrivateKeyWithPrf => "DECRYPT_PRIVATE_KEY_WITH_PRF",
            EngineRequestType::CheckRegistrationEligibility => "CHECK_REGISTRATION_ELIGIBILITY",
            EngineRequestType::SignAndRegisterUser => "SIGN_AND_REGISTER_USER",
            EngineRequestType::SignTransactionsWithActions => "SIGN_TRANSACTIONS_WITH_ACTIONS",
            EngineRequestType::RecoverKeypairFromCredential => "RECOVER_KEYPAIR_FROM_CREDENTIAL",
            EngineRequestType::ExtractCosePublicKey => "EXTRACT_COSE_PUBLIC_KEY",
            EngineRequestType::SignTransactionWithKeyPair => "SIGN_TRANSACTION_WITH_KEYPAIR",
            EngineRequestType::SignNep413Message => "SIGN_NEP413_MESSAGE",
        }
    }

    pub fn success_discriminant(&self) -> u32 {
        u32::from(*self)
    }

    pub fn failure_discriminant(&self) -> u32 {
        u32::from(*self) + FAILURE_DISCRIMINANT_BASE
    }
}

/// Engine response types: one success and one failure discriminant per
/// request type, plus the lifecycle/streaming discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineResponseType {
    // Success responses - one for each request type
    DeriveNearKeypairAndEncryptSuccess,
    DecryptPrivateKeyWithPrfSuccess,
    CheckRegistrationEligibilitySuccess,
    SignAndRegisterUserSuccess,
    SignTransactionsWithActionsSuccess,
    RecoverKeypairFromCredentialSuccess,
    ExtractCosePublicKeySuccess,
    SignTransactionWithKeyPairSuccess,
    SignNep413MessageSuccess,

    // Failure responses - one for each request type
    DeriveNearKeypairAndEncryptFailure,
    DecryptPrivateKeyWithPrfFailure,
    CheckRegistrationEligibilityFailure,
    SignAndRegisterUserFailure,
    SignTransactionsWithActionsFailure,
    RecoverKeypairFromCredentialFailure,
    ExtractCosePublicKeyFailure,
    SignTransactionWithKeyPairFailure,
    SignNep413MessageFailure,

    // Lifecycle and streaming responses
    Ready,
    Progress,
    ConfirmRequest,
}

impl From<EngineResponseType> for u32 {
    fn from(value: EngineResponseType) -> Self {
        match value {
            // Success responses
            EngineResponseType::DeriveNearKeypairAndEncryptSuccess => 0,
            EngineResponseType::DecryptPrivateKeyWithPrfSuccess => 1,
            EngineResponseType::CheckRegistrationEligibilitySuccess => 2,
            EngineResponseType::SignAndRegisterUserSuccess => 3,
            EngineResponseType::SignTransactionsWithActionsSuccess => 4,
            EngineResponseType::RecoverKeypairFromCredentialSuccess => 5,
            EngineResponseType::ExtractCosePublicKeySuccess => 6,
            EngineResponseType::SignTransactionWithKeyPairSuccess => 7,
            EngineResponseType::SignNep413MessageSuccess => 8,

            // Failure responses
            EngineResponseType::DeriveNearKeypairAndEncryptFailure => 9,
            EngineResponseType::DecryptPrivateKeyWithPrfFailure => 10,
            EngineResponseType::CheckRegistrationEligibilityFailure => 11,
            EngineResponseType::SignAndRegisterUserFailure => 12,
            EngineResponseType::SignTransactionsWithActionsFailure => 13,
            EngineResponseType::RecoverKeypairFromCredentialFailure => 14,
            EngineResponseType::ExtractCosePublicKeyFailure => 15,
            EngineResponseType::SignTransactionWithKeyPairFailure => 16,
            EngineResponseType::SignNep413MessageFailure => 17,

            // Lifecycle and streaming responses
            EngineResponseType::Ready => READY_DISCRIMINANT,
            EngineResponseType::Progress => PROGRESS_DISCRIMINANT,
            EngineResponseType::ConfirmRequest => CONFIRM_REQUEST_DISCRIMINANT,
        }
    }
}

// === MESSAGE ENVELOPES ===

/// Operation envelope, orchestrator -> engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineRequestEnvelope {
    #[serde(rename = "type")]
    pub request_type: u32,
    pub payload: serde_json::Value,
}

impl EngineRequestEnvelope {
    pub fn new<T: Serialize>(request_type: EngineRequestType, payload: &T) -> Result<Self> {
        Ok(EngineRequestEnvelope {
            request_type: request_type.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn parse_payload<T: DeserializeOwned>(&self, request_type: EngineRequestType) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            OrchestratorError::Protocol(format!(
                "Failed to parse {} payload: {}",
                request_type.name(),
                e
            ))
        })
    }
}

/// Response envelope, engine -> orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineResponseEnvelope {
    #[serde(rename = "type")]
    pub response_type: u32,
    pub payload: serde_json::Value,
}

impl EngineResponseEnvelope {
    pub fn ready() -> Self {
        EngineResponseEnvelope {
            response_type: EngineResponseType::Ready.into(),
            payload: serde_json::json!({ "status": "ready" }),
        }
    }

    pub fn progress(message: &ProgressMessage) -> Result<Self> {
        Ok(EngineResponseEnvelope {
            response_type: EngineResponseType::Progress.into(),
            payload: serde_json::to_value(message)?,
        })
    }

    pub fn confirm_request(request: &SecureConfirmRequest) -> Result<Self> {
        Ok(EngineResponseEnvelope {
            response_type: EngineResponseType::ConfirmRequest.into(),
            payload: serde_json::to_value(request)?,
        })
    }

    pub fn success<T: Serialize>(request_type: EngineRequestType, payload: &T) -> Result<Self> {
        Ok(EngineResponseEnvelope {
            response_type: request_type.success_discriminant(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Failure payloads carry the scrubbed bare reason plus the taxonomy
    /// kind; `from_failure` re-applies the variant prefix on the far side.
    pub fn failure(request_type: EngineRequestType, error: &OrchestratorError) -> Self {
        let payload = FailurePayload {
            error: crate::error::scrub_error_message(&error.bare_message()),
            kind: error.kind().to_string(),
        };
        EngineResponseEnvelope {
            response_type: request_type.failure_discriminant(),
            payload: serde_json::to_value(&payload)
                .unwrap_or_else(|_| serde_json::json!({ "error": "serialization failure" })),
        }
    }
}

/// Everything an engine instance can receive on its inbound channel.
#[derive(Debug, Clone)]
pub enum EngineInbound {
    Operation(EngineRequestEnvelope),
    Decision(ConfirmationDecision),
}

// === RESPONSE CLASSIFICATION ===

/// The dispatch loop sorts every response envelope into exactly one category.
#[derive(Debug, Clone)]
pub enum ResponseCategory {
    Ready,
    Progress(ProgressMessage),
    ConfirmRequest(SecureConfirmRequest),
    Success(EngineRequestType, serde_json::Value),
    Failure(EngineRequestType, FailurePayload),
    Violation(String),
}

pub fn classify_response(envelope: EngineResponseEnvelope) -> ResponseCategory {
    match envelope.response_type {
        READY_DISCRIMINANT => ResponseCategory::Ready,
        PROGRESS_DISCRIMINANT => match serde_json::from_value(envelope.payload) {
            Ok(message) => ResponseCategory::Progress(message),
            Err(e) => ResponseCategory::Violation(format!("Malformed progress payload: {}", e)),
        },
        CONFIRM_REQUEST_DISCRIMINANT => match serde_json::from_value(envelope.payload) {
            Ok(request) => ResponseCategory::ConfirmRequest(request),
            Err(e) => ResponseCategory::Violation(format!("Malformed confirm payload: {}", e)),
        },
        value if value < FAILURE_DISCRIMINANT_BASE => match EngineRequestType::try_from(value) {
            Ok(request_type) => ResponseCategory::Success(request_type, envelope.payload),
            Err(e) => ResponseCategory::Violation(e),
        },
        value if value < READY_DISCRIMINANT => {
            match EngineRequestType::try_from(value - FAILURE_DISCRIMINANT_BASE) {
                Ok(request_type) => match serde_json::from_value(envelope.payload) {
                    Ok(payload) => ResponseCategory::Failure(request_type, payload),
                    Err(e) => {
                        ResponseCategory::Violation(format!("Malformed failure payload: {}", e))
                    }
                },
                Err(e) => ResponseCategory::Violation(e),
            }
        }
        other => ResponseCategory::Violation(format!("Unknown response discriminant: {}", other)),
    }
}
