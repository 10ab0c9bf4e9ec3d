// ******************************************************************************
// *                                                                            *
// *                     SHARED CONFIRMATION ROUND-TRIP                         *
// *                                                                            *
// ******************************************************************************
//! Builds SecureConfirmRequests for handlers that need user presence and
//! maps declined decisions into errors. The intent digest covers the
//! user-intent material only; transport extras (the confirmation config)
//! ride in the payload but stay outside the digest.

use serde_json::Value;

use crate::config::CONFIRMATION_SCHEMA_VERSION;
use crate::confirm::FlowType;
use crate::digest::{compute_intent_digest, generate_request_id};
use crate::engine::EngineIo;
use crate::error::{OrchestratorError, Result};
use crate::types::{
    ConfirmationConfig, ConfirmationDecision, DualPrfOutputs, SecureConfirmRequest,
    SerializedRegistrationCredential, TransactionContext,
};

/// Run one confirmation for `flow`: emit the request, await the decision.
/// Declined decisions become ceremony errors carrying the decision's
/// reason, or the generic cancellation message when none was given.
pub(crate) async fn confirm_flow(
    io: &mut EngineIo,
    flow: FlowType,
    summary: Value,
    intent: Value,
    confirmation_config: Option<&ConfirmationConfig>,
) -> Result<ConfirmationDecision> {
    let intent_digest = compute_intent_digest(&intent)?;

    let mut payload = intent;
    if let Some(config) = confirmation_config {
        payload["confirmationConfig"] = serde_json::to_value(config)?;
    }

    let request = SecureConfirmRequest {
        schema_version: CONFIRMATION_SCHEMA_VERSION,
        request_id: generate_request_id(),
        request_type: flow.wire_name().to_string(),
        summary,
        payload,
        intent_digest,
    };
    let decision = io.request_confirmation(request).await?;

    if !decision.confirmed {
        return Err(match decision.error.as_deref() {
            Some(reason) if !reason.is_empty() => OrchestratorError::Ceremony(reason.to_string()),
            _ => OrchestratorError::Ceremony("User cancelled the operation".to_string()),
        });
    }
    Ok(decision)
}

/// Summary shown for registration-grade flows.
pub(crate) fn registration_summary(near_account_id: &str, device_number: u32) -> Value {
    serde_json::json!({
        "type": "registration",
        "nearAccountId": near_account_id,
        "deviceNumber": device_number,
    })
}

pub(crate) fn single_prf_output(decision: &ConfirmationDecision) -> Result<String> {
    decision.prf_output.clone().ok_or_else(|| {
        OrchestratorError::Ceremony("Confirmation decision missing PRF output".to_string())
    })
}

pub(crate) fn dual_prf_outputs(decision: &ConfirmationDecision) -> Result<DualPrfOutputs> {
    decision.dual_prf_outputs.clone().ok_or_else(|| {
        OrchestratorError::Ceremony("Confirmation decision missing dual PRF outputs".to_string())
    })
}

pub(crate) fn required_transaction_context(
    decision: &ConfirmationDecision,
) -> Result<TransactionContext> {
    decision.transaction_context.clone().ok_or_else(|| {
        OrchestratorError::Protocol(
            "Confirmation decision missing transaction context".to_string(),
        )
    })
}

/// Registration credential attached to the decision, parsed.
pub(crate) fn registration_credential(
    decision: &ConfirmationDecision,
) -> Result<SerializedRegistrationCredential> {
    let raw = decision.credential.as_ref().ok_or_else(|| {
        OrchestratorError::Ceremony("Confirmation decision missing credential".to_string())
    })?;
    serde_json::from_value(raw.clone()).map_err(|e| {
        OrchestratorError::Ceremony(format!("Failed to parse registration credential: {}", e))
    })
}
