pub mod confirm_intent;
pub mod handle_check_registration_eligibility;
pub mod handle_decrypt_private_key_with_prf;
pub mod handle_derive_near_keypair_and_encrypt;
pub mod handle_extract_cose_public_key;
pub mod handle_recover_keypair_from_credential;
pub mod handle_sign_and_register_user;
pub mod handle_sign_nep413_message;
pub mod handle_sign_transaction_with_keypair;
pub mod handle_sign_transactions_with_actions;

// Handler functions
pub use handle_check_registration_eligibility::handle_check_registration_eligibility;
pub use handle_decrypt_private_key_with_prf::handle_decrypt_private_key_with_prf;
pub use handle_derive_near_keypair_and_encrypt::handle_derive_near_keypair_and_encrypt;
pub use handle_extract_cose_public_key::handle_extract_cose_public_key;
pub use handle_recover_keypair_from_credential::handle_recover_keypair_from_credential;
pub use handle_sign_and_register_user::handle_sign_and_register_user;
pub use handle_sign_nep413_message::handle_sign_nep413_message;
pub use handle_sign_transaction_with_keypair::handle_sign_transaction_with_keypair;
pub use handle_sign_transactions_with_actions::handle_sign_transactions_with_actions;

use ed25519_dalek::Signer;

use crate::crypto::near_public_key_str;
use crate::digest::compute_canonical_digest;
use crate::encoders::base64_standard_encode;
use crate::error::{OrchestratorError, Result};
use crate::types::SignedTransaction;

/// Sign one transaction signing request: canonical JSON of the request,
/// SHA-256 digest, Ed25519 signature over the digest. The hash is the
/// base58 of the digest.
pub(crate) fn sign_transaction_request(
    signing_key: &ed25519_dalek::SigningKey,
    near_account_id: &str,
    receiver_id: &str,
    actions_json: &str,
    nonce: &str,
    block_hash: &str,
) -> Result<(SignedTransaction, String)> {
    let transaction = serde_json::json!({
        "nearAccountId": near_account_id,
        "receiverId": receiver_id,
        "actions": actions_json,
        "nonce": nonce,
        "blockHash": block_hash,
    });
    let digest = compute_canonical_digest(&transaction)?;
    let signature = signing_key.sign(&digest);

    let signed = SignedTransaction {
        transaction,
        signature: base64_standard_encode(&signature.to_bytes()),
        public_key: near_public_key_str(&signing_key.verifying_key()),
    };
    let transaction_hash = bs58::encode(&digest).into_string();
    Ok((signed, transaction_hash))
}

/// Nonce for the transaction at `index` within a batch, relative to the
/// context's next account nonce.
pub(crate) fn nonce_at_offset(next_nonce: &str, index: u64) -> Result<String> {
    let base: u64 = next_nonce.parse().map_err(|_| {
        OrchestratorError::Protocol(format!(
            "Invalid nonce in transaction context: {}",
            next_nonce
        ))
    })?;
    let nonce = base.checked_add(index).ok_or_else(|| {
        OrchestratorError::Protocol(format!("Nonce overflow at batch index {}", index))
    })?;
    Ok(nonce.to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::sync::mpsc;

    use crate::engine::EngineIo;
    use crate::types::{
        classify_response, ConfirmationDecision, DualPrfOutputs, EngineInbound,
        EngineResponseEnvelope, ResponseCategory, SecureConfirmRequest, TransactionContext,
    };

    pub(crate) fn engine_io_pair() -> (
        EngineIo,
        mpsc::Sender<EngineInbound>,
        mpsc::Receiver<EngineResponseEnvelope>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        (
            EngineIo::from_channels(inbound_rx, outbound_tx),
            inbound_tx,
            outbound_rx,
        )
    }

    pub(crate) fn test_transaction_context() -> TransactionContext {
        TransactionContext {
            near_public_key_str: String::new(),
            next_nonce: "42".to_string(),
            tx_block_height: "100".to_string(),
            tx_block_hash: "11111111111111111111111111111111".to_string(),
        }
    }

    /// Read one outbound envelope, require it to be a ConfirmRequest, and
    /// answer with the decision the closure builds from it.
    pub(crate) async fn respond_to_confirmation(
        outbound_rx: &mut mpsc::Receiver<EngineResponseEnvelope>,
        inbound_tx: &mpsc::Sender<EngineInbound>,
        build: impl FnOnce(&SecureConfirmRequest) -> ConfirmationDecision,
    ) -> SecureConfirmRequest {
        let envelope = outbound_rx.recv().await.expect("engine closed its channel");
        let request = match classify_response(envelope) {
            ResponseCategory::ConfirmRequest(request) => request,
            other => panic!("expected a confirm request, got {:?}", other),
        };
        let decision = build(&request);
        inbound_tx
            .send(EngineInbound::Decision(decision))
            .await
            .expect("engine dropped its inbound channel");
        request
    }

    pub(crate) fn approved_signing_decision(
        request: &SecureConfirmRequest,
        prf_output: &str,
    ) -> ConfirmationDecision {
        ConfirmationDecision {
            request_id: request.request_id.clone(),
            intent_digest: Some(request.intent_digest.clone()),
            confirmed: true,
            credential: Some(serde_json::json!({ "id": "test-credential" })),
            prf_output: Some(prf_output.to_string()),
            transaction_context: Some(test_transaction_context()),
            ..Default::default()
        }
    }

    pub(crate) fn approved_registration_decision(
        request: &SecureConfirmRequest,
        chacha20_prf: &str,
        ed25519_prf: &str,
    ) -> ConfirmationDecision {
        ConfirmationDecision {
            request_id: request.request_id.clone(),
            intent_digest: Some(request.intent_digest.clone()),
            confirmed: true,
            credential: Some(serde_json::json!({ "id": "test-credential" })),
            dual_prf_outputs: Some(DualPrfOutputs {
                chacha20_prf_output: chacha20_prf.to_string(),
                ed25519_prf_output: ed25519_prf.to_string(),
            }),
            transaction_context: Some(test_transaction_context()),
            ..Default::default()
        }
    }
}
