// ******************************************************************************
// *                                                                            *
// *                  HANDLER 5: SIGN TRANSACTIONS WITH ACTIONS                 *
// *                                                                            *
// ******************************************************************************

use log::warn;

use crate::confirm::{transaction_summary, FlowType};
use crate::crypto::{
    decrypt_data_chacha20, derive_encryption_key_from_prf_output, parse_near_private_key,
};
use crate::engine::handlers::confirm_intent::{
    confirm_flow, required_transaction_context, single_prf_output,
};
use crate::engine::handlers::{nonce_at_offset, sign_transaction_request};
use crate::engine::EngineIo;
use crate::error::{scrub_error_message, OrchestratorError, Result};
use crate::store::EncryptedKeyStore;
use crate::types::{
    ProgressData, ProgressMessage, ProgressStatus, ProgressStep, SignTransactionsWithActionsRequest,
    SignedTransactionOutcome,
};

/// Batch signing: one ceremony covers every transaction in the request,
/// the key is decrypted once, and nonces advance from the context's next
/// nonce by batch index. A transaction that fails to sign produces a
/// failed outcome in its slot; the rest of the batch continues.
pub async fn handle_sign_transactions_with_actions(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request: SignTransactionsWithActionsRequest,
) -> Result<Vec<SignedTransactionOutcome>> {
    if request.tx_signing_requests.is_empty() {
        return Err(OrchestratorError::Protocol(
            "No transaction signing requests provided".to_string(),
        ));
    }
    let total = request.tx_signing_requests.len();

    for tx in &request.tx_signing_requests {
        if tx.near_account_id != request.near_account_id {
            return Err(OrchestratorError::Protocol(format!(
                "All transactions must use the same NEAR account ID; got {} and {}",
                request.near_account_id, tx.near_account_id
            )));
        }
    }

    let mut confirm_data = ProgressData::new(1, 4);
    confirm_data.transaction_count = Some(total);
    io.send_progress(
        &ProgressMessage::new(
            ProgressStep::UserConfirmation,
            ProgressStatus::Progress,
            "Requesting user confirmation...",
        )
        .with_data(&confirm_data),
    )
    .await;

    let receivers_and_actions: Vec<(String, serde_json::Value)> = request
        .tx_signing_requests
        .iter()
        .map(|tx| (tx.receiver_id.clone(), tx.parsed_actions_value()))
        .collect();
    let intent = serde_json::json!({
        "nearAccountId": request.near_account_id,
        "txSigningRequests": request.tx_signing_requests,
    });
    let decision = confirm_flow(
        io,
        FlowType::Signing,
        transaction_summary(&receivers_and_actions),
        intent,
        request.confirmation_config.as_ref(),
    )
    .await?;
    let prf_output = single_prf_output(&decision)?;
    let context = required_transaction_context(&decision)?;

    io.send_progress(
        &ProgressMessage::new(
            ProgressStep::AuthenticationComplete,
            ProgressStatus::Progress,
            "User confirmed; decrypting signing key...",
        )
        .with_data(&ProgressData::new(2, 4)),
    )
    .await;

    let record = key_store
        .get(&request.near_account_id)
        .await?
        .ok_or_else(|| {
            OrchestratorError::Store(format!(
                "No encrypted key record found for {}",
                request.near_account_id
            ))
        })?;
    let kek = derive_encryption_key_from_prf_output(&prf_output)?;
    let private_key = decrypt_data_chacha20(&record.encrypted_data, &record.iv, &kek)?;
    let signing_key = parse_near_private_key(&private_key)?;

    let mut outcomes = Vec::with_capacity(total);
    for (index, tx) in request.tx_signing_requests.iter().enumerate() {
        io.send_progress(
            &ProgressMessage::new(
                ProgressStep::TransactionSigningProgress,
                ProgressStatus::Progress,
                &format!("Signing transaction {} of {}", index + 1, total),
            )
            .with_data(&ProgressData::new((index + 1) as u32, total as u32)),
        )
        .await;

        let signed = nonce_at_offset(&context.next_nonce, index as u64).and_then(|nonce| {
            sign_transaction_request(
                &signing_key,
                &tx.near_account_id,
                &tx.receiver_id,
                &tx.actions,
                &nonce,
                &context.tx_block_hash,
            )
        });
        match signed {
            Ok((signed_transaction, transaction_hash)) => {
                outcomes.push(SignedTransactionOutcome {
                    success: true,
                    transaction_hash: Some(transaction_hash),
                    signed_transaction: Some(signed_transaction),
                    error: None,
                })
            }
            Err(e) => {
                warn!("Transaction {} of {} failed to sign: {}", index + 1, total, e);
                outcomes.push(SignedTransactionOutcome {
                    success: false,
                    transaction_hash: None,
                    signed_transaction: None,
                    error: Some(scrub_error_message(&e.to_string())),
                });
            }
        }
    }

    let signed_count = outcomes.iter().filter(|o| o.success).count();
    let mut done_data = ProgressData::new(4, 4);
    done_data.transaction_count = Some(total);
    done_data.success = Some(signed_count == total);
    io.send_progress(
        &ProgressMessage::new(
            ProgressStep::TransactionSigningComplete,
            ProgressStatus::Success,
            &format!("{} of {} transactions signed", signed_count, total),
        )
        .with_data(&done_data),
    )
    .await;

    Ok(outcomes)
}
