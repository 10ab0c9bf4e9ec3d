// ******************************************************************************
// *                                                                            *
// *                      HANDLER 9: SIGN NEP-413 MESSAGE                       *
// *                                                                            *
// ******************************************************************************

use crate::confirm::FlowType;
use crate::crypto::{
    decrypt_data_chacha20, derive_encryption_key_from_prf_output, parse_near_private_key,
};
use crate::engine::handlers::confirm_intent::{confirm_flow, single_prf_output};
use crate::engine::nep413::sign_nep413_message;
use crate::engine::EngineIo;
use crate::error::{OrchestratorError, Result};
use crate::store::EncryptedKeyStore;
use crate::types::{SignNep413Request, SignNep413Result};

/// Off-chain message signing per NEP-413: confirm the message and
/// recipient with the user, decrypt the stored key, and sign the
/// borsh-serialized payload behind the tagged prefix.
pub async fn handle_sign_nep413_message(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request: SignNep413Request,
) -> Result<SignNep413Result> {
    let mut intent = serde_json::json!({
        "nearAccountId": request.account_id,
        "message": request.message,
        "recipient": request.recipient,
        "nonce": request.nonce,
    });
    if let Some(state) = &request.state {
        intent["state"] = serde_json::Value::String(state.clone());
    }
    let decision = confirm_flow(
        io,
        FlowType::MessageSigning,
        serde_json::json!({
            "message": request.message,
            "recipient": request.recipient,
        }),
        intent,
        request.confirmation_config.as_ref(),
    )
    .await?;
    let prf_output = single_prf_output(&decision)?;

    let record = key_store.get(&request.account_id).await?.ok_or_else(|| {
        OrchestratorError::Store(format!(
            "No encrypted key record found for {}",
            request.account_id
        ))
    })?;
    let kek = derive_encryption_key_from_prf_output(&prf_output)?;
    let private_key = decrypt_data_chacha20(&record.encrypted_data, &record.iv, &kek)?;
    let signing_key = parse_near_private_key(&private_key)?;

    let signed = sign_nep413_message(
        &signing_key,
        &request.message,
        &request.recipient,
        &request.nonce,
        request.state.as_deref(),
    )?;

    Ok(SignNep413Result {
        account_id: request.account_id,
        public_key: signed.public_key,
        signature: signed.signature,
        state: request.state,
    })
}
