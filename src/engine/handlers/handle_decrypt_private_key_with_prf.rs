// ******************************************************************************
// *                                                                            *
// *                  HANDLER 2: DECRYPT PRIVATE KEY WITH PRF                   *
// *                                                                            *
// ******************************************************************************

use crate::confirm::FlowType;
use crate::crypto::{decrypt_data_chacha20, derive_encryption_key_from_prf_output};
use crate::engine::handlers::confirm_intent::{confirm_flow, single_prf_output};
use crate::engine::EngineIo;
use crate::error::{OrchestratorError, Result};
use crate::store::EncryptedKeyStore;
use crate::types::{DecryptPrivateKeyRequest, DecryptPrivateKeyResult};

/// Silent decrypt-for-export. The flow skips UI unconditionally; the
/// assertion ceremony itself gates the export.
pub async fn handle_decrypt_private_key_with_prf(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request: DecryptPrivateKeyRequest,
) -> Result<DecryptPrivateKeyResult> {
    let intent = serde_json::json!({
        "nearAccountId": request.near_account_id,
    });
    let decision = confirm_flow(
        io,
        FlowType::LocalOnly,
        serde_json::json!({ "nearAccountId": request.near_account_id }),
        intent,
        None,
    )
    .await?;
    let prf_output = single_prf_output(&decision)?;

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
    let decrypted = decrypt_data_chacha20(&record.encrypted_data, &record.iv, &kek)?;

    Ok(DecryptPrivateKeyResult {
        private_key: decrypted.as_str().to_string(),
        near_account_id: request.near_account_id,
    })
}
