// ******************************************************************************
// *                                                                            *
// *                 HANDLER 6: RECOVER KEYPAIR FROM CREDENTIAL                 *
// *                                                                            *
// ******************************************************************************

use log::{debug, info};

use crate::config::RECOVERY_ACCOUNT_FALLBACK;
use crate::crypto::{
    derive_ed25519_key_from_prf_output, derive_encryption_key_from_prf_output,
    encrypt_data_chacha20,
};
use crate::error::Result;
use crate::store::EncryptedKeyStore;
use crate::types::{RecoverKeypairRequest, RecoverKeypairResult};

/// Account recovery: the ceremony already ran on the caller's side, so the
/// dual PRF outputs arrive with the request. Re-derives the deterministic
/// keypair and re-encrypts it into the store under the hinted account id.
pub async fn handle_recover_keypair_from_credential(
    key_store: &EncryptedKeyStore,
    request: RecoverKeypairRequest,
) -> Result<RecoverKeypairResult> {
    debug!(
        "Recovering keypair from authentication credential {}",
        request.credential.id
    );
    let near_account_id = request
        .account_id_hint
        .as_deref()
        .unwrap_or(RECOVERY_ACCOUNT_FALLBACK);
    let device_number = request.device_number.unwrap_or(0);

    let (near_private_key, near_public_key) = derive_ed25519_key_from_prf_output(
        &request.dual_prf_outputs.ed25519_prf_output,
        near_account_id,
    )?;
    let kek = derive_encryption_key_from_prf_output(&request.dual_prf_outputs.chacha20_prf_output)?;
    let encrypted = encrypt_data_chacha20(&near_private_key, &kek)?;

    let record = EncryptedKeyStore::record(
        near_account_id,
        device_number,
        &encrypted.encrypted_data_b64u,
        &encrypted.iv_b64u,
    );
    key_store.put(&record).await?;
    let stored = key_store.verify(near_account_id).await?;

    info!(
        "Recovered keypair for {} (device {})",
        near_account_id, device_number
    );
    Ok(RecoverKeypairResult {
        public_key: near_public_key,
        near_account_id: near_account_id.to_string(),
        stored,
    })
}
