// ******************************************************************************
// *                                                                            *
// *                 HANDLER 3: CHECK REGISTRATION ELIGIBILITY                  *
// *                                                                            *
// ******************************************************************************

use crate::error::Result;
use crate::store::EncryptedKeyStore;
use crate::types::{CheckRegistrationEligibilityRequest, RegistrationEligibilityResult};

/// NEAR account-id sanity: 2..=64 chars of lowercase alphanumerics and
/// `.`/`_`/`-` separators. Full chain-side grammar is the RPC's problem.
fn account_id_looks_valid(near_account_id: &str) -> bool {
    if !(2..=64).contains(&near_account_id.len()) {
        return false;
    }
    near_account_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Pre-registration probe. No ceremony: this reads the key store only.
pub async fn handle_check_registration_eligibility(
    key_store: &EncryptedKeyStore,
    request: CheckRegistrationEligibilityRequest,
) -> Result<RegistrationEligibilityResult> {
    if !account_id_looks_valid(&request.near_account_id) {
        return Ok(RegistrationEligibilityResult {
            eligible: false,
            registered: false,
            reason: Some(format!(
                "Invalid NEAR account ID: {}",
                request.near_account_id
            )),
        });
    }

    let registered = match request.device_number {
        Some(device_number) => key_store
            .get_device(&request.near_account_id, device_number)
            .await?
            .is_some(),
        None => key_store.verify(&request.near_account_id).await?,
    };

    if registered {
        return Ok(RegistrationEligibilityResult {
            eligible: false,
            registered: true,
            reason: Some(format!(
                "An encrypted key is already stored for {}",
                request.near_account_id
            )),
        });
    }

    Ok(RegistrationEligibilityResult {
        eligible: true,
        registered: false,
        reason: None,
    })
}
