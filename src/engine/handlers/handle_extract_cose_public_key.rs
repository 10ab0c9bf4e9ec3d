// ******************************************************************************
// *                                                                            *
// *                     HANDLER 7: EXTRACT COSE PUBLIC KEY                     *
// *                                                                            *
// ******************************************************************************

use crate::engine::registration::cose_public_key_from_credential;
use crate::error::Result;
use crate::types::{ExtractCosePublicKeyRequest, ExtractCosePublicKeyResult};

/// Pull the COSE public key out of a registration credential's attestation
/// object. Pure parsing; no ceremony and no store access.
pub fn handle_extract_cose_public_key(
    request: ExtractCosePublicKeyRequest,
) -> Result<ExtractCosePublicKeyResult> {
    let cose_public_key = cose_public_key_from_credential(&request.credential)?;
    Ok(ExtractCosePublicKeyResult { cose_public_key })
}
