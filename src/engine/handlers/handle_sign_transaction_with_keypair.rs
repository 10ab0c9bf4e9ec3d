// ******************************************************************************
// *                                                                            *
// *                  HANDLER 8: SIGN TRANSACTION WITH KEYPAIR                  *
// *                                                                            *
// ******************************************************************************

use crate::crypto::parse_near_private_key;
use crate::engine::handlers::sign_transaction_request;
use crate::error::Result;
use crate::types::{SignTransactionWithKeyPairRequest, SignTransactionWithKeyPairResult};

/// Escape hatch for flows that already hold a raw private key, such as
/// key rotation right after recovery. No ceremony, no store: the caller
/// supplies everything and the key never persists here.
pub fn handle_sign_transaction_with_keypair(
    request: SignTransactionWithKeyPairRequest,
) -> Result<SignTransactionWithKeyPairResult> {
    let signing_key = parse_near_private_key(&request.near_private_key)?;
    let (signed_transaction, transaction_hash) = sign_transaction_request(
        &signing_key,
        &request.signer_account_id,
        &request.receiver_id,
        &request.actions,
        &request.nonce,
        &request.block_hash,
    )?;
    Ok(SignTransactionWithKeyPairResult {
        signed_transaction,
        transaction_hash,
    })
}
