// ******************************************************************************
// *                                                                            *
// *                 HANDLER 1: DERIVE NEAR KEYPAIR AND ENCRYPT                 *
// *                                                                            *
// ******************************************************************************

use log::info;

use crate::confirm::FlowType;
use crate::crypto::{
    derive_ed25519_key_from_prf_output, derive_encryption_key_from_prf_output,
    encrypt_data_chacha20, parse_near_private_key,
};
use crate::engine::handlers::confirm_intent::{
    confirm_flow, dual_prf_outputs, registration_summary, required_transaction_context,
};
use crate::engine::handlers::{nonce_at_offset, sign_transaction_request};
use crate::engine::EngineIo;
use crate::error::Result;
use crate::store::EncryptedKeyStore;
use crate::types::{DeriveNearKeypairAndEncryptRequest, DeriveNearKeypairAndEncryptResult};

/// Registration-grade derivation: run the create ceremony, derive the
/// signing key from the Ed25519 PRF output, encrypt the private key under
/// the ChaCha20 PRF KEK, store with post-write verification, and sign the
/// registration transaction when one was supplied.
pub async fn handle_derive_near_keypair_and_encrypt(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request: DeriveNearKeypairAndEncryptRequest,
) -> Result<DeriveNearKeypairAndEncryptResult> {
    let device_number = request.device_number.unwrap_or(0);

    let mut intent = serde_json::json!({
        "nearAccountId": request.near_account_id,
        "deviceNumber": device_number,
    });
    if let Some(tx) = &request.registration_tx {
        intent["registrationTx"] = serde_json::to_value(tx)?;
    }
    let decision = confirm_flow(
        io,
        FlowType::Registration,
        registration_summary(&request.near_account_id, device_number),
        intent,
        request.confirmation_config.as_ref(),
    )
    .await?;
    let prf = dual_prf_outputs(&decision)?;

    let (near_private_key, near_public_key) =
        derive_ed25519_key_from_prf_output(&prf.ed25519_prf_output, &request.near_account_id)?;
    let kek = derive_encryption_key_from_prf_output(&prf.chacha20_prf_output)?;
    let encrypted = encrypt_data_chacha20(&near_private_key, &kek)?;

    let record = EncryptedKeyStore::record(
        &request.near_account_id,
        device_number,
        &encrypted.encrypted_data_b64u,
        &encrypted.iv_b64u,
    );
    key_store.put(&record).await?;
    let stored = key_store.verify(&request.near_account_id).await?;

    let signed_transaction = match &request.registration_tx {
        Some(tx) => {
            let context = required_transaction_context(&decision)?;
            let signing_key = parse_near_private_key(&near_private_key)?;
            let nonce = nonce_at_offset(&context.next_nonce, 0)?;
            let (signed, _hash) = sign_transaction_request(
                &signing_key,
                &tx.near_account_id,
                &tx.receiver_id,
                &tx.actions,
                &nonce,
                &context.tx_block_hash,
            )?;
            Some(signed)
        }
        None => None,
    };

    info!(
        "Derived and stored keypair for {} (device {})",
        request.near_account_id, device_number
    );
    Ok(DeriveNearKeypairAndEncryptResult {
        near_account_id: request.near_account_id,
        public_key: near_public_key,
        stored,
        signed_transaction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::base64_url_encode;
    use crate::engine::handlers::testing::{
        approved_registration_decision, engine_io_pair, respond_to_confirmation,
    };
    use crate::store::MemoryStoreBackend;
    use crate::types::TransactionSigningRequest;
    use std::sync::Arc;

    fn prf_b64u(seed: u8) -> String {
        base64_url_encode(&[seed; 32])
    }

    fn derive_request(registration_tx: Option<TransactionSigningRequest>) -> DeriveNearKeypairAndEncryptRequest {
        DeriveNearKeypairAndEncryptRequest {
            near_account_id: "alice.testnet".to_string(),
            device_number: None,
            registration_tx,
            confirmation_config: None,
        }
    }

    #[tokio::test]
    async fn derives_encrypts_and_stores() {
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));

        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            approved_registration_decision(request, &prf_b64u(1), &prf_b64u(2))
        });
        let handler = handle_derive_near_keypair_and_encrypt(
            &mut io,
            &key_store,
            derive_request(None),
        );
        let (outcome, _request) = tokio::join!(handler, responder);

        let result = outcome.unwrap();
        assert!(result.stored);
        assert!(result.public_key.starts_with("ed25519:"));
        assert!(result.signed_transaction.is_none());

        let record = key_store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(record.device_number, 0);
        assert!(!record.encrypted_data.is_empty());
    }

    #[tokio::test]
    async fn signs_the_registration_transaction_with_context_nonce() {
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));

        let tx = TransactionSigningRequest {
            near_account_id: "alice.testnet".to_string(),
            receiver_id: "contract.testnet".to_string(),
            actions: "[{\"type\":\"FunctionCall\"}]".to_string(),
        };
        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            approved_registration_decision(request, &prf_b64u(1), &prf_b64u(2))
        });
        let handler = handle_derive_near_keypair_and_encrypt(
            &mut io,
            &key_store,
            derive_request(Some(tx)),
        );
        let (outcome, _request) = tokio::join!(handler, responder);

        let result = outcome.unwrap();
        let signed = result.signed_transaction.expect("registration tx signed");
        assert_eq!(signed.transaction["nonce"], "42");
        assert_eq!(signed.transaction["receiverId"], "contract.testnet");
        assert_eq!(signed.public_key, result.public_key);
    }

    #[tokio::test]
    async fn same_prf_outputs_derive_the_same_public_key() {
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let mut public_keys = Vec::new();

        for _ in 0..2 {
            let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();
            let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
                approved_registration_decision(request, &prf_b64u(1), &prf_b64u(2))
            });
            let handler = handle_derive_near_keypair_and_encrypt(
                &mut io,
                &key_store,
                derive_request(None),
            );
            let (outcome, _request) = tokio::join!(handler, responder);
            public_keys.push(outcome.unwrap().public_key);
        }

        assert_eq!(public_keys[0], public_keys[1]);
    }
}
