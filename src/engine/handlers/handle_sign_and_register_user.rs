// ******************************************************************************
// *                                                                            *
// *                     HANDLER 4: SIGN AND REGISTER USER                      *
// *                                                                            *
// ******************************************************************************

use log::info;

use crate::confirm::FlowType;
use crate::crypto::{
    derive_ed25519_key_from_prf_output, derive_encryption_key_from_prf_output,
    encrypt_data_chacha20, parse_near_private_key,
};
use crate::engine::handlers::confirm_intent::{
    confirm_flow, dual_prf_outputs, registration_credential, registration_summary,
    required_transaction_context,
};
use crate::engine::handlers::{nonce_at_offset, sign_transaction_request};
use crate::engine::registration::cose_public_key_from_credential;
use crate::engine::EngineIo;
use crate::error::Result;
use crate::store::EncryptedKeyStore;
use crate::types::{SignAndRegisterUserRequest, SignAndRegisterUserResult};

/// Full registration: create-ceremony confirm, COSE key extraction from the
/// attestation object, keypair derivation and encrypted storage, and the
/// on-chain registration signature. `link_device` swaps the flow so the UI
/// presents it as adding a device, not claiming a fresh account.
pub async fn handle_sign_and_register_user(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request: SignAndRegisterUserRequest,
) -> Result<SignAndRegisterUserResult> {
    let device_number = request.device_number.unwrap_or(0);
    let flow = if request.link_device {
        FlowType::LinkDevice
    } else {
        FlowType::Registration
    };

    let mut intent = serde_json::json!({
        "nearAccountId": request.near_account_id,
        "deviceNumber": device_number,
        "linkDevice": request.link_device,
    });
    if let Some(tx) = &request.registration_tx {
        intent["registrationTx"] = serde_json::to_value(tx)?;
    }
    let decision = confirm_flow(
        io,
        flow,
        registration_summary(&request.near_account_id, device_number),
        intent,
        request.confirmation_config.as_ref(),
    )
    .await?;
    let prf = dual_prf_outputs(&decision)?;
    let credential = registration_credential(&decision)?;
    let cose_public_key = cose_public_key_from_credential(&credential)?;

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

    let signed_registration = match &request.registration_tx {
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
        "Registered {} (device {}, link_device: {})",
        request.near_account_id, device_number, request.link_device
    );
    Ok(SignAndRegisterUserResult {
        success: true,
        public_key: near_public_key,
        cose_public_key,
        signed_registration,
        stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::base64_url_encode;
    use crate::engine::handlers::testing::{
        approved_registration_decision, engine_io_pair, respond_to_confirmation,
    };
    use crate::engine::registration::fixtures::mock_attestation_object_b64u;
    use crate::store::MemoryStoreBackend;
    use crate::types::TransactionSigningRequest;
    use std::sync::Arc;

    fn prf_b64u(seed: u8) -> String {
        base64_url_encode(&[seed; 32])
    }

    fn registration_credential_json() -> serde_json::Value {
        serde_json::json!({
            "id": "cred-id",
            "rawId": "cred-id",
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "response": {
                "clientDataJSON": base64_url_encode(br#"{"type":"webauthn.create"}"#),
                "attestationObject": mock_attestation_object_b64u(),
                "transports": ["internal"],
            },
            "clientExtensionResults": {
                "prf": { "results": { "first": null, "second": null } },
            },
        })
    }

    fn register_request(
        link_device: bool,
        registration_tx: Option<TransactionSigningRequest>,
    ) -> SignAndRegisterUserRequest {
        SignAndRegisterUserRequest {
            near_account_id: "alice.testnet".to_string(),
            device_number: None,
            link_device,
            registration_tx,
            confirmation_config: None,
        }
    }

    #[tokio::test]
    async fn registers_and_extracts_the_cose_key() {
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();

        let (chacha20, ed25519) = (prf_b64u(1), prf_b64u(2));
        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            let mut decision = approved_registration_decision(request, &chacha20, &ed25519);
            decision.credential = Some(registration_credential_json());
            decision
        });
        let handler = handle_sign_and_register_user(&mut io, &key_store, register_request(false, None));
        let (outcome, request) = tokio::join!(handler, responder);

        let result = outcome.unwrap();
        assert!(result.success);
        assert!(result.stored);
        assert!(result.public_key.starts_with("ed25519:"));
        assert!(!result.cose_public_key.is_empty());
        assert!(result.signed_registration.is_none());
        assert_eq!(request.request_type, "registerAccount");
        assert!(key_store.verify("alice.testnet").await.unwrap());
    }

    #[tokio::test]
    async fn link_device_switches_the_flow() {
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();

        let (chacha20, ed25519) = (prf_b64u(1), prf_b64u(2));
        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            let mut decision = approved_registration_decision(request, &chacha20, &ed25519);
            decision.credential = Some(registration_credential_json());
            decision
        });
        let handler = handle_sign_and_register_user(&mut io, &key_store, register_request(true, None));
        let (outcome, request) = tokio::join!(handler, responder);

        outcome.unwrap();
        assert_eq!(request.request_type, "linkDevice");
    }

    #[tokio::test]
    async fn signs_the_registration_transaction() {
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();

        let tx = TransactionSigningRequest {
            near_account_id: "alice.testnet".to_string(),
            receiver_id: "webauthn-contract.testnet".to_string(),
            actions: r#"[{"type":"FunctionCall","method_name":"create_account"}]"#.to_string(),
        };
        let (chacha20, ed25519) = (prf_b64u(1), prf_b64u(2));
        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            let mut decision = approved_registration_decision(request, &chacha20, &ed25519);
            decision.credential = Some(registration_credential_json());
            decision
        });
        let handler =
            handle_sign_and_register_user(&mut io, &key_store, register_request(false, Some(tx)));
        let (outcome, _request) = tokio::join!(handler, responder);

        let result = outcome.unwrap();
        let signed = result.signed_registration.expect("registration tx signed");
        assert_eq!(signed.transaction["nonce"], "42");
        assert_eq!(signed.transaction["receiverId"], "webauthn-contract.testnet");
        assert_eq!(signed.public_key, result.public_key);
    }

    #[tokio::test]
    async fn opaque_credential_fails_parsing() {
        let key_store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let (mut io, inbound_tx, mut outbound_rx) = engine_io_pair();

        let (chacha20, ed25519) = (prf_b64u(1), prf_b64u(2));
        let responder = respond_to_confirmation(&mut outbound_rx, &inbound_tx, |request| {
            approved_registration_decision(request, &chacha20, &ed25519)
        });
        let handler = handle_sign_and_register_user(&mut io, &key_store, register_request(false, None));
        let (outcome, _request) = tokio::join!(handler, responder);

        let err = outcome.unwrap_err();
        assert!(err
            .to_string()
            .contains("Failed to parse registration credential"));
    }
}
