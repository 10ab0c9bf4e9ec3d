//! Engine runtime.
//!
//! An engine is one spawned task owning an inbound channel (operations
//! and confirmation decisions) and an outbound channel (Ready, Progress,
//! ConfirmRequest, Success, Failure). It announces Ready once, then
//! serves one operation at a time. Handler errors become Failure
//! envelopes after secret scrubbing; bad input never panics the task.

pub mod handlers;
pub mod nep413;
pub mod registration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::error::{find_forbidden_secret_key, OrchestratorError, Result};
use crate::pool::{EngineLauncher, LaunchedEngine};
use crate::store::EncryptedKeyStore;
use crate::types::{
    ConfirmationDecision, EngineInbound, EngineRequestEnvelope, EngineRequestType,
    EngineResponseEnvelope, ProgressMessage, SecureConfirmRequest,
};

const ENGINE_CHANNEL_CAPACITY: usize = 32;

/// The engine side of the instance channel pair.
pub struct EngineIo {
    inbound: mpsc::Receiver<EngineInbound>,
    outbound: mpsc::Sender<EngineResponseEnvelope>,
}

impl EngineIo {
    pub(crate) fn from_channels(
        inbound: mpsc::Receiver<EngineInbound>,
        outbound: mpsc::Sender<EngineResponseEnvelope>,
    ) -> Self {
        EngineIo { inbound, outbound }
    }

    /// Next operation envelope. Decisions arriving with no confirmation
    /// in flight are stray; log and skip them.
    async fn next_operation(&mut self) -> Option<EngineRequestEnvelope> {
        loop {
            match self.inbound.recv().await? {
                EngineInbound::Operation(envelope) => return Some(envelope),
                EngineInbound::Decision(decision) => {
                    warn!(
                        "Ignoring decision {} with no confirmation in flight",
                        decision.request_id
                    );
                }
            }
        }
    }

    async fn send(&self, envelope: EngineResponseEnvelope) -> Result<()> {
        self.outbound.send(envelope).await.map_err(|_| {
            OrchestratorError::Protocol("Engine outbound channel closed".to_string())
        })
    }

    /// Best-effort progress event.
    pub async fn send_progress(&self, message: &ProgressMessage) {
        match EngineResponseEnvelope::progress(message) {
            Ok(envelope) => {
                if self.outbound.send(envelope).await.is_err() {
                    warn!("Dropped progress event; outbound channel closed");
                }
            }
            Err(e) => warn!("Failed to serialize progress event: {}", e),
        }
    }

    /// Emit a ConfirmRequest and suspend until its decision arrives.
    ///
    /// Payloads are screened for secret-material fields before leaving
    /// the engine. Decisions for other request ids are logged and
    /// skipped. A confirmed decision must echo this request's intent
    /// digest exactly.
    pub async fn request_confirmation(
        &mut self,
        request: SecureConfirmRequest,
    ) -> Result<ConfirmationDecision> {
        if let Some(field) = find_forbidden_secret_key(&request.payload) {
            return Err(OrchestratorError::Protocol(format!(
                "Refusing to emit confirm payload containing secret field: {}",
                field
            )));
        }

        self.send(EngineResponseEnvelope::confirm_request(&request)?)
            .await?;

        let decision = loop {
            let inbound = self.inbound.recv().await.ok_or_else(|| {
                OrchestratorError::Protocol(
                    "Inbound channel closed while awaiting confirmation".to_string(),
                )
            })?;
            match inbound {
                EngineInbound::Decision(decision)
                    if decision.request_id == request.request_id =>
                {
                    break decision;
                }
                EngineInbound::Decision(decision) => {
                    warn!(
                        "Skipping decision for request {} while awaiting {}",
                        decision.request_id, request.request_id
                    );
                }
                EngineInbound::Operation(envelope) => {
                    warn!(
                        "Ignoring operation {} received while awaiting confirmation",
                        envelope.request_type
                    );
                }
            }
        };

        if decision.confirmed {
            match decision.intent_digest.as_deref() {
                None => {
                    return Err(OrchestratorError::Protocol(
                        "Missing intent digest from confirmation result".to_string(),
                    ));
                }
                Some(echoed) if echoed != request.intent_digest => {
                    return Err(OrchestratorError::Protocol(
                        "Intent digest mismatch between UI and engine".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(decision)
    }
}

/// Engine task body.
pub async fn engine_main(
    inbound: mpsc::Receiver<EngineInbound>,
    outbound: mpsc::Sender<EngineResponseEnvelope>,
    key_store: EncryptedKeyStore,
) {
    let mut io = EngineIo::from_channels(inbound, outbound);
    if io.send(EngineResponseEnvelope::ready()).await.is_err() {
        return;
    }

    while let Some(envelope) = io.next_operation().await {
        let response = match EngineRequestType::try_from(envelope.request_type) {
            Ok(request_type) => {
                match run_handler(&mut io, &key_store, request_type, &envelope).await {
                    Ok(payload) => match EngineResponseEnvelope::success(request_type, &payload)
                    {
                        Ok(response) => response,
                        Err(e) => EngineResponseEnvelope::failure(request_type, &e),
                    },
                    Err(e) => {
                        debug!("{} failed: {}", request_type.name(), e.scrubbed_message());
                        EngineResponseEnvelope::failure(request_type, &e)
                    }
                }
            }
            Err(message) => {
                warn!("{}", message);
                // Echo the unknown discriminant; the dispatcher classifies
                // it as a protocol violation.
                EngineResponseEnvelope {
                    response_type: envelope.request_type,
                    payload: serde_json::json!({
                        "error": format!("Unknown request type: {}", envelope.request_type),
                        "kind": "protocol",
                    }),
                }
            }
        };
        if io.send(response).await.is_err() {
            return;
        }
    }
}

async fn run_handler(
    io: &mut EngineIo,
    key_store: &EncryptedKeyStore,
    request_type: EngineRequestType,
    envelope: &EngineRequestEnvelope,
) -> Result<serde_json::Value> {
    match request_type {
        EngineRequestType::DeriveNearKeypairAndEncrypt => {
            let request = envelope.parse_payload(request_type)?;
            to_value(
                handlers::handle_derive_near_keypair_and_encrypt(io, key_store, request).await?,
            )
        }
        EngineRequestType::DecryptPrivateKeyWithPrf => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_decrypt_private_key_with_prf(io, key_store, request).await?)
        }
        EngineRequestType::CheckRegistrationEligibility => {
            let request = envelope.parse_payload(request_type)?;
            to_value(
                handlers::handle_check_registration_eligibility(key_store, request).await?,
            )
        }
        EngineRequestType::SignAndRegisterUser => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_sign_and_register_user(io, key_store, request).await?)
        }
        EngineRequestType::SignTransactionsWithActions => {
            let request = envelope.parse_payload(request_type)?;
            to_value(
                handlers::handle_sign_transactions_with_actions(io, key_store, request).await?,
            )
        }
        EngineRequestType::RecoverKeypairFromCredential => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_recover_keypair_from_credential(key_store, request).await?)
        }
        EngineRequestType::ExtractCosePublicKey => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_extract_cose_public_key(request)?)
        }
        EngineRequestType::SignTransactionWithKeyPair => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_sign_transaction_with_keypair(request)?)
        }
        EngineRequestType::SignNep413Message => {
            let request = envelope.parse_payload(request_type)?;
            to_value(handlers::handle_sign_nep413_message(io, key_store, request).await?)
        }
    }
}

fn to_value<T: serde::Serialize>(result: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(result)?)
}

/// Launches in-process crypto engines, one task each.
pub struct CryptoEngineLauncher {
    key_store: EncryptedKeyStore,
}

impl CryptoEngineLauncher {
    pub fn new(key_store: EncryptedKeyStore) -> Self {
        CryptoEngineLauncher { key_store }
    }
}

#[async_trait]
impl EngineLauncher for CryptoEngineLauncher {
    async fn launch(&self) -> Result<LaunchedEngine> {
        let (inbound_tx, inbound_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);
        let key_store = self.key_store.clone();
        let task = tokio::spawn(engine_main(inbound_rx, outbound_tx, key_store));
        Ok(LaunchedEngine {
            sender: inbound_tx,
            receiver: outbound_rx,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStoreBackend;
    use crate::types::{classify_response, ResponseCategory};
    use std::sync::Arc;

    async fn launched_engine() -> LaunchedEngine {
        let store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        CryptoEngineLauncher::new(store).launch().await.unwrap()
    }

    #[tokio::test]
    async fn engine_announces_ready_first() {
        let mut engine = launched_engine().await;
        let first = engine.receiver.recv().await.unwrap();
        assert!(matches!(classify_response(first), ResponseCategory::Ready));
        engine.task.abort();
    }

    #[tokio::test]
    async fn unknown_discriminant_echoes_back_as_violation() {
        let mut engine = launched_engine().await;
        let _ready = engine.receiver.recv().await.unwrap();

        engine
            .sender
            .send(EngineInbound::Operation(EngineRequestEnvelope {
                request_type: 99,
                payload: serde_json::json!({}),
            }))
            .await
            .unwrap();

        let response = engine.receiver.recv().await.unwrap();
        assert_eq!(response.response_type, 99);
        assert!(matches!(
            classify_response(response),
            ResponseCategory::Violation(_)
        ));
        engine.task.abort();
    }

    #[tokio::test]
    async fn stray_decision_is_skipped_and_next_operation_served() {
        let mut engine = launched_engine().await;
        let _ready = engine.receiver.recv().await.unwrap();

        engine
            .sender
            .send(EngineInbound::Decision(ConfirmationDecision::cancelled(
                "stray-1", None,
            )))
            .await
            .unwrap();

        let envelope = EngineRequestEnvelope::new(
            EngineRequestType::ExtractCosePublicKey,
            &serde_json::json!({ "credential": "not-a-credential" }),
        )
        .unwrap();
        engine
            .sender
            .send(EngineInbound::Operation(envelope))
            .await
            .unwrap();

        let response = engine.receiver.recv().await.unwrap();
        match classify_response(response) {
            ResponseCategory::Failure(request_type, payload) => {
                assert_eq!(request_type, EngineRequestType::ExtractCosePublicKey);
                assert!(payload.error.contains("payload"));
            }
            other => panic!("expected a parse failure, got {:?}", other),
        }
        engine.task.abort();
    }

    #[tokio::test]
    async fn malformed_payload_becomes_failure_not_panic() {
        let mut engine = launched_engine().await;
        let _ready = engine.receiver.recv().await.unwrap();

        engine
            .sender
            .send(EngineInbound::Operation(EngineRequestEnvelope {
                request_type: EngineRequestType::SignNep413Message.into(),
                payload: serde_json::json!({ "bogus": true }),
            }))
            .await
            .unwrap();

        let response = engine.receiver.recv().await.unwrap();
        match classify_response(response) {
            ResponseCategory::Failure(request_type, payload) => {
                assert_eq!(request_type, EngineRequestType::SignNep413Message);
                assert_eq!(payload.kind, "protocol");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        engine.task.abort();
    }
}
