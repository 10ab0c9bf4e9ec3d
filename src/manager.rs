//! Top-level facade tying the pool, router, and stores together.
//!
//! One `SignerManager` per embedding surface. Operations build an engine
//! envelope, dispatch it through the pool, and parse the classified
//! success payload back into the typed result. Confirmation traffic is
//! routed internally; callers only see the typed outcome.

use std::sync::Arc;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ceremony::{CeremonyAdapter, CeremonyPlatform};
use crate::confirm::{CallerContext, ConfirmationRouter, ConsentPresenter};
use crate::engine::CryptoEngineLauncher;
use crate::error::{OrchestratorError, Result};
use crate::pool::{EngineLauncher, EnginePool, PoolConfig, ProgressCallback};
use crate::rpc::NonceBlockProvider;
use crate::store::{ConfirmationPreferences, EncryptedKeyStore, StoreBackend};
use crate::types::{
    CheckRegistrationEligibilityRequest, ConfirmationConfig, DecryptPrivateKeyRequest,
    DecryptPrivateKeyResult, DeriveNearKeypairAndEncryptRequest, DeriveNearKeypairAndEncryptResult,
    EngineRequestEnvelope, EngineRequestType, ExtractCosePublicKeyRequest,
    ExtractCosePublicKeyResult, RecoverKeypairRequest, RecoverKeypairResult,
    RegistrationEligibilityResult, SignAndRegisterUserRequest, SignAndRegisterUserResult,
    SignNep413Request, SignNep413Result, SignTransactionWithKeyPairRequest,
    SignTransactionWithKeyPairResult, SignTransactionsWithActionsRequest,
    SignedTransactionOutcome,
};

/// Construction-time collaborators. `launcher` is optional; when absent
/// the manager runs the in-process crypto engine over the same key store
/// backend.
pub struct SignerManagerOptions {
    pub platform: Arc<dyn CeremonyPlatform>,
    /// Relying-party id handed to every ceremony.
    pub rp_id: String,
    pub key_store_backend: Arc<dyn StoreBackend>,
    pub preferences_backend: Arc<dyn StoreBackend>,
    pub nonce_provider: Arc<dyn NonceBlockProvider>,
    pub launcher: Option<Arc<dyn EngineLauncher>>,
    pub pool_config: PoolConfig,
    /// Embedded callers get the registration-flow confirmation clamp.
    pub caller_context: CallerContext,
}

pub struct SignerManager {
    pool: EnginePool,
    router: ConfirmationRouter,
    preferences: ConfirmationPreferences,
    key_store: EncryptedKeyStore,
}

impl SignerManager {
    pub fn new(options: SignerManagerOptions) -> Self {
        let key_store = EncryptedKeyStore::new(Arc::clone(&options.key_store_backend));
        let preferences = ConfirmationPreferences::new(Arc::clone(&options.preferences_backend));
        let ceremony = CeremonyAdapter::new(Arc::clone(&options.platform), &options.rp_id);
        let router = ConfirmationRouter::new(
            options.caller_context,
            ceremony,
            Arc::clone(&options.nonce_provider),
            preferences.clone(),
        );
        let launcher = options
            .launcher
            .unwrap_or_else(|| Arc::new(CryptoEngineLauncher::new(key_store.clone())));
        let pool = EnginePool::new(launcher, Arc::new(router.clone()), options.pool_config);

        info!("Signer manager initialized (rp_id: {})", options.rp_id);
        SignerManager {
            pool,
            router,
            preferences,
            key_store,
        }
    }

    // === SURFACE AND POOL LIFECYCLE ===

    /// Install the consent surface for click-gated confirmations.
    pub async fn mount_consent_surface(&self, presenter: Arc<dyn ConsentPresenter>) {
        self.router.mount_consent_surface(presenter).await;
    }

    /// The consent surface went away; cancel whatever it was showing.
    pub async fn notify_surface_closed(&self) {
        self.router.notify_surface_closed().await;
    }

    /// Launch engines ahead of demand. Returns how many were admitted.
    pub async fn pre_warm(&self, count: usize) -> usize {
        self.pool.pre_warm(count).await
    }

    // === PREFERENCES ===

    pub async fn set_confirmation_preference(
        &self,
        near_account_id: &str,
        config: &ConfirmationConfig,
    ) -> Result<()> {
        self.preferences
            .set_confirmation_config(near_account_id, config)
            .await
    }

    pub async fn get_confirmation_preference(
        &self,
        near_account_id: &str,
    ) -> Result<Option<ConfirmationConfig>> {
        self.preferences.get_confirmation_config(near_account_id).await
    }

    /// Read-only view of the key store shared with the engines.
    pub fn key_store(&self) -> &EncryptedKeyStore {
        &self.key_store
    }

    // === OPERATIONS ===

    /// First-time registration: derive, encrypt, store, and sign the
    /// registration transaction when one is supplied.
    pub async fn derive_near_keypair_and_encrypt(
        &self,
        request: DeriveNearKeypairAndEncryptRequest,
    ) -> Result<DeriveNearKeypairAndEncryptResult> {
        self.dispatch_typed(EngineRequestType::DeriveNearKeypairAndEncrypt, &request, None)
            .await
    }

    /// Full registration including COSE extraction from the attestation
    /// object. `link_device` in the request switches the flow.
    pub async fn register_account(
        &self,
        request: SignAndRegisterUserRequest,
    ) -> Result<SignAndRegisterUserResult> {
        self.dispatch_typed(EngineRequestType::SignAndRegisterUser, &request, None)
            .await
    }

    pub async fn check_registration_eligibility(
        &self,
        request: CheckRegistrationEligibilityRequest,
    ) -> Result<RegistrationEligibilityResult> {
        self.dispatch_typed(EngineRequestType::CheckRegistrationEligibility, &request, None)
            .await
    }

    /// Batch signing under a single confirmation ceremony. Progress events
    /// stream through `on_progress` while the dispatch runs.
    pub async fn sign_transactions_with_actions(
        &self,
        request: SignTransactionsWithActionsRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<SignedTransactionOutcome>> {
        self.dispatch_typed(
            EngineRequestType::SignTransactionsWithActions,
            &request,
            on_progress,
        )
        .await
    }

    pub async fn sign_nep413_message(
        &self,
        request: SignNep413Request,
    ) -> Result<SignNep413Result> {
        self.dispatch_typed(EngineRequestType::SignNep413Message, &request, None)
            .await
    }

    /// Decrypt-for-export. The assertion ceremony still runs; only the UI
    /// prompt is skipped.
    pub async fn decrypt_private_key_with_prf(
        &self,
        request: DecryptPrivateKeyRequest,
    ) -> Result<DecryptPrivateKeyResult> {
        self.dispatch_typed(EngineRequestType::DecryptPrivateKeyWithPrf, &request, None)
            .await
    }

    pub async fn recover_keypair(
        &self,
        request: RecoverKeypairRequest,
    ) -> Result<RecoverKeypairResult> {
        self.dispatch_typed(EngineRequestType::RecoverKeypairFromCredential, &request, None)
            .await
    }

    pub async fn extract_cose_public_key(
        &self,
        request: ExtractCosePublicKeyRequest,
    ) -> Result<ExtractCosePublicKeyResult> {
        self.dispatch_typed(EngineRequestType::ExtractCosePublicKey, &request, None)
            .await
    }

    pub async fn sign_transaction_with_key_pair(
        &self,
        request: SignTransactionWithKeyPairRequest,
    ) -> Result<SignTransactionWithKeyPairResult> {
        self.dispatch_typed(EngineRequestType::SignTransactionWithKeyPair, &request, None)
            .await
    }

    async fn dispatch_typed<Req: Serialize, Res: DeserializeOwned>(
        &self,
        request_type: EngineRequestType,
        request: &Req,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Res> {
        let envelope = EngineRequestEnvelope::new(request_type, request)?;
        let payload = self.pool.dispatch(envelope, on_progress).await?;
        serde_json::from_value(payload).map_err(|e| {
            OrchestratorError::Protocol(format!(
                "Failed to parse {} result: {}",
                request_type.name(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::ceremony::{CeremonyOptions, CeremonyOutcome};
    use crate::encoders::base64_url_encode;
    use crate::engine::registration::fixtures::mock_attestation_object_b64u;
    use crate::rpc::StaticNonceBlockProvider;
    use crate::store::MemoryStoreBackend;
    use crate::types::{ConfirmationBehavior, ConfirmationUIMode, TransactionSigningRequest};

    fn prf_b64u(seed: u8) -> String {
        base64_url_encode(&[seed; 32])
    }

    fn skip_config() -> ConfirmationConfig {
        ConfirmationConfig {
            ui_mode: ConfirmationUIMode::Skip,
            behavior: ConfirmationBehavior::AutoProceed,
            auto_proceed_delay: Some(0),
            theme: None,
        }
    }

    /// Platform scripted to a fixed pair of PRF outputs; records how many
    /// ceremonies ran.
    struct ScriptedPlatform {
        chacha20_prf: String,
        ed25519_prf: String,
        ceremonies: Mutex<usize>,
    }

    impl ScriptedPlatform {
        fn new() -> Self {
            ScriptedPlatform {
                chacha20_prf: prf_b64u(11),
                ed25519_prf: prf_b64u(12),
                ceremonies: Mutex::new(0),
            }
        }

        fn ceremony_count(&self) -> usize {
            *self.ceremonies.lock().unwrap()
        }
    }

    #[async_trait]
    impl CeremonyPlatform for ScriptedPlatform {
        async fn create_credential(&self, _options: CeremonyOptions) -> Result<CeremonyOutcome> {
            *self.ceremonies.lock().unwrap() += 1;
            Ok(CeremonyOutcome::Completed(serde_json::json!({
                "id": "scripted-cred",
                "rawId": "scripted-cred",
                "type": "public-key",
                "authenticatorAttachment": "platform",
                "response": {
                    "clientDataJSON": base64_url_encode(br#"{"type":"webauthn.create"}"#),
                    "attestationObject": mock_attestation_object_b64u(),
                    "transports": ["internal"],
                },
                "clientExtensionResults": {
                    "prf": {
                        "results": {
                            "first": self.chacha20_prf,
                            "second": self.ed25519_prf,
                        }
                    }
                },
            })))
        }

        async fn get_credential(&self, _options: CeremonyOptions) -> Result<CeremonyOutcome> {
            *self.ceremonies.lock().unwrap() += 1;
            Ok(CeremonyOutcome::Completed(serde_json::json!({
                "id": "scripted-cred",
                "rawId": "scripted-cred",
                "type": "public-key",
                "authenticatorAttachment": "platform",
                "response": {
                    "clientDataJSON": base64_url_encode(br#"{"type":"webauthn.get"}"#),
                    "authenticatorData": base64_url_encode(&[0u8; 37]),
                    "signature": base64_url_encode(&[2u8; 64]),
                    "userHandle": null,
                },
                "clientExtensionResults": {
                    "prf": { "results": { "first": self.chacha20_prf, "second": null } }
                },
            })))
        }
    }

    fn manager_with(platform: Arc<ScriptedPlatform>) -> SignerManager {
        SignerManager::new(SignerManagerOptions {
            platform,
            rp_id: "example.localhost".to_string(),
            key_store_backend: Arc::new(MemoryStoreBackend::new()),
            preferences_backend: Arc::new(MemoryStoreBackend::new()),
            nonce_provider: Arc::new(StaticNonceBlockProvider::new(
                "7",
                "11111111111111111111111111111111",
                "100",
            )),
            launcher: None,
            pool_config: PoolConfig::default(),
            caller_context: CallerContext::TopLevel,
        })
    }

    #[tokio::test]
    async fn register_then_sign_roundtrip() {
        let platform = Arc::new(ScriptedPlatform::new());
        let manager = manager_with(Arc::clone(&platform));

        let registered = manager
            .register_account(SignAndRegisterUserRequest {
                near_account_id: "alice.testnet".to_string(),
                device_number: None,
                link_device: false,
                registration_tx: None,
                confirmation_config: Some(skip_config()),
            })
            .await
            .unwrap();
        assert!(registered.success);
        assert!(registered.stored);
        assert!(!registered.cose_public_key.is_empty());

        let transfer = |receiver: &str| TransactionSigningRequest {
            near_account_id: "alice.testnet".to_string(),
            receiver_id: receiver.to_string(),
            actions: r#"[{"type":"Transfer","deposit":"100"}]"#.to_string(),
        };
        let outcomes = manager
            .sign_transactions_with_actions(
                SignTransactionsWithActionsRequest {
                    near_account_id: "alice.testnet".to_string(),
                    tx_signing_requests: vec![transfer("bob.testnet"), transfer("carol.testnet")],
                    confirmation_config: Some(skip_config()),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.success));
        let nonces: Vec<_> = outcomes
            .iter()
            .map(|o| {
                o.signed_transaction.as_ref().unwrap().transaction["nonce"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(nonces, vec!["7", "8"]);
        assert_eq!(
            outcomes[0].signed_transaction.as_ref().unwrap().public_key,
            registered.public_key
        );
        // One create ceremony for registration, one assertion for the batch.
        assert_eq!(platform.ceremony_count(), 2);
    }

    #[tokio::test]
    async fn eligibility_flips_after_registration() {
        let platform = Arc::new(ScriptedPlatform::new());
        let manager = manager_with(Arc::clone(&platform));

        let before = manager
            .check_registration_eligibility(CheckRegistrationEligibilityRequest {
                near_account_id: "alice.testnet".to_string(),
                device_number: None,
            })
            .await
            .unwrap();
        assert!(before.eligible);

        manager
            .register_account(SignAndRegisterUserRequest {
                near_account_id: "alice.testnet".to_string(),
                device_number: None,
                link_device: false,
                registration_tx: None,
                confirmation_config: Some(skip_config()),
            })
            .await
            .unwrap();

        let after = manager
            .check_registration_eligibility(CheckRegistrationEligibilityRequest {
                near_account_id: "alice.testnet".to_string(),
                device_number: None,
            })
            .await
            .unwrap();
        assert!(!after.eligible);
        assert!(after.registered);
    }

    #[tokio::test]
    async fn decrypt_returns_the_registered_key() {
        let platform = Arc::new(ScriptedPlatform::new());
        let manager = manager_with(Arc::clone(&platform));

        let registered = manager
            .register_account(SignAndRegisterUserRequest {
                near_account_id: "alice.testnet".to_string(),
                device_number: None,
                link_device: false,
                registration_tx: None,
                confirmation_config: Some(skip_config()),
            })
            .await
            .unwrap();

        let decrypted = manager
            .decrypt_private_key_with_prf(DecryptPrivateKeyRequest {
                near_account_id: "alice.testnet".to_string(),
            })
            .await
            .unwrap();
        assert!(decrypted.private_key.starts_with("ed25519:"));

        let signing_key = crate::crypto::parse_near_private_key(&decrypted.private_key).unwrap();
        assert_eq!(
            crate::crypto::near_public_key_str(&signing_key.verifying_key()),
            registered.public_key
        );
    }

    #[tokio::test]
    async fn preferences_round_trip_through_the_manager() {
        let platform = Arc::new(ScriptedPlatform::new());
        let manager = manager_with(platform);

        assert!(manager
            .get_confirmation_preference("alice.testnet")
            .await
            .unwrap()
            .is_none());

        manager
            .set_confirmation_preference("alice.testnet", &skip_config())
            .await
            .unwrap();
        let stored = manager
            .get_confirmation_preference("alice.testnet")
            .await
            .unwrap()
            .expect("stored preference");
        assert_eq!(stored.ui_mode, ConfirmationUIMode::Skip);
    }
}
