//! Secure confirmation routing.
//!
//! The router sits between engines and the host UI. Engines hand it a
//! `SecureConfirmRequest` through the pool; the router resolves the
//! effective confirmation config, walks the consent surface through the
//! prompt, runs the WebAuthn ceremony, attaches chain context, and posts
//! exactly one `ConfirmationDecision` back on the engine's reply channel.
//!
//! PRF outputs live in the decision only for the hop back to the engine
//! and are never logged or persisted here.

pub mod config_resolver;
pub mod flow;
pub mod presenter;

pub use config_resolver::{
    normalize_confirmation_config, resolve_confirmation_config, CallerContext,
};
pub use flow::{transaction_summary, FlowType};
pub use presenter::{ConsentPresenter, PresenterVerdict};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::ceremony::{ceremony_challenge, CeremonyAdapter, CeremonyCollection, PrfNeed};
use crate::config::CONFIRMATION_SCHEMA_VERSION;
use crate::error::{scrub_error_message, OrchestratorError, Result};
use crate::pool::ConfirmationRoute;
use crate::rpc::NonceBlockProvider;
use crate::store::ConfirmationPreferences;
use crate::types::{
    ConfirmationBehavior, ConfirmationConfig, ConfirmationDecision, ConfirmationUIMode,
    DualPrfOutputs, EngineInbound, SecureConfirmRequest, TransactionContext, VrfChallenge,
};

/// Lifecycle of one confirmation request inside the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmState {
    Created,
    AwaitingConfig,
    AwaitingUI,
    Skipped,
    AwaitingCredential,
}

struct PendingConfirmation {
    reply: mpsc::Sender<EngineInbound>,
    state: ConfirmState,
}

#[derive(Default)]
struct SurfaceSlot {
    presenter: Option<Arc<dyn ConsentPresenter>>,
    /// Request currently blocked on a user click, if any.
    active_request: Option<String>,
}

struct RouterInner {
    caller: CallerContext,
    ceremony: CeremonyAdapter,
    nonce_provider: Arc<dyn NonceBlockProvider>,
    preferences: ConfirmationPreferences,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    surface: Mutex<SurfaceSlot>,
}

/// Routes confirmation requests from engines to the consent surface and
/// back. Clone-cheap; all clones share one pending map and surface slot.
#[derive(Clone)]
pub struct ConfirmationRouter {
    inner: Arc<RouterInner>,
}

impl ConfirmationRouter {
    pub fn new(
        caller: CallerContext,
        ceremony: CeremonyAdapter,
        nonce_provider: Arc<dyn NonceBlockProvider>,
        preferences: ConfirmationPreferences,
    ) -> Self {
        ConfirmationRouter {
            inner: Arc::new(RouterInner {
                caller,
                ceremony,
                nonce_provider,
                preferences,
                pending: Mutex::new(HashMap::new()),
                surface: Mutex::new(SurfaceSlot::default()),
            }),
        }
    }

    /// Install the consent surface. At most one is mounted; a prior
    /// surface is dismissed and its in-flight prompt cancelled.
    pub async fn mount_consent_surface(&self, presenter: Arc<dyn ConsentPresenter>) {
        let (old_presenter, orphaned_request) = {
            let mut surface = self.inner.surface.lock().await;
            let old = surface.presenter.replace(presenter);
            let orphaned = surface.active_request.take();
            (old, orphaned)
        };
        if let Some(request_id) = orphaned_request {
            info!(
                "Consent surface replaced; cancelling pending confirmation {}",
                request_id
            );
            self.inner
                .post_decision(ConfirmationDecision::cancelled(&request_id, None))
                .await;
        }
        if let Some(old) = old_presenter {
            old.dismiss().await;
        }
    }

    /// The host tore the surface down (tab closed, overlay dismissed).
    /// Any prompt blocked on it resolves as a user cancellation.
    pub async fn notify_surface_closed(&self) {
        let active = {
            let mut surface = self.inner.surface.lock().await;
            surface.presenter = None;
            surface.active_request.take()
        };
        if let Some(request_id) = active {
            info!("Consent surface closed; cancelling confirmation {}", request_id);
            self.inner
                .post_decision(ConfirmationDecision::cancelled(&request_id, None))
                .await;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }
}

#[async_trait]
impl ConfirmationRoute for ConfirmationRouter {
    async fn begin(&self, request: SecureConfirmRequest, reply: mpsc::Sender<EngineInbound>) {
        if request.schema_version != CONFIRMATION_SCHEMA_VERSION {
            warn!(
                "Rejecting confirmation {} with schema version {}",
                request.request_id, request.schema_version
            );
            let rejection = ConfirmationDecision::rejected(
                &request.request_id,
                format!(
                    "Unsupported confirmation schema version: {}",
                    request.schema_version
                ),
            );
            if reply.send(EngineInbound::Decision(rejection)).await.is_err() {
                warn!("Engine hung up before its schema rejection was delivered");
            }
            return;
        }

        debug!(
            "Confirmation {} registered ({})",
            request.request_id, request.request_type
        );
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(
                request.request_id.clone(),
                PendingConfirmation {
                    reply,
                    state: ConfirmState::Created,
                },
            );
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.resolve_flow(request).await;
        });
    }

    async fn notify_dispatch_timeout(&self) {
        if let Some(presenter) = self.inner.presenter_snapshot().await {
            presenter
                .enter_error_state("Signing request timed out; please retry")
                .await;
        }
        let mut pending = self.inner.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, entry| !entry.reply.is_closed());
        let pruned = before - pending.len();
        if pruned > 0 {
            debug!("Pruned {} orphaned confirmation(s) after dispatch timeout", pruned);
        }
    }
}

impl RouterInner {
    async fn presenter_snapshot(&self) -> Option<Arc<dyn ConsentPresenter>> {
        self.surface.lock().await.presenter.clone()
    }

    async fn set_state(&self, request_id: &str, next: ConfirmState) {
        let mut pending = self.pending.lock().await;
        if let Some(entry) = pending.get_mut(request_id) {
            debug!("Confirmation {}: {:?} -> {:?}", request_id, entry.state, next);
            entry.state = next;
        }
    }

    async fn set_active_request(&self, request_id: &str) {
        self.surface.lock().await.active_request = Some(request_id.to_string());
    }

    async fn clear_active_request(&self, request_id: &str) {
        let mut surface = self.surface.lock().await;
        if surface.active_request.as_deref() == Some(request_id) {
            surface.active_request = None;
        }
    }

    /// Deliver a decision exactly once. Strays (already resolved,
    /// cancelled elsewhere) are logged and dropped.
    async fn post_decision(&self, decision: ConfirmationDecision) {
        let entry = { self.pending.lock().await.remove(&decision.request_id) };
        let Some(entry) = entry else {
            warn!(
                "Dropping decision for unknown or already-resolved confirmation {}",
                decision.request_id
            );
            return;
        };
        debug!(
            "Confirmation {}: {:?} -> resolved (confirmed: {})",
            decision.request_id, entry.state, decision.confirmed
        );
        if entry
            .reply
            .send(EngineInbound::Decision(decision))
            .await
            .is_err()
        {
            warn!("Engine hung up before its confirmation decision was delivered");
        }
    }

    async fn resolve_flow(self: Arc<Self>, request: SecureConfirmRequest) {
        let request_id = request.request_id.clone();
        let intent_digest = request.intent_digest.clone();
        match self.drive(&request).await {
            Ok(Some(decision)) => self.post_decision(decision).await,
            Ok(None) => {
                self.post_decision(ConfirmationDecision::cancelled(
                    &request_id,
                    Some(intent_digest),
                ))
                .await;
            }
            Err(e) => {
                let reason = failure_reason(&e);
                warn!("Confirmation {} failed: {}", request_id, reason);
                self.post_decision(ConfirmationDecision::rejected(&request_id, reason))
                    .await;
            }
        }
    }

    /// Walk one confirmation through config, UI, ceremony and context.
    /// `Ok(None)` is a user cancellation.
    async fn drive(&self, request: &SecureConfirmRequest) -> Result<Option<ConfirmationDecision>> {
        let flow = FlowType::from_wire(&request.request_type)?;
        self.set_state(&request.request_id, ConfirmState::AwaitingConfig)
            .await;

        let near_account_id = request
            .payload
            .get("nearAccountId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OrchestratorError::Protocol("Confirm payload missing nearAccountId".to_string())
            })?
            .to_string();

        let override_config: Option<ConfirmationConfig> =
            match request.payload.get("confirmationConfig") {
                Some(raw) if !raw.is_null() => match serde_json::from_value(raw.clone()) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!("Ignoring malformed confirmationConfig override: {}", e);
                        None
                    }
                },
                _ => None,
            };
        let stored = match self
            .preferences
            .get_confirmation_config(&near_account_id)
            .await
        {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load stored confirmation preference: {}", e);
                None
            }
        };
        let resolved = resolve_confirmation_config(
            flow,
            self.caller,
            override_config.as_ref(),
            stored.as_ref(),
        );

        if resolved.ui_mode == ConfirmationUIMode::Skip {
            self.set_state(&request.request_id, ConfirmState::Skipped)
                .await;
        } else {
            self.set_state(&request.request_id, ConfirmState::AwaitingUI)
                .await;
            let presenter = self.presenter_snapshot().await;
            match resolved.behavior {
                ConfirmationBehavior::RequireClick => {
                    let presenter = presenter.ok_or_else(|| {
                        OrchestratorError::Ceremony("No consent surface mounted".to_string())
                    })?;
                    self.set_active_request(&request.request_id).await;
                    let verdict = presenter.await_user_verdict(request, &resolved).await;
                    self.clear_active_request(&request.request_id).await;
                    match verdict? {
                        PresenterVerdict::Approved => {}
                        PresenterVerdict::Cancelled => return Ok(None),
                    }
                }
                ConfirmationBehavior::AutoProceed
                | ConfirmationBehavior::AutoProceedWithDelay => {
                    if let Some(presenter) = presenter {
                        presenter.present_passive(request, &resolved).await;
                    }
                    let delay_ms = u64::from(resolved.auto_proceed_delay.unwrap_or(0));
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }

        self.set_state(&request.request_id, ConfirmState::AwaitingCredential)
            .await;

        let vrf_challenge: Option<VrfChallenge> = match request.payload.get("vrfChallenge") {
            Some(raw) if !raw.is_null() => Some(serde_json::from_value(raw.clone()).map_err(
                |e| {
                    OrchestratorError::Protocol(format!(
                        "Malformed vrfChallenge in confirm payload: {}",
                        e
                    ))
                },
            )?),
            _ => None,
        };
        let challenge = ceremony_challenge(vrf_challenge.as_ref())?;

        let collection = if flow.is_registration_grade() {
            self.ceremony
                .collect_registration_credential(&near_account_id, &challenge)
                .await?
        } else {
            self.ceremony
                .collect_assertion(&near_account_id, &challenge, flow.prf_need())
                .await?
        };
        let collected = match collection {
            CeremonyCollection::Completed(collected) => collected,
            CeremonyCollection::Cancelled => return Ok(None),
        };

        let transaction_context = self
            .transaction_context_for(flow, &near_account_id, &request.payload)
            .await?;

        let mut decision = ConfirmationDecision {
            request_id: request.request_id.clone(),
            intent_digest: Some(request.intent_digest.clone()),
            confirmed: true,
            credential: Some(collected.credential.clone()),
            vrf_challenge,
            transaction_context,
            ..Default::default()
        };
        match flow.prf_need() {
            PrfNeed::Dual => {
                let second = collected.prf_second.clone().ok_or_else(|| {
                    OrchestratorError::Derivation(
                        "Ceremony missing second PRF output".to_string(),
                    )
                })?;
                decision.dual_prf_outputs = Some(DualPrfOutputs {
                    chacha20_prf_output: collected.prf_first.clone(),
                    ed25519_prf_output: second,
                });
            }
            PrfNeed::Chacha20Only => {
                decision.prf_output = Some(collected.prf_first.clone());
            }
        }
        Ok(Some(decision))
    }

    async fn transaction_context_for(
        &self,
        flow: FlowType,
        near_account_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<TransactionContext>> {
        if !flow.needs_transaction_context() {
            return Ok(None);
        }
        let info = self
            .nonce_provider
            .get_nonce_block_hash_and_height(near_account_id)
            .await?;
        let public_key = payload
            .get("nearPublicKeyStr")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(Some(info.into_transaction_context(public_key)))
    }
}

/// Decision error strings carry the bare reason; the engine re-wraps
/// them into its own error taxonomy.
fn failure_reason(error: &OrchestratorError) -> String {
    match error {
        OrchestratorError::Protocol(message)
        | OrchestratorError::Ceremony(message)
        | OrchestratorError::Derivation(message)
        | OrchestratorError::Store(message) => scrub_error_message(message),
        OrchestratorError::Timeout { ms } => format!("Timed out after {}ms", ms),
    }
}
