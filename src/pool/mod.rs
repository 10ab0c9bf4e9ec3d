//! Engine pool: pre-warming, acquisition, dispatch, destroy-and-replace.
//!
//! Every dispatch runs on a fresh-for-this-operation instance and is bounded
//! by one overall timeout. Instances are never reused: release always
//! destroys and spawns an asynchronous replacement.

pub mod instance;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::config;
use crate::error::{OrchestratorError, Result};
use crate::types::{
    classify_response, EngineInbound, EngineRequestEnvelope, EngineRequestType, ProgressMessage,
    ResponseCategory, SecureConfirmRequest,
};

pub use instance::{EngineInstance, EngineLauncher, InstanceState, LaunchedEngine};

/// Configuration for the engine pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle instances kept warm
    pub capacity: usize,
    /// Overall bound for one dispatch, milliseconds
    pub dispatch_timeout_ms: u64,
    /// Bound for the Ready health check after launch, milliseconds
    pub health_check_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: config::DEFAULT_POOL_CAPACITY,
            dispatch_timeout_ms: config::DEFAULT_DISPATCH_TIMEOUT_MS,
            health_check_timeout_ms: config::DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
        }
    }
}

/// Resolves confirm requests that surface mid-dispatch.
///
/// `begin` must return promptly; resolution work runs concurrently and the
/// decision travels back through `reply` whenever it is ready. The dispatch
/// loop keeps receiving while a confirmation is outstanding.
#[async_trait]
pub trait ConfirmationRoute: Send + Sync {
    async fn begin(&self, request: SecureConfirmRequest, reply: mpsc::Sender<EngineInbound>);

    /// A dispatch timed out; any mounted consent surface should enter its
    /// error state. Best effort.
    async fn notify_dispatch_timeout(&self);
}

pub type ProgressCallback = Arc<dyn Fn(ProgressMessage) + Send + Sync>;

struct PoolInner {
    config: PoolConfig,
    launcher: Arc<dyn EngineLauncher>,
    confirm: Arc<dyn ConfirmationRoute>,
    idle: Mutex<Vec<EngineInstance>>,
}

impl PoolInner {
    /// Launch one instance and hold it to the Ready health check.
    async fn launch_ready(&self) -> Result<EngineInstance> {
        let launched = self.launcher.launch().await?;
        let mut instance = EngineInstance::from_launched(launched);
        match instance
            .await_ready(self.config.health_check_timeout_ms)
            .await
        {
            Ok(()) => Ok(instance),
            Err(e) => {
                instance.destroy();
                Err(e)
            }
        }
    }

    /// Try to admit an instance into the idle set; destroy it when full.
    async fn admit(&self, instance: EngineInstance) -> bool {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.config.capacity {
            idle.push(instance);
            true
        } else {
            drop(idle);
            instance.destroy();
            false
        }
    }
}

#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<PoolInner>,
}

impl EnginePool {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        confirm: Arc<dyn ConfirmationRoute>,
        config: PoolConfig,
    ) -> Self {
        info!(
            "Engine pool created (capacity {}, dispatch timeout {}ms)",
            config.capacity, config.dispatch_timeout_ms
        );
        EnginePool {
            inner: Arc::new(PoolInner {
                config,
                launcher,
                confirm,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.inner.idle.lock().await.len()
    }

    /// Concurrently launch up to `count` instances, bounded by remaining
    /// capacity. Returns how many passed the health check and were admitted.
    pub async fn pre_warm(&self, count: usize) -> usize {
        let idle_len = self.inner.idle.lock().await.len();
        let want = count.min(self.inner.config.capacity.saturating_sub(idle_len));
        let mut launches = tokio::task::JoinSet::new();
        for _ in 0..want {
            let inner = Arc::clone(&self.inner);
            launches.spawn(async move { inner.launch_ready().await });
        }

        let mut admitted = 0;
        while let Some(joined) = launches.join_next().await {
            match joined {
                Ok(Ok(instance)) => {
                    if self.inner.admit(instance).await {
                        admitted += 1;
                    }
                }
                Ok(Err(e)) => warn!("Pre-warm launch failed: {}", e),
                Err(e) => warn!("Pre-warm launch task failed: {}", e),
            }
        }
        info!("Pre-warmed {} engine instance(s)", admitted);
        admitted
    }

    /// Pop an idle instance or launch a fresh one.
    pub async fn acquire(&self) -> Result<EngineInstance> {
        if let Some(instance) = self.inner.idle.lock().await.pop() {
            debug!("Acquired idle engine instance {}", instance.id());
            return Ok(instance);
        }
        self.inner.launch_ready().await
    }

    /// Destroy the instance and spawn a fire-and-forget replacement. The
    /// replacement is admitted only if it passes its health check while the
    /// pool is still under capacity.
    pub async fn release(&self, instance: EngineInstance) {
        instance.destroy();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.launch_ready().await {
                Ok(replacement) => {
                    let id = replacement.id();
                    if inner.admit(replacement).await {
                        debug!("Replacement engine instance {} admitted", id);
                    }
                }
                Err(e) => warn!("Replacement engine launch failed: {}", e),
            }
        });
    }

    /// Run one operation to completion. Resolves exactly once: with the
    /// success payload, a typed failure, a protocol violation, or a timeout.
    pub async fn dispatch(
        &self,
        envelope: EngineRequestEnvelope,
        on_progress: Option<ProgressCallback>,
    ) -> Result<serde_json::Value> {
        let expected = EngineRequestType::try_from(envelope.request_type)
            .map_err(OrchestratorError::Protocol)?;
        let timeout_ms = self.inner.config.dispatch_timeout_ms;

        let mut instance = self.acquire().await?;
        instance.mark_busy();
        let reply = instance.reply_sender();
        debug!(
            "Dispatching {} on engine instance {}",
            expected.name(),
            instance.id()
        );

        let confirm = Arc::clone(&self.inner.confirm);
        let drive = async {
            instance.send(EngineInbound::Operation(envelope)).await?;
            loop {
                let Some(response) = instance.recv().await else {
                    return Err(OrchestratorError::Protocol(
                        "Engine closed its channel mid-dispatch".to_string(),
                    ));
                };
                match classify_response(response) {
                    ResponseCategory::Ready => {
                        debug!("Ignoring duplicate Ready during dispatch");
                    }
                    ResponseCategory::Progress(message) => {
                        if let Some(callback) = &on_progress {
                            callback(message);
                        }
                    }
                    ResponseCategory::ConfirmRequest(request) => {
                        confirm.begin(request, reply.clone()).await;
                    }
                    ResponseCategory::Success(request_type, payload) => {
                        if request_type != expected {
                            return Err(OrchestratorError::Protocol(format!(
                                "Success discriminant for {} while awaiting {}",
                                request_type.name(),
                                expected.name()
                            )));
                        }
                        return Ok(payload);
                    }
                    ResponseCategory::Failure(request_type, failure) => {
                        if request_type != expected {
                            return Err(OrchestratorError::Protocol(format!(
                                "Failure discriminant for {} while awaiting {}",
                                request_type.name(),
                                expected.name()
                            )));
                        }
                        return Err(OrchestratorError::from_failure(&failure.kind, failure.error));
                    }
                    ResponseCategory::Violation(message) => {
                        return Err(OrchestratorError::Protocol(message));
                    }
                }
            }
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), drive).await {
            Ok(outcome) => {
                self.release(instance).await;
                outcome
            }
            Err(_) => {
                warn!(
                    "Dispatch of {} timed out after {}ms; destroying instance",
                    expected.name(),
                    timeout_ms
                );
                self.inner.confirm.notify_dispatch_timeout().await;
                self.release(instance).await;
                Err(OrchestratorError::Timeout { ms: timeout_ms })
            }
        }
    }
}
