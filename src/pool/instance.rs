//! Engine instance lifecycle.
//!
//! An instance is one spawned engine task plus its two channels. Instances
//! are disposable: they serve at most one dispatch after leaving the idle
//! set and are destroyed afterwards, whatever the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{OrchestratorError, Result};
use crate::types::{classify_response, EngineInbound, EngineResponseEnvelope, ResponseCategory};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle states. Forward-only; an instance never re-enters an earlier
/// state and is never reused after its dispatch resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Cold,
    Warming,
    Ready,
    Busy,
    Terminating,
}

/// Channels and task handle produced by a launcher.
pub struct LaunchedEngine {
    pub sender: mpsc::Sender<EngineInbound>,
    pub receiver: mpsc::Receiver<EngineResponseEnvelope>,
    pub task: JoinHandle<()>,
}

/// Spawns fresh engine instances. The pool never constructs engines
/// directly so tests can substitute scripted ones.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<LaunchedEngine>;
}

pub struct EngineInstance {
    id: u64,
    state: InstanceState,
    sender: mpsc::Sender<EngineInbound>,
    receiver: mpsc::Receiver<EngineResponseEnvelope>,
    task: JoinHandle<()>,
}

impl EngineInstance {
    pub fn from_launched(launched: LaunchedEngine) -> Self {
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Engine instance {}: cold -> warming", id);
        EngineInstance {
            id,
            state: InstanceState::Warming,
            sender: launched.sender,
            receiver: launched.receiver,
            task: launched.task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    fn set_state(&mut self, next: InstanceState) {
        debug!("Engine instance {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    pub fn mark_busy(&mut self) {
        self.set_state(InstanceState::Busy);
    }

    /// Clone of the inbound sender, used to route confirmation decisions
    /// back into the engine while a dispatch is in flight.
    pub fn reply_sender(&self) -> mpsc::Sender<EngineInbound> {
        self.sender.clone()
    }

    pub async fn send(&self, message: EngineInbound) -> Result<()> {
        self.sender.send(message).await.map_err(|_| {
            OrchestratorError::Protocol(format!(
                "Engine instance {} inbound channel closed",
                self.id
            ))
        })
    }

    pub async fn recv(&mut self) -> Option<EngineResponseEnvelope> {
        self.receiver.recv().await
    }

    /// Health check: the first envelope out of a fresh engine must be Ready,
    /// within the bound.
    pub async fn await_ready(&mut self, bound_ms: u64) -> Result<()> {
        let bound = Duration::from_millis(bound_ms);
        match tokio::time::timeout(bound, self.receiver.recv()).await {
            Ok(Some(envelope)) => match classify_response(envelope) {
                ResponseCategory::Ready => {
                    self.set_state(InstanceState::Ready);
                    Ok(())
                }
                other => Err(OrchestratorError::Protocol(format!(
                    "Engine instance {} emitted {:?} before Ready",
                    self.id, other
                ))),
            },
            Ok(None) => Err(OrchestratorError::Protocol(format!(
                "Engine instance {} closed during health check",
                self.id
            ))),
            Err(_) => Err(OrchestratorError::Timeout { ms: bound_ms }),
        }
    }

    /// Terminate the engine task and drop the channels.
    pub fn destroy(mut self) {
        self.set_state(InstanceState::Terminating);
        self.task.abort();
        debug!("Engine instance {} destroyed", self.id);
    }
}
