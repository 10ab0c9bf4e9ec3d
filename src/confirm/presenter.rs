//! Consent surface seam.
//!
//! The router never renders anything itself; a host mounts one
//! [`ConsentPresenter`] and the router drives it per the resolved
//! config. Only `await_user_verdict` is mandatory, the lifecycle hooks
//! default to no-ops for headless hosts.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConfirmationConfig, SecureConfirmRequest};

/// User's answer to a blocking confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterVerdict {
    Approved,
    Cancelled,
}

#[async_trait]
pub trait ConsentPresenter: Send + Sync {
    /// Show the request and block until the user approves or cancels.
    /// Only called for `requireClick` behavior.
    async fn await_user_verdict(
        &self,
        request: &SecureConfirmRequest,
        config: &ConfirmationConfig,
    ) -> Result<PresenterVerdict>;

    /// Show the request without waiting; auto-proceed modes call this
    /// before the delay elapses.
    async fn present_passive(
        &self,
        _request: &SecureConfirmRequest,
        _config: &ConfirmationConfig,
    ) {
    }

    /// A dispatch timed out underneath an open prompt; surface the error.
    async fn enter_error_state(&self, _message: &str) {}

    /// The surface is being replaced or its request already resolved.
    async fn dismiss(&self) {}
}
