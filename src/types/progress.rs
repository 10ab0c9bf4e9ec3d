//! Progress message types.
//!
//! Engines emit zero or more progress envelopes per dispatch; the pool
//! forwards them to the caller's `on_progress` callback. Progress never
//! resolves a dispatch.

use serde::{Deserialize, Serialize};

/// Progress step identifiers for different phases of operations.
/// Values start at 100 to avoid conflicts with the response discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStep {
    Preparation = 100,
    UserConfirmation = 101,
    WebauthnAuthentication = 102,
    AuthenticationComplete = 103,
    TransactionSigningProgress = 104,
    TransactionSigningComplete = 105,
    Error = 106,
}

impl TryFrom<u32> for ProgressStep {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, <Self as TryFrom<u32>>::Error> {
        match value {
            100 => Ok(ProgressStep::Preparation),
            101 => Ok(ProgressStep::UserConfirmation),
            102 => Ok(ProgressStep::WebauthnAuthentication),
            103 => Ok(ProgressStep::AuthenticationComplete),
            104 => Ok(ProgressStep::TransactionSigningProgress),
            105 => Ok(ProgressStep::TransactionSigningComplete),
            106 => Ok(ProgressStep::Error),
            _ => Err(format!("Invalid ProgressStep value: {}", value)),
        }
    }
}

/// Convert ProgressStep enum to readable string for phase labels and logs
pub fn progress_step_name(step: ProgressStep) -> &'static str {
    match step {
        ProgressStep::Preparation => "preparation",
        ProgressStep::UserConfirmation => "user-confirmation",
        ProgressStep::WebauthnAuthentication => "webauthn-authentication",
        ProgressStep::AuthenticationComplete => "authentication-complete",
        ProgressStep::TransactionSigningProgress => "transaction-signing-progress",
        ProgressStep::TransactionSigningComplete => "transaction-signing-complete",
        ProgressStep::Error => "error",
    }
}

/// Status of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Progress,
    Success,
    Error,
}

/// Payload of a Progress response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub step: u32,
    /// Readable phase label, the kebab form of the step.
    pub phase: String,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressMessage {
    pub fn new(step: ProgressStep, status: ProgressStatus, message: &str) -> Self {
        ProgressMessage {
            step: step as u32,
            phase: progress_step_name(step).to_string(),
            status,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: &ProgressData) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

/// Structured data payload for progress messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl ProgressData {
    pub fn new(step: u32, total: u32) -> Self {
        Self {
            step: Some(step),
            total: Some(total),
            transaction_count: None,
            success: None,
            logs: None,
            context: None,
            hash: None,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    pub fn with_transaction_count(mut self, count: usize) -> Self {
        self.transaction_count = Some(count);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn with_hash(mut self, hash: String) -> Self {
        self.hash = Some(hash);
        self
    }
}
