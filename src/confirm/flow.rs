//! Flow classification.
//!
//! Each confirm request names its flow on the wire; the flow fixes the
//! ceremony kind, the PRF cardinality, and whether chain context gets
//! attached to the decision.

use crate::ceremony::PrfNeed;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Silent decrypt-for-export; never shows UI.
    LocalOnly,
    Registration,
    LinkDevice,
    Signing,
    MessageSigning,
}

impl FlowType {
    pub fn from_wire(value: &str) -> Result<FlowType> {
        match value {
            "decryptPrivateKeyWithPrf" => Ok(FlowType::LocalOnly),
            "registerAccount" => Ok(FlowType::Registration),
            "linkDevice" => Ok(FlowType::LinkDevice),
            "signTransaction" => Ok(FlowType::Signing),
            "signNep413Message" => Ok(FlowType::MessageSigning),
            other => Err(OrchestratorError::Protocol(format!(
                "Unknown confirmation flow type: {}",
                other
            ))),
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            FlowType::LocalOnly => "decryptPrivateKeyWithPrf",
            FlowType::Registration => "registerAccount",
            FlowType::LinkDevice => "linkDevice",
            FlowType::Signing => "signTransaction",
            FlowType::MessageSigning => "signNep413Message",
        }
    }

    /// Registration-grade flows run a create ceremony and need both PRF
    /// outputs; everything else runs an assertion.
    pub fn is_registration_grade(&self) -> bool {
        matches!(self, FlowType::Registration | FlowType::LinkDevice)
    }

    pub fn prf_need(&self) -> PrfNeed {
        if self.is_registration_grade() {
            PrfNeed::Dual
        } else {
            PrfNeed::Chacha20Only
        }
    }

    /// Flows whose decision carries nonce/block context for signing.
    pub fn needs_transaction_context(&self) -> bool {
        matches!(
            self,
            FlowType::Signing | FlowType::Registration | FlowType::LinkDevice
        )
    }
}

/// Render summary for a transaction batch: receiver aggregation plus the
/// summed deposits across all actions.
pub fn transaction_summary(receivers_and_actions: &[(String, serde_json::Value)]) -> serde_json::Value {
    let mut total_deposit = 0u128;
    let mut unique_receivers = std::collections::HashSet::new();

    for (receiver_id, actions) in receivers_and_actions {
        unique_receivers.insert(receiver_id.clone());
        if let Some(items) = actions.as_array() {
            for action in items {
                for field in ["deposit", "stake"] {
                    if let Some(amount) = action.get(field).and_then(|v| v.as_str()) {
                        total_deposit += amount.parse::<u128>().unwrap_or(0);
                    }
                }
            }
        }
    }

    let to = match unique_receivers.len() {
        1 => receivers_and_actions[0].0.clone(),
        n => format!("{} recipients", n),
    };

    serde_json::json!({
        "to": to,
        "totalAmount": format!("{}", total_deposit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for flow in [
            FlowType::LocalOnly,
            FlowType::Registration,
            FlowType::LinkDevice,
            FlowType::Signing,
            FlowType::MessageSigning,
        ] {
            assert_eq!(FlowType::from_wire(flow.wire_name()).unwrap(), flow);
        }
        assert!(FlowType::from_wire("exportAll").is_err());
    }

    #[test]
    fn prf_cardinality_per_flow() {
        assert_eq!(FlowType::Registration.prf_need(), PrfNeed::Dual);
        assert_eq!(FlowType::LinkDevice.prf_need(), PrfNeed::Dual);
        assert_eq!(FlowType::Signing.prf_need(), PrfNeed::Chacha20Only);
        assert_eq!(FlowType::MessageSigning.prf_need(), PrfNeed::Chacha20Only);
        assert_eq!(FlowType::LocalOnly.prf_need(), PrfNeed::Chacha20Only);
    }

    #[test]
    fn context_only_for_chain_flows() {
        assert!(FlowType::Signing.needs_transaction_context());
        assert!(FlowType::Registration.needs_transaction_context());
        assert!(!FlowType::LocalOnly.needs_transaction_context());
        assert!(!FlowType::MessageSigning.needs_transaction_context());
    }

    #[test]
    fn summary_aggregates_receivers_and_deposits() {
        let batch = vec![
            (
                "bob.testnet".to_string(),
                serde_json::json!([{ "type": "Transfer", "deposit": "100" }]),
            ),
            (
                "carol.testnet".to_string(),
                serde_json::json!([{ "type": "FunctionCall", "deposit": "50" }]),
            ),
        ];
        let summary = transaction_summary(&batch);
        assert_eq!(summary["to"], "2 recipients");
        assert_eq!(summary["totalAmount"], "150");

        let single = transaction_summary(&batch[..1]);
        assert_eq!(single["to"], "bob.testnet");
        assert_eq!(single["totalAmount"], "100");
    }
}
