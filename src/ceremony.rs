//! Credential ceremony platform seam and the dual-PRF collection adapter.
//!
//! The platform owns the actual authenticator interaction; this layer only
//! prepares options (challenge, rp id, PRF eval salts) and post-processes
//! the returned credential. PRF outputs are extracted here and nowhere else.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config;
use crate::encoders::{base64_url_decode, base64_url_encode};
use crate::error::{OrchestratorError, Result};
use crate::types::{SerializedCredential, SerializedRegistrationCredential, VrfChallenge};

/// How many PRF outputs a flow needs from its ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfNeed {
    /// Decryption-grade access: the chacha20-purpose output only.
    Chacha20Only,
    /// Registration-grade access: chacha20 and ed25519 outputs.
    Dual,
}

/// Options handed to the platform for one ceremony.
#[derive(Debug, Clone)]
pub struct CeremonyOptions {
    pub challenge_b64u: String,
    pub rp_id: String,
    pub near_account_id: String,
    pub allowed_credential_ids: Vec<String>,
    /// Base64url PRF eval salt for the chacha20 purpose (always present).
    pub prf_eval_first_b64u: String,
    /// Base64url PRF eval salt for the ed25519 purpose (dual-PRF flows only).
    pub prf_eval_second_b64u: Option<String>,
}

/// Raw platform outcome. `Completed` carries the serialized credential JSON
/// exactly as the platform produced it.
#[derive(Debug, Clone)]
pub enum CeremonyOutcome {
    Completed(serde_json::Value),
    Cancelled,
}

#[async_trait]
pub trait CeremonyPlatform: Send + Sync {
    /// Run a registration (attestation) ceremony.
    async fn create_credential(&self, options: CeremonyOptions) -> Result<CeremonyOutcome>;

    /// Run an authentication (assertion) ceremony.
    async fn get_credential(&self, options: CeremonyOptions) -> Result<CeremonyOutcome>;
}

/// Credential plus the PRF outputs pulled out of its extension results.
/// The raw credential JSON travels into the decision untouched.
#[derive(Clone)]
pub struct CollectedCredential {
    pub credential: serde_json::Value,
    pub prf_first: String,
    pub prf_second: Option<String>,
}

impl fmt::Debug for CollectedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectedCredential")
            .field("credential", &"[present]")
            .field("prf_first", &"[REDACTED]")
            .field("prf_second", &self.prf_second.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum CeremonyCollection {
    Completed(CollectedCredential),
    Cancelled,
}

/// Ceremony challenge: the VRF output bytes when a challenge is supplied,
/// otherwise 32 fresh random bytes.
pub fn ceremony_challenge(vrf_challenge: Option<&VrfChallenge>) -> Result<Vec<u8>> {
    match vrf_challenge {
        Some(vrf) => base64_url_decode(&vrf.vrf_output)
            .map_err(|e| OrchestratorError::Ceremony(format!("Invalid VRF challenge: {}", e))),
        None => {
            let mut challenge = [0u8; 32];
            getrandom::getrandom(&mut challenge).map_err(|e| {
                OrchestratorError::Ceremony(format!("Failed to generate challenge: {}", e))
            })?;
            Ok(challenge.to_vec())
        }
    }
}

/// Drives ceremonies through the platform and enforces per-flow PRF
/// cardinality on the results.
pub struct CeremonyAdapter {
    platform: Arc<dyn CeremonyPlatform>,
    rp_id: String,
}

impl CeremonyAdapter {
    pub fn new(platform: Arc<dyn CeremonyPlatform>, rp_id: &str) -> Self {
        CeremonyAdapter {
            platform,
            rp_id: rp_id.to_string(),
        }
    }

    fn options(&self, near_account_id: &str, challenge: &[u8], need: PrfNeed) -> CeremonyOptions {
        CeremonyOptions {
            challenge_b64u: base64_url_encode(challenge),
            rp_id: self.rp_id.clone(),
            near_account_id: near_account_id.to_string(),
            allowed_credential_ids: Vec::new(),
            prf_eval_first_b64u: config::chacha20_prf_salt_for_account(near_account_id),
            prf_eval_second_b64u: match need {
                PrfNeed::Chacha20Only => None,
                PrfNeed::Dual => Some(config::ed25519_prf_salt_for_account(near_account_id)),
            },
        }
    }

    /// Registration-grade ceremony: always dual PRF.
    pub async fn collect_registration_credential(
        &self,
        near_account_id: &str,
        challenge: &[u8],
    ) -> Result<CeremonyCollection> {
        let options = self.options(near_account_id, challenge, PrfNeed::Dual);
        let outcome = self.platform.create_credential(options).await?;
        let raw = match outcome {
            CeremonyOutcome::Completed(raw) => raw,
            CeremonyOutcome::Cancelled => return Ok(CeremonyCollection::Cancelled),
        };

        let credential: SerializedRegistrationCredential = serde_json::from_value(raw.clone())
            .map_err(|e| {
                OrchestratorError::Ceremony(format!("Failed to parse registration credential: {}", e))
            })?;
        let results = &credential.client_extension_results.prf.results;
        let prf_first = results.first.clone().ok_or_else(|| {
            OrchestratorError::Derivation("Registration ceremony returned no PRF output".to_string())
        })?;
        let prf_second = results.second.clone().ok_or_else(|| {
            OrchestratorError::Derivation(
                "Registration ceremony missing second PRF output".to_string(),
            )
        })?;

        Ok(CeremonyCollection::Completed(CollectedCredential {
            credential: raw,
            prf_first,
            prf_second: Some(prf_second),
        }))
    }

    /// Assertion ceremony with the flow's PRF cardinality.
    pub async fn collect_assertion(
        &self,
        near_account_id: &str,
        challenge: &[u8],
        need: PrfNeed,
    ) -> Result<CeremonyCollection> {
        let options = self.options(near_account_id, challenge, need);
        let outcome = self.platform.get_credential(options).await?;
        let raw = match outcome {
            CeremonyOutcome::Completed(raw) => raw,
            CeremonyOutcome::Cancelled => return Ok(CeremonyCollection::Cancelled),
        };

        let credential: SerializedCredential = serde_json::from_value(raw.clone()).map_err(|e| {
            OrchestratorError::Ceremony(format!("Failed to parse assertion credential: {}", e))
        })?;
        let results = &credential.client_extension_results.prf.results;
        let prf_first = results.first.clone().ok_or_else(|| {
            OrchestratorError::Derivation("Ceremony returned no PRF output".to_string())
        })?;
        let prf_second = match need {
            PrfNeed::Chacha20Only => None,
            PrfNeed::Dual => Some(results.second.clone().ok_or_else(|| {
                OrchestratorError::Derivation("Ceremony missing second PRF output".to_string())
            })?),
        };

        Ok(CeremonyCollection::Completed(CollectedCredential {
            credential: raw,
            prf_first,
            prf_second,
        }))
    }
}
