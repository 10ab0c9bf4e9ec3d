//! Chain-context collaborator seam.
//!
//! The orchestrator never speaks RPC itself; it asks this trait for the
//! nonce and block context a signing decision needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::TransactionContext;

/// Nonce and block context for one account's next transaction batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NonceBlockInfo {
    /// Next unused nonce for the signing key, as a decimal string.
    pub nonce: String,
    pub block_hash: String,
    pub block_height: String,
}

impl NonceBlockInfo {
    /// Attach the account's public key to make a full `TransactionContext`.
    pub fn into_transaction_context(self, near_public_key_str: &str) -> TransactionContext {
        TransactionContext {
            near_public_key_str: near_public_key_str.to_string(),
            next_nonce: self.nonce,
            tx_block_height: self.block_height,
            tx_block_hash: self.block_hash,
        }
    }
}

#[async_trait]
pub trait NonceBlockProvider: Send + Sync {
    /// Fetch the next nonce plus current block hash/height for the account.
    async fn get_nonce_block_hash_and_height(&self, near_account_id: &str)
        -> Result<NonceBlockInfo>;
}

/// Fixed-context provider for offline use and tests.
#[derive(Debug, Clone)]
pub struct StaticNonceBlockProvider {
    pub info: NonceBlockInfo,
}

impl StaticNonceBlockProvider {
    pub fn new(nonce: &str, block_hash: &str, block_height: &str) -> Self {
        StaticNonceBlockProvider {
            info: NonceBlockInfo {
                nonce: nonce.to_string(),
                block_hash: block_hash.to_string(),
                block_height: block_height.to_string(),
            },
        }
    }
}

impl Default for StaticNonceBlockProvider {
    fn default() -> Self {
        StaticNonceBlockProvider::new("1", "11111111111111111111111111111111", "100")
    }
}

#[async_trait]
impl NonceBlockProvider for StaticNonceBlockProvider {
    async fn get_nonce_block_hash_and_height(
        &self,
        _near_account_id: &str,
    ) -> Result<NonceBlockInfo> {
        Ok(self.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_fixed_context() {
        let provider = StaticNonceBlockProvider::new("7", "blockhash", "42");
        let info = provider
            .get_nonce_block_hash_and_height("alice.testnet")
            .await
            .unwrap();
        assert_eq!(info.nonce, "7");

        let context = info.into_transaction_context("ed25519:pubkey");
        assert_eq!(context.next_nonce, "7");
        assert_eq!(context.tx_block_hash, "blockhash");
        assert_eq!(context.tx_block_height, "42");
        assert_eq!(context.near_public_key_str, "ed25519:pubkey");
    }
}
