//! Weighted Quorum Verification
//!
//! A signature set meets quorum when the summed weight of the distinct
//! participants it resolves to reaches the threshold. Repeated signatures from
//! one participant count once; a signature from anyone else fails the whole set.

use cn_core::{Address, H256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{SignerError, SignerResult};
use crate::signer::{AppSignature, SessionKeyResolver, SigningScope};

/// Result of a successful quorum check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumOutcome {
    pub achieved: u64,
    /// Distinct participants that signed, in address order
    pub signers: Vec<Address>,
}

/// Participant weights and the threshold they must reach
#[derive(Clone, Debug)]
pub struct WeightedSignerSet {
    weights: BTreeMap<Address, u32>,
    quorum: u32,
}

impl WeightedSignerSet {
    pub fn new(weights: BTreeMap<Address, u32>, quorum: u32) -> Self {
        Self { weights, quorum }
    }

    pub fn quorum(&self) -> u32 {
        self.quorum
    }

    pub fn weight_of(&self, address: &Address) -> Option<u32> {
        self.weights.get(address).copied()
    }

    pub fn is_member(&self, address: &Address) -> bool {
        self.weights.contains_key(address)
    }

    pub fn total_weight(&self) -> u64 {
        self.weights.values().map(|w| u64::from(*w)).sum()
    }

    /// Verify hex-encoded, class-prefixed signatures over `digest`
    pub async fn verify(
        &self,
        digest: &H256,
        signatures: &[String],
        resolver: &dyn SessionKeyResolver,
        scope: SigningScope<'_>,
    ) -> SignerResult<QuorumOutcome> {
        let mut signers = BTreeSet::new();
        for raw in signatures {
            let signature = AppSignature::decode(raw)?;
            let wallet = signature.resolve_wallet(digest, resolver, scope).await?;
            if !self.is_member(&wallet) {
                warn!(signer = %wallet, "Signature from non-participant");
                return Err(SignerError::SignatureFromNonParticipant(wallet.to_hex()));
            }
            signers.insert(wallet);
        }

        let achieved: u64 = signers
            .iter()
            .filter_map(|s| self.weight_of(s))
            .map(u64::from)
            .sum();
        let required = u64::from(self.quorum);
        if achieved < required {
            warn!(achieved, required, "Quorum not met");
            return Err(SignerError::QuorumNotMet { achieved, required });
        }

        debug!(achieved, required, count = signers.len(), "Quorum met");
        Ok(QuorumOutcome {
            achieved,
            signers: signers.into_iter().collect(),
        })
    }
}

/// Verify `signatures` against `weights` and `quorum`
pub async fn verify_quorum(
    weights: &BTreeMap<Address, u32>,
    quorum: u32,
    digest: &H256,
    signatures: &[String],
    resolver: &dyn SessionKeyResolver,
    scope: SigningScope<'_>,
) -> SignerResult<QuorumOutcome> {
    WeightedSignerSet::new(weights.clone(), quorum)
        .verify(digest, signatures, resolver, scope)
        .await
}
