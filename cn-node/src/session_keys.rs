//! Session key delegation
//!
//! A wallet delegates app-session signing rights to a session key with a
//! versioned, wallet-signed key state. The latest unexpired state is the one
//! in force.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cn_core::canon::{keccak256, pack_session_key_state};
use cn_core::{Address, AppSessionKeyStateV1, CoreError};
use cn_signer::{decode_signature_hex, SessionKeyResolver, SignerError, SignerResult, SigningScope};
use cn_store::{Store, StoreTx};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{NodeError, NodeResult};
use crate::processor::StateProcessor;

/// Session Key Service
#[derive(Clone)]
pub struct SessionKeyService {
    store: Arc<dyn Store>,
    processor: StateProcessor,
}

impl SessionKeyService {
    pub fn new(store: Arc<dyn Store>, processor: StateProcessor) -> Self {
        Self { store, processor }
    }

    /// Store a new version of a session key delegation
    #[instrument(skip(self, state), fields(user = %state.user_address, session_key = %state.session_key, version = state.version))]
    pub async fn submit_session_key_state(&self, state: AppSessionKeyStateV1) -> NodeResult<()> {
        let now = Utc::now();
        self.verify_key_state(&state, now)?;

        let mut tx = self.store.begin().await?;

        if let Some(existing) = tx.get_key_state_by_session_key(&state.session_key).await? {
            if existing.user_address != state.user_address {
                return Err(NodeError::precondition(format!(
                    "session key {} is delegated by another wallet",
                    state.session_key
                )));
            }
        }

        let expected = tx
            .get_last_key_state(&state.user_address, &state.session_key)
            .await?
            .map_or(1, |last| last.version + 1);
        if state.version != expected {
            return Err(CoreError::VersionMismatch {
                expected,
                actual: state.version,
            }
            .into());
        }

        tx.store_session_key_state(state.clone()).await?;
        tx.commit().await?;

        info!(expires_at = %state.expires_at, "Session key state stored");
        Ok(())
    }

    fn verify_key_state(&self, state: &AppSessionKeyStateV1, now: DateTime<Utc>) -> NodeResult<()> {
        if state.session_key.is_zero() {
            return Err(NodeError::invalid_request("session key must be non-zero"));
        }
        if state.session_key == state.user_address {
            return Err(NodeError::invalid_request(
                "session key must differ from the delegating wallet",
            ));
        }
        if state.is_expired(now) {
            return Err(NodeError::precondition(format!(
                "session key state expired at {}",
                state.expires_at
            )));
        }

        let sig = state
            .user_sig
            .as_deref()
            .ok_or_else(|| NodeError::invalid_request("user signature is required"))?;
        let digest = keccak256(&pack_session_key_state(state));
        let bytes = decode_signature_hex(sig)?;
        self.processor
            .validator()
            .verify(&state.user_address, &digest, &bytes)?;
        Ok(())
    }

    /// Unexpired delegations of `user`, optionally for one key only
    pub async fn get_last_key_states(
        &self,
        user: &Address,
        session_key: Option<&Address>,
    ) -> NodeResult<Vec<AppSessionKeyStateV1>> {
        let now = Utc::now();
        let tx = self.store.begin().await?;
        Ok(tx
            .get_last_key_states(user, session_key)
            .await?
            .into_iter()
            .filter(|s| !s.is_expired(now))
            .collect())
    }
}

/// Resolves session keys through the delegations visible in a store
/// transaction
pub struct StoreKeyResolver<'a> {
    tx: &'a dyn StoreTx,
    now: DateTime<Utc>,
}

impl<'a> StoreKeyResolver<'a> {
    pub fn new(tx: &'a dyn StoreTx, now: DateTime<Utc>) -> Self {
        Self { tx, now }
    }
}

fn unauthorized(session_key: &Address, reason: &str) -> SignerError {
    SignerError::UnauthorizedSessionKey {
        session_key: session_key.to_hex(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl SessionKeyResolver for StoreKeyResolver<'_> {
    async fn resolve_owner(
        &self,
        session_key: &Address,
        scope: SigningScope<'_>,
    ) -> SignerResult<Address> {
        let state = self
            .tx
            .get_key_state_by_session_key(session_key)
            .await
            .map_err(|e| SignerError::Resolver(e.to_string()))?
            .ok_or_else(|| unauthorized(session_key, "unknown session key"))?;

        if state.is_expired(self.now) {
            warn!(session_key = %session_key, "Expired session key used");
            return Err(unauthorized(session_key, "expired"));
        }
        if !state.authorizes(scope.application, scope.app_session_id) {
            return Err(unauthorized(
                session_key,
                &format!("not authorized for application {}", scope.application),
            ));
        }
        Ok(state.user_address)
    }
}
