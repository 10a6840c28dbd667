//! Application registry
//!
//! Applications are registered and updated by their owner wallet.

use chrono::Utc;
use cn_core::canon::{keccak256, pack_app};
use cn_core::{AppV1, CoreError};
use cn_signer::decode_signature_hex;
use cn_store::Store;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{NodeError, NodeResult};
use crate::processor::StateProcessor;

/// App Registry
#[derive(Clone)]
pub struct AppRegistry {
    store: Arc<dyn Store>,
    processor: StateProcessor,
}

impl AppRegistry {
    pub fn new(store: Arc<dyn Store>, processor: StateProcessor) -> Self {
        Self { store, processor }
    }

    /// Register a new application or a new version of an existing one
    #[instrument(skip(self, app, owner_sig), fields(app_id = %app.id, version = app.version))]
    pub async fn register_app(&self, mut app: AppV1, owner_sig: &str) -> NodeResult<AppV1> {
        if app.id.trim().is_empty() {
            return Err(NodeError::invalid_request("application id is required"));
        }
        if app.owner_wallet.is_zero() {
            return Err(NodeError::invalid_request("owner wallet is required"));
        }

        let digest = keccak256(&pack_app(&app));
        let sig = decode_signature_hex(owner_sig)?;
        self.processor
            .validator()
            .verify(&app.owner_wallet, &digest, &sig)?;

        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        match tx.get_app(&app.id).await? {
            None => {
                if app.version != 1 {
                    return Err(CoreError::VersionMismatch {
                        expected: 1,
                        actual: app.version,
                    }
                    .into());
                }
                app.created_at = now;
                app.updated_at = now;
                tx.create_app(app.clone()).await?;
            }
            Some(existing) => {
                if existing.owner_wallet != app.owner_wallet {
                    return Err(NodeError::precondition(format!(
                        "application {} is owned by another wallet",
                        app.id
                    )));
                }
                if app.version != existing.version + 1 {
                    return Err(CoreError::VersionMismatch {
                        expected: existing.version + 1,
                        actual: app.version,
                    }
                    .into());
                }
                app.created_at = existing.created_at;
                app.updated_at = now;
                tx.update_app(app.clone()).await?;
            }
        }
        tx.commit().await?;

        info!(owner = %app.owner_wallet, "Application registered");
        Ok(app)
    }

    pub async fn get_app(&self, app_id: &str) -> NodeResult<Option<AppV1>> {
        let tx = self.store.begin().await?;
        Ok(tx.get_app(app_id).await?)
    }
}
