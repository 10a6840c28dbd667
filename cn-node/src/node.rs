//! Node assembly
//!
//! Shared state for the Clearnode services.

use cn_signer::{EcdsaValidator, Signer};
use cn_store::{AssetStore, Store};
use std::sync::Arc;
use tracing::info;

use crate::app_session::AppSessionService;
use crate::apps::AppRegistry;
use crate::channel::ChannelService;
use crate::config::NodeConfig;
use crate::processor::StateProcessor;
use crate::session_keys::SessionKeyService;

/// Clearnode services sharing one store and one node signer
#[derive(Clone)]
pub struct ClearNode {
    /// Home and escrow channels, channel states
    pub channels: ChannelService,
    /// Multi-party app sessions
    pub app_sessions: AppSessionService,
    /// Application registry
    pub apps: AppRegistry,
    /// Session key delegations
    pub session_keys: SessionKeyService,
    pub config: NodeConfig,
}

impl ClearNode {
    /// Create the services with secp256k1 signature validation
    pub fn new(
        signer: Arc<dyn Signer>,
        store: Arc<dyn Store>,
        assets: Arc<dyn AssetStore>,
        config: NodeConfig,
    ) -> Self {
        let processor = StateProcessor::new(signer, Arc::new(EcdsaValidator));
        info!(
            node = %processor.node_address(),
            min_challenge_duration = config.min_challenge_duration_secs,
            "Clearnode services initialized"
        );

        Self {
            channels: ChannelService::new(store.clone(), processor.clone(), config.clone()),
            app_sessions: AppSessionService::new(
                store.clone(),
                assets,
                processor.clone(),
                config.clone(),
            ),
            apps: AppRegistry::new(store.clone(), processor.clone()),
            session_keys: SessionKeyService::new(store, processor),
            config,
        }
    }
}
