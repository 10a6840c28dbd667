use chrono::Utc;
use cn_core::canon::{keccak256, pack_app_creation};
use cn_core::{AppDefinitionV1, AppSessionId, AppSessionStatus, AppSessionV1};
use cn_signer::{decode_signature_hex, SigningScope, WeightedSignerSet};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::AppSessionService;
use crate::error::{NodeError, NodeResult};
use crate::session_keys::StoreKeyResolver;

/// Definition and opening data of a new session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAppSessionRequest {
    pub definition: AppDefinitionV1,
    pub session_data: String,
    /// Prefixed participant signatures over the packed creation request
    pub quorum_sigs: Vec<String>,
    /// Application owner approval, unless the application waives it
    pub owner_sig: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAppSessionResponse {
    pub app_session_id: AppSessionId,
    pub version: u64,
    pub status: AppSessionStatus,
}

impl AppSessionService {
    /// Open a session at version 1 with no allocations
    #[instrument(skip(self, request), fields(application = %request.definition.application))]
    pub async fn create_app_session(
        &self,
        request: CreateAppSessionRequest,
    ) -> NodeResult<CreateAppSessionResponse> {
        let definition = &request.definition;
        definition.validate(self.config.max_participants)?;
        self.check_session_data(&request.session_data)?;

        let session_id = definition.session_id();
        let digest = keccak256(&pack_app_creation(definition, &request.session_data));
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let app = tx
            .get_app(&definition.application)
            .await?
            .ok_or_else(|| NodeError::not_found("Application", definition.application.clone()))?;
        if !app.creation_approval_not_required {
            let sig = request
                .owner_sig
                .as_deref()
                .ok_or_else(|| NodeError::precondition("application owner approval is required"))?;
            let bytes = decode_signature_hex(sig)?;
            if let Err(e) = self
                .processor
                .validator()
                .verify(&app.owner_wallet, &digest, &bytes)
            {
                warn!(app_session_id = %session_id, error = %e, "Owner approval rejected");
                return Err(e.into());
            }
        }

        let resolver = StoreKeyResolver::new(tx.as_ref(), now);
        WeightedSignerSet::new(definition.participant_weights(), definition.quorum)
            .verify(
                &digest,
                &request.quorum_sigs,
                &resolver,
                SigningScope::new(&definition.application, Some(&session_id)),
            )
            .await?;

        let session = AppSessionV1::open(definition, request.session_data.clone(), now);
        tx.create_app_session(session.clone()).await?;
        tx.commit().await?;

        info!(
            app_session_id = %session_id,
            participants = definition.participants.len(),
            quorum = definition.quorum,
            "App session created"
        );
        Ok(CreateAppSessionResponse {
            app_session_id: session.session_id,
            version: session.version,
            status: session.status,
        })
    }
}
