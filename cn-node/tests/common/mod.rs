//! Shared fixtures for the Clearnode service tests
#![allow(dead_code)]

use chrono::Utc;
use cn_core::canon::{home_channel_id, keccak256, pack_app, pack_app_creation, pack_app_state_update, state_digest};
use cn_core::{
    Address, AdvanceContext, AppAllocationV1, AppDefinitionV1, AppParticipantV1, AppSessionId,
    AppStateUpdateIntent, AppStateUpdateV1, AppV1, SignedAppStateUpdateV1, State, StateAdvancer,
    Transition, TransitionType,
};
use cn_node::{
    ChannelCreationRequest, ClearNode, CreateAppSessionRequest, NodeConfig, SubmitDepositRequest,
    SubmitDepositResponse,
};
use cn_signer::{AppSignature, EcdsaSigner, Signer, SignerType};
use cn_store::{MemoryStore, StaticAssetStore};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const USDC: &str = "usdc";
pub const ETH: &str = "eth";
pub const CHAIN_ID: u64 = 137;
pub const CHALLENGE: u64 = 86_400;
pub const APP: &str = "chess";

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn token() -> Address {
    Address([0xaa; 20])
}

/// A node wired to an in-memory store
pub struct Harness {
    pub node: ClearNode,
    pub node_signer: Arc<EcdsaSigner>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(config: NodeConfig) -> Self {
        let node_signer = Arc::new(EcdsaSigner::generate());
        let store = Arc::new(MemoryStore::new());
        let assets = StaticAssetStore::new()
            .with_asset(USDC, 6)
            .with_asset(ETH, 18);
        let node = ClearNode::new(node_signer.clone(), store.clone(), Arc::new(assets), config);
        Self {
            node,
            node_signer,
            store,
        }
    }

    pub fn node_address(&self) -> Address {
        self.node_signer.address()
    }

    /// Latest state of the pair, signed or not
    pub async fn latest(&self, wallet: &Address, asset: &str) -> Option<State> {
        self.node
            .channels
            .get_latest_state(wallet, asset, false)
            .await
            .unwrap()
    }

    /// Open a home channel whose anchor state deposits `amount`
    pub async fn open_channel(&self, user: &EcdsaSigner, asset: &str, amount: &str) -> State {
        let wallet = user.address();
        let mut state = State::void(wallet, asset, 0).next_state().unwrap();
        state.home_channel_id = Some(home_channel_id(
            &self.node_address(),
            &wallet,
            &token(),
            1,
            CHALLENGE,
        ));
        state.home_ledger.token_address = token();
        state.home_ledger.blockchain_id = CHAIN_ID;

        let mut state = StateAdvancer::new()
            .apply_transition(
                &state,
                &Transition::new(TransitionType::HomeDeposit, wallet.to_hex(), dec(amount)),
                &AdvanceContext::default(),
            )
            .unwrap();
        sign_state(user, &mut state);

        self.node
            .channels
            .request_creation(ChannelCreationRequest {
                state: state.clone(),
                nonce: 1,
                challenge_duration: CHALLENGE,
            })
            .await
            .unwrap();
        self.latest(&wallet, asset).await.unwrap()
    }

    /// The user's signed successor of the latest state carrying `transition`
    pub async fn next_user_state(
        &self,
        user: &EcdsaSigner,
        asset: &str,
        kind: TransitionType,
        account_id: String,
        amount: &str,
    ) -> State {
        let wallet = user.address();
        let current = self
            .latest(&wallet, asset)
            .await
            .unwrap_or_else(|| State::void(wallet, asset, 0));
        let mut state = StateAdvancer::new()
            .apply_transition(
                &current.next_state().unwrap(),
                &Transition::new(kind, account_id, dec(amount)),
                &AdvanceContext::default(),
            )
            .unwrap();
        sign_state(user, &mut state);
        state
    }

    pub async fn register_app(&self, owner: &EcdsaSigner, approval_not_required: bool) {
        let app = AppV1 {
            id: APP.to_string(),
            owner_wallet: owner.address(),
            metadata: "{}".to_string(),
            version: 1,
            creation_approval_not_required: approval_not_required,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let sig = owner.sign_digest_hex(&keccak256(&pack_app(&app))).unwrap();
        self.node.apps.register_app(app, &sig).await.unwrap();
    }

    /// Open a session without owner approval, signed by every participant
    pub async fn create_session(
        &self,
        participants: &[(&EcdsaSigner, u32)],
        quorum: u32,
        nonce: u64,
    ) -> AppSessionId {
        let definition = definition(participants, quorum, nonce);
        let signers: Vec<&EcdsaSigner> = participants.iter().map(|(s, _)| *s).collect();
        let request = creation_request(definition, &signers, None);
        self.node
            .app_sessions
            .create_app_session(request)
            .await
            .unwrap()
            .app_session_id
    }

    /// Deposit `amount` of `asset` from `user`'s channel into the session
    pub async fn deposit(
        &self,
        session_id: AppSessionId,
        user: &EcdsaSigner,
        asset: &str,
        amount: &str,
        allocations: Vec<AppAllocationV1>,
        version: u64,
        signers: &[&EcdsaSigner],
    ) -> cn_node::NodeResult<SubmitDepositResponse> {
        let user_state = self
            .next_user_state(user, asset, TransitionType::Commit, session_id.to_hex(), amount)
            .await;
        let update = AppStateUpdateV1 {
            app_session_id: session_id,
            intent: AppStateUpdateIntent::Deposit,
            version,
            allocations,
            session_data: String::new(),
        };
        self.node
            .app_sessions
            .submit_deposit_state(SubmitDepositRequest {
                app_state_update: sign_update(update, signers),
                user_state,
            })
            .await
    }
}

pub fn sign_state(user: &EcdsaSigner, state: &mut State) {
    let digest = state_digest(state).unwrap();
    state.user_sig = Some(user.sign_digest_hex(&digest).unwrap());
}

pub fn definition(participants: &[(&EcdsaSigner, u32)], quorum: u32, nonce: u64) -> AppDefinitionV1 {
    AppDefinitionV1 {
        application: APP.to_string(),
        participants: participants
            .iter()
            .map(|(signer, weight)| AppParticipantV1 {
                wallet_address: signer.address(),
                signature_weight: *weight,
            })
            .collect(),
        quorum,
        nonce,
    }
}

pub fn creation_request(
    definition: AppDefinitionV1,
    signers: &[&EcdsaSigner],
    owner: Option<&EcdsaSigner>,
) -> CreateAppSessionRequest {
    let digest = keccak256(&pack_app_creation(&definition, ""));
    CreateAppSessionRequest {
        definition,
        session_data: String::new(),
        quorum_sigs: signers
            .iter()
            .map(|s| {
                AppSignature::sign(*s, SignerType::Wallet, &digest)
                    .unwrap()
                    .to_hex()
            })
            .collect(),
        owner_sig: owner.map(|o| o.sign_digest_hex(&digest).unwrap()),
    }
}

pub fn sign_update(update: AppStateUpdateV1, signers: &[&EcdsaSigner]) -> SignedAppStateUpdateV1 {
    let digest = keccak256(&pack_app_state_update(&update).unwrap());
    let quorum_sigs = signers
        .iter()
        .map(|s| {
            AppSignature::sign(*s, SignerType::Wallet, &digest)
                .unwrap()
                .to_hex()
        })
        .collect();
    SignedAppStateUpdateV1 {
        app_state_update: update,
        quorum_sigs,
    }
}

pub fn update(
    session_id: AppSessionId,
    intent: AppStateUpdateIntent,
    version: u64,
    allocations: Vec<AppAllocationV1>,
) -> AppStateUpdateV1 {
    AppStateUpdateV1 {
        app_session_id: session_id,
        intent,
        version,
        allocations,
        session_data: String::new(),
    }
}

pub fn alloc(participant: &EcdsaSigner, asset: &str, amount: &str) -> AppAllocationV1 {
    AppAllocationV1::new(participant.address(), asset, dec(amount))
}
