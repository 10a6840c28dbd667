//! Packed signing payloads

use super::{keccak256, Packer};
use crate::error::CoreResult;
use crate::types::{
    AppAllocationV1, AppDefinitionV1, AppSessionKeyStateV1, AppStateUpdateV1, AppV1, State, H256,
};

/// Packed app definition (also the session ID preimage)
pub fn pack_app_definition(definition: &AppDefinitionV1) -> Packer {
    let mut p = Packer::new("app_definition");
    p.string(&definition.application)
        .uint(definition.participants.len() as u64);
    for participant in &definition.participants {
        p.address(&participant.wallet_address)
            .uint(u64::from(participant.signature_weight));
    }
    p.uint(u64::from(definition.quorum)).uint(definition.nonce);
    p
}

/// Payload signed by participants (and the app owner) to create a session
pub fn pack_app_creation(definition: &AppDefinitionV1, session_data: &str) -> Vec<u8> {
    let mut p = Packer::new("app_creation");
    p.h256(&pack_app_definition(definition).digest())
        .string(session_data);
    p.finish()
}

/// Allocations sorted by (participant, asset)
fn sorted_allocations(allocations: &[AppAllocationV1]) -> Vec<&AppAllocationV1> {
    let mut sorted: Vec<&AppAllocationV1> = allocations.iter().collect();
    sorted.sort_by(|a, b| {
        a.participant
            .cmp(&b.participant)
            .then_with(|| a.asset.cmp(&b.asset))
    });
    sorted
}

/// Payload signed by participants for a session update
pub fn pack_app_state_update(update: &AppStateUpdateV1) -> CoreResult<Vec<u8>> {
    let mut p = Packer::new("app_state_update");
    p.h256(&update.app_session_id)
        .uint(u64::from(update.intent.code()))
        .uint(update.version);

    let allocations = sorted_allocations(&update.allocations);
    p.uint(allocations.len() as u64);
    for allocation in allocations {
        p.address(&allocation.participant)
            .string(&allocation.asset)
            .amount(&allocation.amount)?;
    }
    p.string(&update.session_data);
    Ok(p.finish())
}

/// Payload signed by the owner to register an application
pub fn pack_app(app: &AppV1) -> Vec<u8> {
    let mut p = Packer::new("app");
    p.string(&app.id)
        .address(&app.owner_wallet)
        .string(&app.metadata)
        .uint(app.version)
        .boolean(app.creation_approval_not_required);
    p.finish()
}

/// Payload signed by a wallet to delegate to a session key
pub fn pack_session_key_state(state: &AppSessionKeyStateV1) -> Vec<u8> {
    let mut p = Packer::new("session_key_state");
    p.address(&state.user_address)
        .address(&state.session_key)
        .uint(state.version)
        .uint(state.application_ids.len() as u64);
    for application in &state.application_ids {
        p.string(application);
    }
    p.uint(state.app_session_ids.len() as u64);
    for session_id in &state.app_session_ids {
        p.h256(session_id);
    }
    p.uint(state.expires_at.timestamp().max(0) as u64);
    p.finish()
}

/// Payload signed by the user and the node for a channel state.
///
/// Signatures themselves are excluded.
pub fn pack_state(state: &State) -> CoreResult<Vec<u8>> {
    let mut p = Packer::new("state");
    p.h256(&state.id)
        .address(&state.user_wallet)
        .string(&state.asset)
        .uint(state.epoch)
        .uint(state.version)
        .optional_h256(state.home_channel_id.as_ref())
        .optional_h256(state.escrow_channel_id.as_ref())
        .ledger(&state.home_ledger)?;

    match &state.escrow_ledger {
        Some(ledger) => {
            p.boolean(true).ledger(ledger)?;
        }
        None => {
            p.boolean(false);
        }
    }

    match &state.transition {
        Some(t) => {
            p.uint(u64::from(t.kind.code()))
                .h256(&t.tx_id)
                .string(&t.account_id)
                .amount(&t.amount)?;
        }
        None => {
            p.uint(0);
        }
    }
    p.boolean(state.is_final);
    Ok(p.finish())
}

/// Digest of the packed state
pub fn state_digest(state: &State) -> CoreResult<H256> {
    Ok(keccak256(&pack_state(state)?))
}
