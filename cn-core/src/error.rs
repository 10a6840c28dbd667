//! Clearnode Core Error Codes Registry
//!
//! Error code format: CN-{module}-{sequence}
//! - CN-LEDGER: Ledger arithmetic errors
//! - CN-STATE: State advancement errors
//! - CN-APP: App session allocation and definition errors
//! - CN-CANON: Parsing and canonical packing errors

use crate::types::TransitionType;
use rust_decimal::Decimal;
use thiserror::Error;

/// Core Result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core Error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // ============================================================
    // Ledger Errors (CN-LEDGER-*)
    // ============================================================
    /// [CN-LEDGER-001] Insufficient balance
    #[error("[CN-LEDGER-001] Insufficient balance in {ledger}: required {required}, available {available}")]
    InsufficientBalance {
        ledger: String,
        required: Decimal,
        available: Decimal,
    },

    /// [CN-LEDGER-002] Invalid amount
    #[error("[CN-LEDGER-002] Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// [CN-LEDGER-003] Invariant violation
    #[error("[CN-LEDGER-003] Invariant violation: {invariant} - {details}")]
    InvariantViolation { invariant: String, details: String },

    // ============================================================
    // State Errors (CN-STATE-*)
    // ============================================================
    /// [CN-STATE-001] Version is not current + 1
    #[error("[CN-STATE-001] Invalid version: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// [CN-STATE-002] Epoch changed without a migration
    #[error("[CN-STATE-002] Invalid epoch: expected {expected}, got {actual}")]
    EpochMismatch { expected: u64, actual: u64 },

    /// [CN-STATE-003] Transition requires a different preceding transition
    #[error("[CN-STATE-003] {transition} requires the previous signed transition to be {required}, got {actual}")]
    InvalidPrecedingTransition {
        transition: TransitionType,
        required: TransitionType,
        actual: String,
    },

    /// [CN-STATE-004] Incoming state differs from the computed one
    #[error("[CN-STATE-004] State mismatch on {field}: expected {expected}, got {actual}")]
    StateMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// [CN-STATE-005] Final states cannot be advanced
    #[error("[CN-STATE-005] State version {version} is final")]
    StateFinalized { version: u64 },

    /// [CN-STATE-006] Transition not supported
    #[error("[CN-STATE-006] Transition {transition} is not supported yet")]
    UnsupportedTransition { transition: TransitionType },

    /// [CN-STATE-007] State carries no transition
    #[error("[CN-STATE-007] State carries no transition")]
    MissingTransition,

    /// [CN-STATE-008] Another transition is pending for the pair
    #[error("[CN-STATE-008] Ongoing {pending} transition must complete before {incoming}")]
    OngoingTransition {
        pending: TransitionType,
        incoming: TransitionType,
    },

    /// [CN-STATE-009] Escrow episode already open
    #[error("[CN-STATE-009] Escrow channel already open")]
    EscrowAlreadyOpen,

    /// [CN-STATE-010] No escrow ledger to operate on
    #[error("[CN-STATE-010] No escrow channel open")]
    EscrowNotOpen,

    /// [CN-STATE-011] Transition needs a home channel
    #[error("[CN-STATE-011] Transition {transition} requires a home channel")]
    MissingHomeChannel { transition: TransitionType },

    /// [CN-STATE-012] Transition cannot be submitted by a user
    #[error("[CN-STATE-012] Transition {transition} is issued by the node only")]
    NodeIssuedTransition { transition: TransitionType },

    /// Invalid state
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    // ============================================================
    // App Errors (CN-APP-*)
    // ============================================================
    /// [CN-APP-001] Allocation omitted
    #[error("[CN-APP-001] missing allocation for {participant} in asset {asset}")]
    MissingAllocation { participant: String, asset: String },

    /// [CN-APP-002] Allocation totals do not match balances
    #[error("[CN-APP-002] allocation mismatch for asset {asset}: expected {expected}, got {actual}")]
    AllocationMismatch {
        asset: String,
        expected: Decimal,
        actual: Decimal,
    },

    /// [CN-APP-003] Negative allocation
    #[error("[CN-APP-003] negative allocation {amount} for {participant} in asset {asset}")]
    NegativeAllocation {
        participant: String,
        asset: String,
        amount: Decimal,
    },

    /// [CN-APP-004] Duplicate (participant, asset) pair
    #[error("[CN-APP-004] duplicate allocation for {participant} in asset {asset}")]
    DuplicateAllocation { participant: String, asset: String },

    /// [CN-APP-005] Allocation moved in a direction the intent forbids
    #[error("[CN-APP-005] {intent} cannot {direction} allocation for {participant} in asset {asset}")]
    ForbiddenAllocationChange {
        intent: String,
        direction: String,
        participant: String,
        asset: String,
    },

    /// [CN-APP-006] Rebalance does not conserve an asset
    #[error("[CN-APP-006] conservation violated for asset {asset}: residual {residual}")]
    ConservationViolation { asset: String, residual: Decimal },

    /// [CN-APP-007] Allocation to a non-participant
    #[error("[CN-APP-007] {participant} is not a session participant")]
    NonParticipant { participant: String },

    /// [CN-APP-008] Quorum larger than total weight
    #[error("[CN-APP-008] quorum {quorum} cannot be greater than total sum of weights {total}")]
    QuorumExceedsWeights { quorum: u32, total: u64 },

    /// [CN-APP-009] Duplicate participant
    #[error("[CN-APP-009] duplicate participant {participant}")]
    DuplicateParticipant { participant: String },

    /// [CN-APP-010] Amount finer than the asset's precision
    #[error("[CN-APP-010] amount {amount} exceeds {decimals} decimals of asset {asset}")]
    PrecisionExceeded {
        asset: String,
        decimals: u32,
        amount: Decimal,
    },

    /// [CN-APP-011] Invalid app definition
    #[error("[CN-APP-011] invalid app definition: {reason}")]
    InvalidDefinition { reason: String },

    // ============================================================
    // Canon Errors (CN-CANON-*)
    // ============================================================
    /// [CN-CANON-001] Invalid address
    #[error("[CN-CANON-001] Invalid address: {0}")]
    InvalidAddress(String),

    /// [CN-CANON-002] Invalid hash
    #[error("[CN-CANON-002] Invalid hash: {0}")]
    InvalidHash(String),

    /// [CN-CANON-003] Amount cannot be packed
    #[error("[CN-CANON-003] Amount {amount} cannot be packed: {reason}")]
    AmountOutOfRange { amount: String, reason: String },
}

impl CoreError {
    /// Raised by malformed input rather than by a rule violation
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress(_)
                | Self::InvalidHash(_)
                | Self::AmountOutOfRange { .. }
        )
    }

    /// Raised by a conservation or allocation invariant
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. }
                | Self::MissingAllocation { .. }
                | Self::AllocationMismatch { .. }
                | Self::NegativeAllocation { .. }
                | Self::DuplicateAllocation { .. }
                | Self::ForbiddenAllocationChange { .. }
                | Self::ConservationViolation { .. }
                | Self::NonParticipant { .. }
                | Self::PrecisionExceeded { .. }
        )
    }
}
