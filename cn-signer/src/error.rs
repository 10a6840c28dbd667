//! Error types for the Clearnode signer

use thiserror::Error;

/// Signer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Invalid signature encoding: {0}")]
    InvalidEncoding(String),

    #[error("Unknown signer type: 0x{0:02x}")]
    UnknownSignerType(u8),

    #[error("Signature recovery failed: {0}")]
    Recovery(String),

    #[error("Invalid signature: expected signer {expected}, recovered {recovered}")]
    InvalidSignature { expected: String, recovered: String },

    #[error("Signature from non-participant: {0}")]
    SignatureFromNonParticipant(String),

    #[error("Quorum not met: achieved weight {achieved}, required {required}")]
    QuorumNotMet { achieved: u64, required: u64 },

    #[error("Session key {session_key} is not authorized: {reason}")]
    UnauthorizedSessionKey { session_key: String, reason: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Resolver error: {0}")]
    Resolver(String),
}

/// Result type for signer operations
pub type SignerResult<T> = Result<T, SignerError>;
