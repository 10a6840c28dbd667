//! Node Error Types
//!
//! Every failure is classified into one [`ErrorKind`]. Store and internal
//! failures never reach the caller with their detail; see
//! [`NodeError::public_message`].

use cn_core::CoreError;
use cn_signer::SignerError;
use cn_store::StoreError;
use thiserror::Error;

/// Message returned for failures whose detail stays internal
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Node Result type
pub type NodeResult<T> = Result<T, NodeError>;

/// Failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad encoding or missing field; rejected before any store access
    MalformedInput,
    /// Wrong version, closed session or channel, bad parameters
    Precondition,
    /// Undecodable, unrecoverable or insufficient signatures
    Signature,
    /// Allocation or conservation rule broken
    Invariant,
    /// Store or other internal failure
    Store,
}

/// Node Error
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Signer(#[from] SignerError),

    #[error("{0}")]
    Store(StoreError),

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Entity not found
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    /// Request not allowed in the current state
    #[error("{0}")]
    Precondition(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for NodeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(core) => Self::Core(core),
            StoreError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            StoreError::Duplicate { entity_type, id } => {
                Self::Precondition(format!("{entity_type} {id} already exists"))
            }
            StoreError::VersionConflict {
                entity_type,
                id,
                stored,
                update,
            } => Self::Precondition(format!(
                "{entity_type} {id} is at version {stored}, cannot apply version {update}"
            )),
            other => Self::Store(other),
        }
    }
}

impl NodeError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) if e.is_malformed_input() => ErrorKind::MalformedInput,
            Self::Core(e) if e.is_invariant() => ErrorKind::Invariant,
            Self::Core(_) => ErrorKind::Precondition,
            Self::Signer(SignerError::InvalidKey(_)) | Self::Signer(SignerError::SigningFailed(_)) => {
                ErrorKind::Store
            }
            Self::Signer(_) => ErrorKind::Signature,
            Self::InvalidRequest(_) => ErrorKind::MalformedInput,
            Self::NotFound { .. } | Self::Precondition(_) => ErrorKind::Precondition,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Store,
        }
    }

    /// Reason safe to return to the caller
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Store => INTERNAL_ERROR_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}
