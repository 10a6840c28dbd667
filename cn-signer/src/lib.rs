//! Clearnode Signature Service
//!
//! - secp256k1 recoverable signatures over Keccak-256 digests of packed values
//! - Wallet and session-key signer classes
//! - Weighted quorum verification with per-signer deduplication

pub mod crypto;
pub mod error;
pub mod quorum;
pub mod signer;

pub use crypto::*;
pub use error::*;
pub use quorum::*;
pub use signer::*;
