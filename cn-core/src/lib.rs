//! Clearnode Core - Ledger Primitives and State Transition Engine
//!
//! The core of a state-channel clearing node: per-user channel states that
//! advance one typed transition at a time, and the allocation rules of
//! multi-party app sessions. Everything here is pure; persistence and
//! signatures live in the sibling crates.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                cn-node (Channel / App Session services)     │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  cn-signer (quorum, ECDSA)   │  cn-store (transactional)    │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │      cn-core (types, canonical packing, engine, rules)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! | Invariant | Requirement |
//! |-----------|-------------|
//! | **Single step** | A state version advances by exactly one transition |
//! | **Flow balance** | `UB + NB == UNF + NNF` on every ledger |
//! | **Deterministic IDs** | State, channel, session, tx and batch IDs are Keccak digests of packed fields |
//! | **Conservation** | Rebalance deltas sum to zero per asset |

pub mod allocation;
pub mod canon;
pub mod engine;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{CoreError, CoreResult};

pub use types::*;

pub use engine::{AdvanceContext, EscrowTarget, StateAdvancer};

pub use allocation::{AllocationDelta, AllocationMap, AssetTotals};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
