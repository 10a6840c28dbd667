//! Clearnode Store
//!
//! Transactional persistence for channels, states, app sessions, the session
//! ledger and the append-only transaction log.
//!
//! # Repositories
//!
//! - [`Store`]: opens transactions
//! - [`StoreTx`]: reads and writes inside one transaction
//! - [`AssetStore`]: asset precision lookup
//!
//! # Implementations
//!
//! - [`MemoryStore`]: in-memory, serializes transactions
//! - [`StaticAssetStore`]: fixed asset table

pub mod error;
pub mod memory;
pub mod repo;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryTx, StaticAssetStore};
pub use repo::{AppSessionFilter, AssetStore, Store, StoreTx};
