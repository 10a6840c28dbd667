//! Clearnode domain types

mod app;
mod channel;
mod ledger;
mod primitives;
mod state;
mod transaction;
mod transition;

pub use app::*;
pub use channel::*;
pub use ledger::*;
pub use primitives::*;
pub use state::*;
pub use transaction::*;
pub use transition::*;
