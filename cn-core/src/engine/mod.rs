//! State Transition Engine
//!
//! Pure functions over values; nothing here touches storage.

mod advancer;
mod ongoing;

pub use advancer::*;
pub use ongoing::*;
