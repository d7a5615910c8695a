//! Battle engine modules

pub mod combat;
pub mod r#match;
pub mod registry;
pub mod runner;
pub mod snapshot;
pub mod timer;

pub use combat::MoveKind;
pub use r#match::{ConnectionId, EndReason, MatchId, MoveError, Slot};
pub use registry::MatchRegistry;
pub use runner::MatchCommand;
