//! Application state and inbound event dispatch

pub mod dispatch;
pub mod state;

pub use state::AppState;
