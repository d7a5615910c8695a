//! Matchmaking and connection tracking

pub mod connections;
pub mod queue;
pub mod service;

pub use connections::{Association, ConnectionRegistry};
pub use service::MatchmakingService;
