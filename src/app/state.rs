//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::matchmaking::{ConnectionRegistry, MatchmakingService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let connections = Arc::new(ConnectionRegistry::new());

        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new(
            connections.clone(),
            config.game.clone(),
        ));

        // Initialize matchmaking service (Arc for sharing across cloned AppState)
        let matchmaking = Arc::new(MatchmakingService::new(
            connections.clone(),
            match_registry.clone(),
        ));

        Self {
            config,
            connections,
            matchmaking,
            match_registry,
        }
    }
}
