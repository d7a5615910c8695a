//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated), permissive when unset
    pub client_origin: Option<String>,

    /// Gameplay tuning shared by every match
    pub game: GameConfig,

    /// How often the idle sweeper runs
    pub sweep_interval: Duration,
    /// Max inbound WebSocket frames per second per connection
    pub input_rate_limit: u32,
}

/// Per-match settings handed to every match executor
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Time a player has to act before a skip is forced (None = no timer)
    pub turn_timeout: Option<Duration>,
    /// A match with no accepted move for this long is evicted
    pub match_idle: Duration,
    /// Inclusive range max health is rolled from
    pub health_min: u32,
    pub health_max: u32,
    /// Minimum gap between two accepted moves of one player
    pub move_cooldown: Duration,
    /// Chat messages are truncated to this many characters
    pub chat_max_len: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Some(Duration::from_secs(30)),
            match_idle: Duration::from_secs(300),
            health_min: 100,
            health_max: 100,
            move_cooldown: Duration::ZERO,
            chat_max_len: 200,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let turn_timeout_secs: u64 = parse_var("TURN_TIMEOUT_SECS", 30)?;
        let game = GameConfig {
            turn_timeout: (turn_timeout_secs > 0).then(|| Duration::from_secs(turn_timeout_secs)),
            match_idle: Duration::from_secs(parse_var("MATCH_IDLE_SECS", 300)?),
            health_min: parse_var("HEALTH_MIN", 100)?,
            health_max: parse_var("HEALTH_MAX", 100)?,
            move_cooldown: Duration::from_millis(parse_var("MOVE_COOLDOWN_MS", 0)?),
            chat_max_len: parse_var("CHAT_MAX_LEN", 200)?,
        };
        game.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            game,

            sweep_interval: Duration::from_secs(parse_var::<u64>("SWEEP_INTERVAL_SECS", 15)?.max(1)),
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", 10)?,
        })
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_min == 0 || self.health_min > self.health_max {
            return Err(ConfigError::InvalidHealthRange {
                min: self.health_min,
                max: self.health_max,
            });
        }
        Ok(())
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid health range: min {min}, max {max}")]
    InvalidHealthRange { min: u32, max: u32 },

    #[error("Invalid server address format")]
    InvalidAddress,
}
