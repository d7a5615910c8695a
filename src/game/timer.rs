//! Turn timer - forces a skip when the player to move stalls
//!
//! The timer lives inside the match executor and is polled from the same
//! `select!` loop that applies moves, so an expiry can never interleave
//! with a move for the same match.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct TurnTimer {
    /// None disables the timer entirely
    duration: Option<Duration>,
    deadline: Option<Instant>,
}

impl TurnTimer {
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// (Re)start the countdown from now
    pub fn arm(&mut self) {
        self.deadline = self.duration.map(|d| Instant::now() + d);
    }

    /// Cancel the countdown; calling it twice is harmless
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Resolves once the armed deadline passes; never resolves while disarmed
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => pending::<()>().await,
        }
    }
}
