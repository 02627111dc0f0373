//! Mesh room client configuration
//!
//! [`MeshConfig`] covers everything the orchestrator needs up front:
//! where the signaling relay lives, which room to join, the ICE server
//! set, and the bounds on peer count, candidate buffering and
//! negotiation retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// TURN server configuration with credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnServerConfig {
    /// TURN server URL (e.g. "turn:turn.example.com:3478")
    pub url: String,
    /// Username for authentication
    pub username: String,
    /// Credential for authentication
    pub credential: String,
}

/// Retry policy for failed peer negotiations
///
/// A failed negotiation is retried with exponential backoff until the
/// retry budget is exhausted, after which the peer record is closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (default: 5)
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds (default: 1000ms)
    pub backoff_initial_ms: u64,
    /// Maximum backoff delay in milliseconds (default: 30000ms)
    pub backoff_max_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to backoff (default: true)
    pub jitter_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_initial_ms: 1000,
            backoff_max_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for a given attempt number
    ///
    /// Uses exponential backoff with optional jitter.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (0-indexed)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms =
            (self.backoff_initial_ms as f64) * self.backoff_multiplier.powi(attempt as i32);

        // Clamp to maximum
        let backoff_ms = backoff_ms.min(self.backoff_max_ms as f64);

        // Add jitter (0-25% of backoff)
        let final_ms = if self.jitter_enabled {
            backoff_ms + rand_jitter(backoff_ms * 0.25)
        } else {
            backoff_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Simple pseudo-random jitter using time-based seed
fn rand_jitter(max: f64) -> f64 {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as f64;
    (seed % 1000.0) / 1000.0 * max
}

/// Mesh room client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Signaling relay WebSocket URL
    pub signaling_url: String,
    /// Room to join
    pub room_id: String,
    /// Display name announced to other peers
    pub display_name: String,
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN servers with credentials
    pub turn_servers: Vec<TurnServerConfig>,
    /// Maximum concurrent peer connections (1-16)
    pub max_peers: u32,
    /// Per-peer cap on ICE candidates buffered before the connection
    /// handle exists
    pub candidate_queue_limit: usize,
    /// Retry policy for failed negotiations
    pub retry: RetryPolicy,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            room_id: "default".to_string(),
            display_name: "anonymous".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            max_peers: 10,
            candidate_queue_limit: 32,
            retry: RetryPolicy::default(),
        }
    }
}

impl MeshConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a ws:// or wss:// URL
    /// - `room_id` or `display_name` is empty
    /// - `stun_servers` is empty
    /// - `max_peers` is not in range 1-16
    /// - `candidate_queue_limit` is zero
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room_id.is_empty() {
            return Err(Error::InvalidConfig("room_id must not be empty".to_string()));
        }

        if self.display_name.is_empty() {
            return Err(Error::InvalidConfig(
                "display_name must not be empty".to_string(),
            ));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.max_peers == 0 || self.max_peers > 16 {
            return Err(Error::InvalidConfig(format!(
                "max_peers must be in range 1-16, got {}",
                self.max_peers
            )));
        }

        if self.candidate_queue_limit == 0 {
            return Err(Error::InvalidConfig(
                "candidate_queue_limit must be at least 1".to_string(),
            ));
        }

        if self.retry.backoff_initial_ms == 0 || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "retry backoff must have a non-zero initial delay and a multiplier >= 1.0"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
