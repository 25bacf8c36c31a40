//! Engine configuration.
//!
//! Timings are stored in milliseconds so the same struct can be loaded from a
//! YAML file checked into the test suite:
//!
//! ```yaml
//! resolve_timeout_ms: 15000
//! per_candidate_timeout_ms: 1500
//! poll_interval_ms: 200
//! ladder: [direct, scroll_into_view, forced, script]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::action::ActionTier;
use crate::result::{HoldfastError, HoldfastResult};

/// Default chain-level resolution timeout
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 10_000;

/// Default window granted to a single candidate before moving on
pub const DEFAULT_PER_CANDIDATE_TIMEOUT_MS: u64 = 2_000;

/// Default re-query interval inside a candidate window
pub const DEFAULT_RESOLVE_POLL_MS: u64 = 100;

/// Default condition polling interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Default condition polling deadline
pub const DEFAULT_POLL_DEADLINE_MS: u64 = 5_000;

/// Default bound on a single action tier
pub const DEFAULT_TIER_TIMEOUT_MS: u64 = 5_000;

/// Default pause between scrolling and retrying
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 300;

/// Per-channel tolerance when comparing rendered colors
pub const DEFAULT_COLOR_TOLERANCE: u8 = 3;

/// Configuration shared by the resolver, executor and waiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chain-level resolution deadline
    pub resolve_timeout_ms: u64,
    /// Window per candidate before advancing
    pub per_candidate_timeout_ms: u64,
    /// Re-query interval within a candidate window
    pub resolve_poll_ms: u64,
    /// Condition polling interval
    pub poll_interval_ms: u64,
    /// Condition polling deadline
    pub poll_deadline_ms: u64,
    /// Bound on each action tier
    pub tier_timeout_ms: u64,
    /// Settle delay after scrolling
    pub settle_delay_ms: u64,
    /// Color comparison tolerance per channel
    pub color_tolerance: u8,
    /// Action fallback ladder, in order
    pub ladder: Vec<ActionTier>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: DEFAULT_RESOLVE_TIMEOUT_MS,
            per_candidate_timeout_ms: DEFAULT_PER_CANDIDATE_TIMEOUT_MS,
            resolve_poll_ms: DEFAULT_RESOLVE_POLL_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_deadline_ms: DEFAULT_POLL_DEADLINE_MS,
            tier_timeout_ms: DEFAULT_TIER_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            color_tolerance: DEFAULT_COLOR_TOLERANCE,
            ladder: ActionTier::default_ladder(),
        }
    }
}

impl EngineConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or fails validation
    pub fn from_yaml_str(yaml: &str) -> HoldfastResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> HoldfastResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Check timing relationships
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::Config`] describing the first violation
    pub fn validate(&self) -> HoldfastResult<()> {
        let fail = |message: &str| {
            Err(HoldfastError::Config {
                message: message.to_string(),
            })
        };
        if self.resolve_timeout_ms == 0 || self.per_candidate_timeout_ms == 0 {
            return fail("resolution timeouts must be non-zero");
        }
        if self.resolve_poll_ms == 0 || self.poll_interval_ms == 0 {
            return fail("polling intervals must be non-zero");
        }
        if self.poll_interval_ms >= self.poll_deadline_ms {
            return fail("poll_interval_ms must be smaller than poll_deadline_ms");
        }
        if self.tier_timeout_ms == 0 {
            return fail("tier_timeout_ms must be non-zero");
        }
        if self.ladder.is_empty() {
            return fail("action ladder must contain at least one tier");
        }
        Ok(())
    }

    /// Set the chain-level resolution timeout
    #[must_use]
    pub const fn with_resolve_timeout(mut self, ms: u64) -> Self {
        self.resolve_timeout_ms = ms;
        self
    }

    /// Set the per-candidate window
    #[must_use]
    pub const fn with_per_candidate_timeout(mut self, ms: u64) -> Self {
        self.per_candidate_timeout_ms = ms;
        self
    }

    /// Set polling interval and deadline
    #[must_use]
    pub const fn with_polling(mut self, interval_ms: u64, deadline_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self.poll_deadline_ms = deadline_ms;
        self
    }

    /// Set the per-tier timeout
    #[must_use]
    pub const fn with_tier_timeout(mut self, ms: u64) -> Self {
        self.tier_timeout_ms = ms;
        self
    }

    /// Set the post-scroll settle delay
    #[must_use]
    pub const fn with_settle_delay(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Replace the action ladder
    #[must_use]
    pub fn with_ladder(mut self, ladder: Vec<ActionTier>) -> Self {
        self.ladder = ladder;
        self
    }

    /// Resolution timeout as Duration
    #[must_use]
    pub const fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Per-candidate window as Duration
    #[must_use]
    pub const fn per_candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.per_candidate_timeout_ms)
    }

    /// Resolution re-query interval as Duration
    #[must_use]
    pub const fn resolve_poll(&self) -> Duration {
        Duration::from_millis(self.resolve_poll_ms)
    }

    /// Poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll deadline as Duration
    #[must_use]
    pub const fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_deadline_ms)
    }

    /// Tier timeout as Duration
    #[must_use]
    pub const fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }

    /// Settle delay as Duration
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
