//! Engine configuration

use std::fmt;
use std::str::FromStr;

/// Default bound on `on_enter` invocations in one cycle
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 25;

/// Default text sent when a cycle fails unexpectedly
pub const DEFAULT_ERROR_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// What to do when `on_response` returns the state the session is already in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameStatePolicy {
    /// Treat it like returning nothing
    #[default]
    Stay,
    /// Run the state's `on_enter` again (re-prompt)
    Reenter,
}

impl FromStr for SameStatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stay" => Ok(Self::Stay),
            "reenter" | "re-enter" => Ok(Self::Reenter),
            other => Err(format!("Unknown same-state policy: {other}")),
        }
    }
}

impl fmt::Display for SameStatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stay => f.write_str("stay"),
            Self::Reenter => f.write_str("reenter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum `on_enter` invocations per cycle before failing with a loop error
    pub max_chain_length: usize,
    pub same_state: SameStatePolicy,
    /// Best-effort message sent to the user when a cycle fails; `None` disables it
    pub error_reply: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            same_state: SameStatePolicy::Stay,
            error_reply: Some(DEFAULT_ERROR_REPLY.to_string()),
        }
    }
}

impl EngineConfig {
    /// Read `STATEBOT_MAX_CHAIN`, `STATEBOT_SAME_STATE` and `STATEBOT_ERROR_REPLY`
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparsable values fall back to
    /// the defaults with a warning.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("STATEBOT_MAX_CHAIN") {
            match raw.trim().parse::<usize>() {
                Ok(n) => config = config.with_max_chain_length(n),
                Err(e) => tracing::warn!(value = %raw, error = %e, "Invalid STATEBOT_MAX_CHAIN, using default"),
            }
        }

        if let Some(raw) = lookup("STATEBOT_SAME_STATE") {
            match raw.parse::<SameStatePolicy>() {
                Ok(policy) => config.same_state = policy,
                Err(e) => tracing::warn!(error = %e, "Invalid STATEBOT_SAME_STATE, using default"),
            }
        }

        if let Some(reply) = lookup("STATEBOT_ERROR_REPLY") {
            config.error_reply = if reply.is_empty() { None } else { Some(reply) };
        }

        config
    }

    /// Chains need at least one step, so zero is clamped to one
    #[must_use]
    pub fn with_max_chain_length(mut self, n: usize) -> Self {
        self.max_chain_length = n.max(1);
        self
    }

    #[must_use]
    pub fn with_same_state(mut self, policy: SameStatePolicy) -> Self {
        self.same_state = policy;
        self
    }

    #[must_use]
    pub fn with_error_reply(mut self, reply: Option<String>) -> Self {
        self.error_reply = reply;
        self
    }
}
