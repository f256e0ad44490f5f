//! Engine configuration.
//!
//! Values come from code, from any serde source, or from environment variables via
//! [`EngineConfig::from_env`].

use serde::{Deserialize, Serialize};

/// Extra round trips allowed per logical request when nothing else is configured.
pub const DEFAULT_MAX_REPLAY_COUNT: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Cap on intermediate requests plus replays for one logical request.
    pub max_replay_count: u32,
    /// Log a warning when a request names a scheme that is not registered.
    pub warn_on_unknown_scheme: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_replay_count: DEFAULT_MAX_REPLAY_COUNT,
            warn_on_unknown_scheme: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `AUTHFLOW_*` environment variables, keeping defaults for anything
    /// unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(count) = std::env::var("AUTHFLOW_MAX_REPLAY_COUNT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.max_replay_count = count;
        }
        if let Ok(v) = std::env::var("AUTHFLOW_WARN_UNKNOWN_SCHEME") {
            config.warn_on_unknown_scheme = !(v == "0" || v.eq_ignore_ascii_case("false"));
        }

        config
    }

    #[must_use]
    pub fn with_max_replay_count(mut self, max_replay_count: u32) -> Self {
        self.max_replay_count = max_replay_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_replay_count, 3);
        assert!(config.warn_on_unknown_scheme);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig = serde_json::from_str(r#"{"maxReplayCount": 5}"#).unwrap();
        assert_eq!(config.max_replay_count, 5);
        assert!(config.warn_on_unknown_scheme);
    }
}
