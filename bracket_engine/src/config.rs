//! Engine configuration loaded from environment variables.

use chrono::Duration;

/// Battle time limit once started (30 minutes)
pub const DEFAULT_BATTLE_TIMEOUT_MINUTES: i64 = 30;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Bracket engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minutes a started battle may run before it times out
    pub battle_timeout_minutes: i64,
    /// Shuffle entry order before seeding round 1 of an upcoming tournament
    pub shuffle_first_round: bool,
    /// Timeout for question catalog reads in seconds
    pub question_pool_timeout_secs: u64,
}

impl EngineConfig {
    /// Load from environment variables
    ///
    /// - `BATTLE_TIMEOUT_MINUTES` (default: 30)
    /// - `SHUFFLE_FIRST_ROUND` (default: true)
    /// - `QUESTION_POOL_TIMEOUT_SECS` (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            battle_timeout_minutes: parse_env_or(
                "BATTLE_TIMEOUT_MINUTES",
                DEFAULT_BATTLE_TIMEOUT_MINUTES,
            ),
            shuffle_first_round: parse_env_or("SHUFFLE_FIRST_ROUND", true),
            question_pool_timeout_secs: parse_env_or("QUESTION_POOL_TIMEOUT_SECS", 5),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.battle_timeout_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "BATTLE_TIMEOUT_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        if self.question_pool_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "QUESTION_POOL_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Question catalog read timeout
    pub fn question_pool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.question_pool_timeout_secs)
    }

    /// Battle time limit as a duration
    pub fn battle_timeout(&self) -> Duration {
        Duration::minutes(self.battle_timeout_minutes)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            battle_timeout_minutes: DEFAULT_BATTLE_TIMEOUT_MINUTES,
            shuffle_first_round: true,
            question_pool_timeout_secs: 5,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or malformed
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_battle_timeout_is_thirty_minutes() {
        let config = EngineConfig::default();
        assert_eq!(config.battle_timeout(), Duration::minutes(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_positive_timeout_rejected() {
        let config = EngineConfig {
            battle_timeout_minutes: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_env_or_falls_back_on_missing_key() {
        let value: u32 = parse_env_or("BRACKET_ENGINE_TEST_SURELY_UNSET_KEY", 7);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "set it".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"));
        assert!(msg.contains("set it"));
    }
}
