use std::time::Duration;

use serde::Deserialize;

use super::{deserialize_duration_from_ms, deserialize_duration_from_seconds};

fn default_batch_size() -> i64 {
    50
}

fn default_max_attempts() -> i64 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_delivery_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(5000)
}

/// Configuration for the notification dispatcher.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of intents fetched per dispatch cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Total delivery attempts per intent before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Delay before a failed intent becomes due again.
    #[serde(default = "default_retry_delay", deserialize_with = "deserialize_duration_from_seconds")]
    pub retry_delay: Duration,

    /// Upper bound on a single delivery attempt.
    #[serde(
        default = "default_delivery_timeout",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub delivery_timeout: Duration,

    /// Fallback polling interval; catches retries scheduled while no commit
    /// signal arrives.
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_duration_from_ms")]
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            delivery_timeout: default_delivery_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: DispatcherConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(30));
        assert_eq!(config.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
    }

    #[test]
    fn test_overrides() {
        let json = r#"{"max_attempts": 5, "retry_delay": 60, "poll_interval": 250}"#;
        let config: DispatcherConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
