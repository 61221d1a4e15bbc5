//! Client configuration.
//!
//! # Design
//! `ClientConfig` is plain data that can be deserialized from JSON or read
//! from `CURLMUX_*` environment variables. It feeds the scheduler's default
//! poll timeout and the transfer options every request starts with.

use std::time::Duration;

use serde::Deserialize;

use crate::options::{Config, TransferOption};

/// Default blocking bound for one poll pass.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll_timeout_ms: u64,
    pub user_agent: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub follow_location: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            user_agent: None,
            connect_timeout_ms: None,
            timeout_ms: None,
            follow_location: false,
        }
    }
}

impl ClientConfig {
    /// Read `CURLMUX_POLL_TIMEOUT_MS`, `CURLMUX_USER_AGENT`,
    /// `CURLMUX_CONNECT_TIMEOUT_MS`, `CURLMUX_TIMEOUT_MS` and
    /// `CURLMUX_FOLLOW_LOCATION`. Unset or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = Self::default();
        Self {
            poll_timeout_ms: number("CURLMUX_POLL_TIMEOUT_MS").unwrap_or(defaults.poll_timeout_ms),
            user_agent: lookup("CURLMUX_USER_AGENT").filter(|ua| !ua.is_empty()),
            connect_timeout_ms: number("CURLMUX_CONNECT_TIMEOUT_MS"),
            timeout_ms: number("CURLMUX_TIMEOUT_MS"),
            follow_location: lookup("CURLMUX_FOLLOW_LOCATION")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(defaults.follow_location),
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// The transfer options this config implies.
    pub fn to_config(&self) -> Config {
        let mut options = Vec::new();
        if let Some(ua) = &self.user_agent {
            options.push(TransferOption::UserAgent(ua.clone()));
        }
        if let Some(ms) = self.connect_timeout_ms {
            options.push(TransferOption::ConnectTimeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.timeout_ms {
            options.push(TransferOption::Timeout(Duration::from_millis(ms)));
        }
        if self.follow_location {
            options.push(TransferOption::FollowLocation(true));
        }
        if options.is_empty() {
            Config::new()
        } else {
            Config::options(options)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_one_millisecond_poll() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_timeout(), Duration::from_millis(1));
        assert!(config.to_config().is_empty());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"user_agent":"bot/1.0","follow_location":true}"#).unwrap();
        assert_eq!(config.poll_timeout_ms, DEFAULT_POLL_TIMEOUT_MS);
        assert_eq!(config.user_agent.as_deref(), Some("bot/1.0"));
        assert!(config.follow_location);
    }

    #[test]
    fn reads_environment_lookup() {
        let env: HashMap<&str, &str> = [
            ("CURLMUX_POLL_TIMEOUT_MS", "25"),
            ("CURLMUX_TIMEOUT_MS", "5000"),
            ("CURLMUX_CONNECT_TIMEOUT_MS", "not a number"),
            ("CURLMUX_FOLLOW_LOCATION", "yes"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.poll_timeout(), Duration::from_millis(25));
        assert_eq!(config.timeout_ms, Some(5000));
        assert_eq!(config.connect_timeout_ms, None);
        assert!(config.follow_location);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn converts_to_transfer_options() {
        let config = ClientConfig {
            user_agent: Some("curlmux".into()),
            timeout_ms: Some(250),
            ..ClientConfig::default()
        };
        let rendered = format!("{:?}", config.to_config());
        assert!(rendered.contains("UserAgent(\"curlmux\")"));
        assert!(rendered.contains("Timeout(250ms)"));
    }
}
