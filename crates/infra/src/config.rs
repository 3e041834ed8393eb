//! Daemon configuration.
//!
//! Values come from `RELAUNCH_*` environment variables; anything unset keeps its
//! default. `from_lookup` takes any key → value function so tests do not have to
//! mutate the process environment.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use relaunch_core::RunRetriesSettings;
use relaunch_core::tags::boolean_tag_value;
use relaunch_observability::LogFormat;

pub const ENV_RUN_RETRIES_ENABLED: &str = "RELAUNCH_RUN_RETRIES_ENABLED";
pub const ENV_RUN_RETRIES_MAX_RETRIES: &str = "RELAUNCH_RUN_RETRIES_MAX_RETRIES";
pub const ENV_RUN_RETRIES_RETRY_ON_ASSET_OR_OP_FAILURE: &str =
    "RELAUNCH_RUN_RETRIES_RETRY_ON_ASSET_OR_OP_FAILURE";
pub const ENV_POLL_INTERVAL_MS: &str = "RELAUNCH_POLL_INTERVAL_MS";
pub const ENV_EVENT_FETCH_LIMIT: &str = "RELAUNCH_EVENT_FETCH_LIMIT";
pub const ENV_LOG_FORMAT: &str = "RELAUNCH_LOG_FORMAT";

pub const DEFAULT_DAEMON_NAME: &str = "auto-reexecution";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EVENT_FETCH_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Daemon name; also the key its event-log cursor is stored under.
    pub name: String,
    pub poll_interval: Duration,
    /// Maximum failure events consumed per tick.
    pub event_fetch_limit: usize,
    pub run_retries: RunRetriesSettings,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DAEMON_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_fetch_limit: DEFAULT_EVENT_FETCH_LIMIT,
            run_retries: RunRetriesSettings::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RUN_RETRIES_ENABLED) {
            config.run_retries.enabled = boolean_tag_value(Some(&raw), false);
        }
        if let Some(max) = parse_var::<u32>(&lookup, ENV_RUN_RETRIES_MAX_RETRIES)? {
            config.run_retries.max_retries = max;
        }
        if let Some(raw) = lookup(ENV_RUN_RETRIES_RETRY_ON_ASSET_OR_OP_FAILURE) {
            config.run_retries.retry_on_asset_or_op_failure = boolean_tag_value(Some(&raw), true);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLL_INTERVAL_MS)? {
            if ms == 0 {
                bail!("{ENV_POLL_INTERVAL_MS} must be greater than zero");
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, ENV_EVENT_FETCH_LIMIT)? {
            if limit == 0 {
                bail!("{ENV_EVENT_FETCH_LIMIT} must be greater than zero");
            }
            config.event_fetch_limit = limit;
        }
        if let Some(format) = parse_var::<LogFormat>(&lookup, ENV_LOG_FORMAT)? {
            config.log_format = format;
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = DaemonConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert!(!config.run_retries.enabled);
        assert!(config.run_retries.retry_on_asset_or_op_failure);
        assert_eq!(config.event_fetch_limit, 500);
    }

    #[test]
    fn reads_every_variable() {
        let config = DaemonConfig::from_lookup(lookup(&[
            (ENV_RUN_RETRIES_ENABLED, "true"),
            (ENV_RUN_RETRIES_MAX_RETRIES, "3"),
            (ENV_RUN_RETRIES_RETRY_ON_ASSET_OR_OP_FAILURE, "false"),
            (ENV_POLL_INTERVAL_MS, "250"),
            (ENV_EVENT_FETCH_LIMIT, "50"),
            (ENV_LOG_FORMAT, "pretty"),
        ]))
        .unwrap();

        assert!(config.run_retries.enabled);
        assert_eq!(config.run_retries.max_retries, 3);
        assert!(!config.run_retries.retry_on_asset_or_op_failure);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.event_fetch_limit, 50);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = DaemonConfig::from_lookup(lookup(&[(ENV_RUN_RETRIES_MAX_RETRIES, "-1")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_RUN_RETRIES_MAX_RETRIES));

        let err = DaemonConfig::from_lookup(lookup(&[(ENV_POLL_INTERVAL_MS, "0")])).unwrap_err();
        assert!(err.to_string().contains(ENV_POLL_INTERVAL_MS));
    }
}
