//! Deployment-wide run retry settings.

use serde::{Deserialize, Serialize};

/// Run retry policy applied when a run carries no overriding tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRetriesSettings {
    /// Master switch. When off, no run is retried and the daemon is not required.
    pub enabled: bool,
    /// Default ceiling used when a run has no `max_retries` tag.
    pub max_retries: u32,
    /// Whether asset/op (user code) failures trigger a retry.
    pub retry_on_asset_or_op_failure: bool,
}

impl Default for RunRetriesSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            retry_on_asset_or_op_failure: true,
        }
    }
}

impl RunRetriesSettings {
    pub fn enabled(max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_retry_on_asset_or_op_failure(mut self, retry: bool) -> Self {
        self.retry_on_asset_or_op_failure = retry;
        self
    }
}
