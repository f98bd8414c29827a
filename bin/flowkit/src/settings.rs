//! Tunables not covered by command-line flags, layered with figment.

use std::time::Duration;

use anyhow::{Context as _, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use flowkit::{Context, flow::MAX_GAS_LIMIT, transactions::SenderConfig};
use serde::{Deserialize, Serialize};

/// Optional file in the working directory holding the same keys.
pub const SETTINGS_FILE: &str = "flowkit.toml";

/// Prefix of the environment variables overriding settings.
pub const ENV_PREFIX: &str = "FLOW_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Gas limit of deployment and account transactions.
    pub gas_limit: u64,
    /// Delay between two transaction status polls.
    pub poll_interval_ms: u64,
    /// Upper bound on a whole command, none by default.
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gas_limit: MAX_GAS_LIMIT,
            poll_interval_ms: 1000,
            timeout_secs: None,
        }
    }
}

impl Settings {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(SETTINGS_FILE))
            .merge(Env::prefixed(ENV_PREFIX).only(&["gas_limit", "poll_interval_ms", "timeout_secs"]))
    }

    /// Defaults, then `flowkit.toml`, then `FLOW_*` variables.
    pub fn load() -> Result<Self> {
        Self::figment()
            .extract()
            .context("Failed to load flowkit settings")
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            gas_limit: self.gas_limit,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn context(&self) -> Context {
        match self.timeout_secs {
            Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
            None => Context::new(),
        }
    }
}
