use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::retry::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_QUOTE_URL: &str = "https://v1.hitokoto.cn/";

const MAX_ATTEMPTS_LIMIT: usize = 10;
const MIN_DELAY_MS: u64 = 10;
const MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: u64::try_from(DEFAULT_INITIAL_DELAY.as_millis()).unwrap_or(500),
        }
    }
}

impl RetrySettings {
    pub fn new(max_attempts: Option<usize>, initial_delay_ms: Option<u64>) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: max_attempts
                .map(|value| value.clamp(1, MAX_ATTEMPTS_LIMIT))
                .unwrap_or(defaults.max_attempts),
            initial_delay_ms: initial_delay_ms
                .map(|value| value.clamp(MIN_DELAY_MS, MAX_DELAY_MS))
                .unwrap_or(defaults.initial_delay_ms),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Everything the bot needs at startup.
///
/// `server_id`, `channel_id` and `salai_token` have no defaults; [`validate`]
/// refuses to start without them.
///
/// [`validate`]: BotConfig::validate
#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub server_id: String,
    pub channel_id: String,
    pub salai_token: String,
    pub db_path: PathBuf,
    pub out_dir: PathBuf,
    pub events_path: Option<PathBuf>,
    pub quote_url: Option<String>,
    pub retry: RetrySettings,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("server_id", &self.server_id)
            .field("channel_id", &self.channel_id)
            .field("salai_token", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("out_dir", &self.out_dir)
            .field("events_path", &self.events_path)
            .field("quote_url", &self.quote_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("server_id", &self.server_id),
            ("channel_id", &self.channel_id),
            ("salai_token", &self.salai_token),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect::<Vec<&str>>();
        if !missing.is_empty() {
            bail!("missing required setting(s): {}", missing.join(", "));
        }
        if let Some(url) = &self.quote_url {
            if reqwest::Url::parse(url).is_err() {
                bail!("quote_url is not a valid URL: {url}");
            }
        }
        Ok(())
    }
}
