//! JSON configuration file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use pyre_broadcast::{BroadcastPolicy, ConfigurationError, EndpointPool};
use pyre_steem::{PostingKey, STEEM_CHAIN_ID};

/// Placeholder values shipped in the example config.
const TEMPLATE_USERNAME: &str = "your_steem_username";
const TEMPLATE_POSTING_KEY: &str = "your_posting_key_here";

/// Shortest plausible WIF posting key.
const MIN_POSTING_KEY_LEN: usize = 50;

/// Longest accepted posting interval.
const MAX_INTERVAL_HOURS: f64 = 24.0;

/// Errors loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "config still has template credentials; set username and posting_key, or enable dry_run for testing"
    )]
    TemplateCredentials,

    #[error("username is required")]
    MissingUsername,

    #[error("invalid interval_hours: {0} (must be greater than 0 and at most 24)")]
    InvalidInterval(f64),

    #[error("tags must not be empty")]
    EmptyTags,

    #[error("invalid broadcast.retry_delay_secs: {0} (must be 0 or more)")]
    InvalidRetryDelay(f64),

    #[error("invalid broadcast.request_timeout_secs: {0} (must be greater than 0)")]
    InvalidRequestTimeout(f64),

    #[error("invalid posting key: {0}")]
    InvalidPostingKey(String),

    #[error("signer.command is required unless dry_run is enabled")]
    MissingSigner,

    #[error(transparent)]
    Broadcast(#[from] ConfigurationError),
}

/// Retry and timeout settings for broadcasting.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// External signer invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct SignerSettings {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default = "default_signer_timeout_secs")]
    pub timeout_secs: u64,
}

/// Agent configuration, usually read from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub posting_key: String,
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: f64,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub post_immediately: bool,
    #[serde(default)]
    pub self_vote: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub signer: Option<SignerSettings>,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
}

fn default_nodes() -> Vec<String> {
    vec!["https://api.steemit.com".to_string()]
}

fn default_interval_hours() -> f64 {
    2.0
}

fn default_tags() -> Vec<String> {
    ["burnpost", "steem", "burn", "null", "steemit"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    pyre_broadcast::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_secs() -> f64 {
    pyre_broadcast::DEFAULT_RETRY_DELAY.as_secs_f64()
}

fn default_request_timeout_secs() -> f64 {
    pyre_broadcast::DEFAULT_ATTEMPT_TIMEOUT.as_secs_f64()
}

fn default_signer_timeout_secs() -> u64 {
    10
}

fn default_chain_id() -> String {
    STEEM_CHAIN_ID.to_string()
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check everything needed before the first post is scheduled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username == TEMPLATE_USERNAME || self.posting_key == TEMPLATE_POSTING_KEY {
            warn!("config.json still contains template credentials");
            if !self.dry_run {
                return Err(ConfigError::TemplateCredentials);
            }
        }

        if !(self.interval_hours > 0.0 && self.interval_hours <= MAX_INTERVAL_HOURS) {
            return Err(ConfigError::InvalidInterval(self.interval_hours));
        }
        if self.tags.is_empty() {
            return Err(ConfigError::EmptyTags);
        }

        self.endpoint_pool()?;
        self.broadcast_policy()?;

        if self.dry_run {
            return Ok(());
        }

        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        validate_posting_key(&self.posting_key)?;
        if self.signer.as_ref().is_none_or(|s| s.command.is_empty()) {
            return Err(ConfigError::MissingSigner);
        }

        Ok(())
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.interval_hours * 3600.0)
            .map_err(|_| ConfigError::InvalidInterval(self.interval_hours))
    }

    pub fn endpoint_pool(&self) -> Result<EndpointPool, ConfigError> {
        Ok(EndpointPool::new(self.nodes.iter().cloned())?)
    }

    pub fn broadcast_policy(&self) -> Result<BroadcastPolicy, ConfigError> {
        let delay = self.broadcast.retry_delay_secs;
        let retry_delay = Duration::try_from_secs_f64(delay)
            .map_err(|_| ConfigError::InvalidRetryDelay(delay))?;

        Ok(BroadcastPolicy::new(
            self.broadcast.max_retries,
            retry_delay,
            self.request_timeout()?,
        )?)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        let secs = self.broadcast.request_timeout_secs;
        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or(ConfigError::InvalidRequestTimeout(secs))
    }

    pub fn posting_key(&self) -> PostingKey {
        PostingKey::new(self.posting_key.trim())
    }
}

fn non_base58_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0OIl]").unwrap())
}

/// Cheap sanity check on a WIF posting key before it reaches the signer.
pub fn validate_posting_key(raw: &str) -> Result<(), ConfigError> {
    let key = raw.trim();

    if key.len() < MIN_POSTING_KEY_LEN {
        return Err(ConfigError::InvalidPostingKey(format!(
            "key is too short ({} chars) or missing, expected 51",
            key.len()
        )));
    }
    if !key.starts_with('5') {
        return Err(ConfigError::InvalidPostingKey(
            "posting keys start with \"5\"".to_string(),
        ));
    }

    let invalid: Vec<&str> = non_base58_regex()
        .find_iter(key)
        .map(|m| m.as_str())
        .collect();
    if !invalid.is_empty() {
        warn!("base58 excludes 0 (zero), O (capital o), I (capital i) and l (lowercase L)");
        return Err(ConfigError::InvalidPostingKey(format!(
            "contains non-base58 characters [{}]",
            invalid.join(", ")
        )));
    }

    info!(length = key.len(), "posting key format ok");
    Ok(())
}
