//! Configuration for the ledger gateway.
//!
//! [`GatewayConfig`] names the channel, where connection profiles live,
//! discovery options, per-phase timeouts and the evaluate retry policy.
//! It can be built in code through its builder or deserialized from a
//! configuration file, with durations in humantime form (`"5s"`,
//! `"100ms"`).
//!
//! ```
//! use std::time::Duration;
//!
//! use claimledger_gateway::{GatewayConfig, TimeoutConfig};
//!
//! let config = GatewayConfig::builder()
//!     .profile_dir("connection-profiles")
//!     .channel("mychannel")
//!     .timeouts(TimeoutConfig::builder().evaluate(Duration::from_secs(2)).build()?)
//!     .build()?;
//! assert_eq!(config.channel(), "mychannel");
//! # Ok::<(), claimledger_gateway::ConfigError>(())
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default channel name.
pub const DEFAULT_CHANNEL: &str = "mychannel";

/// Default connection profile file name; `{org}` is replaced by the organization.
pub const DEFAULT_PROFILE_FILE_PATTERN: &str = "connection-{org}.json";

/// Default wallet directory, relative to the working directory.
pub const DEFAULT_WALLET_DIR: &str = "wallet";

/// Default connect timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default evaluate timeout (5 seconds).
pub const DEFAULT_EVALUATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default endorse timeout (15 seconds).
pub const DEFAULT_ENDORSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default submit timeout (5 seconds).
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default commit status timeout (60 seconds).
pub const DEFAULT_COMMIT_STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// Default initial backoff between evaluate retries.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default upper bound for evaluate retry backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_owned()
}

fn default_profile_file_pattern() -> String {
    DEFAULT_PROFILE_FILE_PATTERN.to_owned()
}

fn default_wallet_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WALLET_DIR)
}

fn default_true() -> bool {
    true
}

fn ensure_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
    }
    Ok(())
}

// ── Discovery ──────────────────────────────────────────────────────────

/// Peer discovery options passed to the connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Whether service discovery is used to find endorsing peers.
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub enabled: bool,

    /// Rewrites discovered addresses to `localhost` (development networks
    /// running in containers).
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub as_localhost: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { enabled: true, as_localhost: true }
    }
}

// ── Timeouts ───────────────────────────────────────────────────────────

/// Per-phase deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Connection handshake.
    #[serde(with = "humantime_serde", default = "default_connect")]
    pub(crate) connect: Duration,
    /// Evaluate round trip.
    #[serde(with = "humantime_serde", default = "default_evaluate")]
    pub(crate) evaluate: Duration,
    /// Endorsement collection.
    #[serde(with = "humantime_serde", default = "default_endorse")]
    pub(crate) endorse: Duration,
    /// Hand-off to the ordering service.
    #[serde(with = "humantime_serde", default = "default_submit")]
    pub(crate) submit: Duration,
    /// Wait for commit status.
    #[serde(with = "humantime_serde", default = "default_commit_status")]
    pub(crate) commit_status: Duration,
}

fn default_connect() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_evaluate() -> Duration {
    DEFAULT_EVALUATE_TIMEOUT
}

fn default_endorse() -> Duration {
    DEFAULT_ENDORSE_TIMEOUT
}

fn default_submit() -> Duration {
    DEFAULT_SUBMIT_TIMEOUT
}

fn default_commit_status() -> Duration {
    DEFAULT_COMMIT_STATUS_TIMEOUT
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            evaluate: DEFAULT_EVALUATE_TIMEOUT,
            endorse: DEFAULT_ENDORSE_TIMEOUT,
            submit: DEFAULT_SUBMIT_TIMEOUT,
            commit_status: DEFAULT_COMMIT_STATUS_TIMEOUT,
        }
    }
}

#[bon::bon]
impl TimeoutConfig {
    /// Creates a timeout configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] if any timeout is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect: Duration,
        #[builder(default = DEFAULT_EVALUATE_TIMEOUT)] evaluate: Duration,
        #[builder(default = DEFAULT_ENDORSE_TIMEOUT)] endorse: Duration,
        #[builder(default = DEFAULT_SUBMIT_TIMEOUT)] submit: Duration,
        #[builder(default = DEFAULT_COMMIT_STATUS_TIMEOUT)] commit_status: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { connect, evaluate, endorse, submit, commit_status };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every timeout is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] naming the first zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("timeouts.connect", self.connect)?;
        ensure_positive("timeouts.evaluate", self.evaluate)?;
        ensure_positive("timeouts.endorse", self.endorse)?;
        ensure_positive("timeouts.submit", self.submit)?;
        ensure_positive("timeouts.commit_status", self.commit_status)
    }

    /// Connection handshake deadline.
    #[must_use]
    pub fn connect(&self) -> Duration {
        self.connect
    }

    /// Evaluate deadline.
    #[must_use]
    pub fn evaluate(&self) -> Duration {
        self.evaluate
    }

    /// Endorsement deadline.
    #[must_use]
    pub fn endorse(&self) -> Duration {
        self.endorse
    }

    /// Ordering hand-off deadline.
    #[must_use]
    pub fn submit(&self) -> Duration {
        self.submit
    }

    /// Commit status deadline.
    #[must_use]
    pub fn commit_status(&self) -> Duration {
        self.commit_status
    }
}

// ── Retry ──────────────────────────────────────────────────────────────

/// Retry policy for read-only evaluations.
///
/// Submits are never retried regardless of this policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retry.
    #[serde(default)]
    pub(crate) max_retries: u32,
    /// Backoff before the first retry; doubles each attempt.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub(crate) initial_backoff: Duration,
    /// Upper bound for the backoff before jitter.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub(crate) max_backoff: Duration,
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial_backoff` is zero or `max_backoff` is
    /// smaller than `initial_backoff`.
    #[builder]
    pub fn new(
        #[builder(default)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries, initial_backoff, max_backoff };
        config.validate()?;
        Ok(config)
    }

    /// Checks backoff bounds.
    ///
    /// # Errors
    ///
    /// See [`RetryConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("evaluate_retry.initial_backoff", self.initial_backoff)?;
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::BelowMinimum {
                field: "evaluate_retry.max_backoff",
                min: format!("{:?}", self.initial_backoff),
                value: format!("{:?}", self.max_backoff),
            });
        }
        Ok(())
    }

    /// Retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before the first retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Backoff cap.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

// ── Gateway ────────────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Directory holding one connection profile per organization.
    pub(crate) profile_dir: PathBuf,

    /// Profile file name template; `{org}` is replaced by the organization.
    #[serde(default = "default_profile_file_pattern")]
    pub(crate) profile_file_pattern: String,

    /// Directory of the file-system wallet.
    #[serde(default = "default_wallet_dir")]
    pub(crate) wallet_dir: PathBuf,

    /// Channel every session binds to.
    #[serde(default = "default_channel")]
    pub(crate) channel: String,

    /// Discovery options.
    #[serde(default)]
    pub(crate) discovery: DiscoveryConfig,

    /// Per-phase deadlines.
    #[serde(default)]
    pub(crate) timeouts: TimeoutConfig,

    /// Evaluate retry policy.
    #[serde(default)]
    pub(crate) evaluate_retry: RetryConfig,
}

#[bon::bon]
impl GatewayConfig {
    /// Creates a gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `channel` is empty
    /// - `profile_file_pattern` does not contain `{org}`
    /// - a nested timeout or retry setting is invalid
    #[builder]
    pub fn new(
        #[builder(into)] profile_dir: PathBuf,
        #[builder(into, default = DEFAULT_PROFILE_FILE_PATTERN.to_owned())]
        profile_file_pattern: String,
        #[builder(into, default = PathBuf::from(DEFAULT_WALLET_DIR))] wallet_dir: PathBuf,
        #[builder(into, default = DEFAULT_CHANNEL.to_owned())] channel: String,
        #[builder(default)] discovery: DiscoveryConfig,
        #[builder(default)] timeouts: TimeoutConfig,
        #[builder(default)] evaluate_retry: RetryConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            profile_dir,
            profile_file_pattern,
            wallet_dir,
            channel,
            discovery,
            timeouts,
            evaluate_retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration, typically one produced by deserialization.
    ///
    /// # Errors
    ///
    /// See [`GatewayConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Missing { field: "channel" });
        }
        if !self.profile_file_pattern.contains("{org}") {
            return Err(ConfigError::Invalid {
                field: "profile_file_pattern",
                reason: "must contain the {org} placeholder".into(),
            });
        }
        self.timeouts.validate()?;
        self.evaluate_retry.validate()
    }

    /// Profile directory.
    #[must_use]
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Profile file name template.
    #[must_use]
    pub fn profile_file_pattern(&self) -> &str {
        &self.profile_file_pattern
    }

    /// Wallet directory.
    #[must_use]
    pub fn wallet_dir(&self) -> &Path {
        &self.wallet_dir
    }

    /// Channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Discovery options.
    #[must_use]
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    /// Per-phase deadlines.
    #[must_use]
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Evaluate retry policy.
    #[must_use]
    pub fn evaluate_retry(&self) -> &RetryConfig {
        &self.evaluate_retry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::builder().profile_dir("profiles").build().unwrap();

        assert_eq!(config.channel(), "mychannel");
        assert_eq!(config.profile_file_pattern(), "connection-{org}.json");
        assert!(config.discovery().enabled);
        assert!(config.discovery().as_localhost);
        assert_eq!(config.timeouts().connect(), Duration::from_secs(5));
        assert_eq!(config.timeouts().evaluate(), Duration::from_secs(5));
        assert_eq!(config.timeouts().endorse(), Duration::from_secs(15));
        assert_eq!(config.timeouts().submit(), Duration::from_secs(5));
        assert_eq!(config.timeouts().commit_status(), Duration::from_secs(60));
        assert_eq!(config.evaluate_retry().max_retries(), 0);
        assert_eq!(config.wallet_dir(), Path::new("wallet"));
    }

    #[test]
    fn empty_channel_is_rejected() {
        let err = GatewayConfig::builder().profile_dir("p").channel("  ").build().unwrap_err();
        assert_eq!(err, ConfigError::Missing { field: "channel" });
    }

    #[test]
    fn pattern_without_placeholder_is_rejected() {
        let err = GatewayConfig::builder()
            .profile_dir("p")
            .profile_file_pattern("profile.json")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "profile_file_pattern", .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = TimeoutConfig::builder().submit(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, ConfigError::MustBePositive { field: "timeouts.submit", .. }));
    }

    #[test]
    fn max_backoff_below_initial_is_rejected() {
        let err = RetryConfig::builder()
            .initial_backoff(Duration::from_secs(1))
            .max_backoff(Duration::from_millis(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { .. }));
    }

    #[test]
    fn deserializes_humantime_durations() {
        let json = r#"{
            "profile_dir": "/etc/claimledger/profiles",
            "channel": "claims",
            "discovery": {"enabled": true, "asLocalhost": false},
            "timeouts": {"evaluate": "2s", "commit_status": "90s"},
            "evaluate_retry": {"max_retries": 2, "initial_backoff": "50ms"}
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.channel(), "claims");
        assert!(!config.discovery().as_localhost);
        assert_eq!(config.timeouts().evaluate(), Duration::from_secs(2));
        assert_eq!(config.timeouts().commit_status(), Duration::from_secs(90));
        assert_eq!(config.timeouts().endorse(), DEFAULT_ENDORSE_TIMEOUT);
        assert_eq!(config.evaluate_retry().max_retries(), 2);
        assert_eq!(config.evaluate_retry().initial_backoff(), Duration::from_millis(50));
        assert_eq!(config.evaluate_retry().max_backoff(), DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{"profile_dir": "p", "chanel": "typo"}"#;
        assert!(serde_json::from_str::<GatewayConfig>(json).is_err());
    }
}
