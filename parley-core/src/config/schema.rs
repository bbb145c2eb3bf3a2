//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for parley
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Active session settings
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Context window settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Archive settings
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Generation collaborator
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Retrieval collaborator
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Upper bound for session durations (one year)
pub const MAX_SESSION_SECONDS: u64 = 365 * 24 * 3600;

/// Active session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle seconds after which a session expires
    #[serde(default = "default_expiry_seconds")]
    pub expiry_seconds: u64,
    /// Maximum number of live sessions, 0 for unbounded
    #[serde(default)]
    pub max_active: usize,
    /// Seconds an expired entry is retained by the store so it can still be archived
    #[serde(default = "default_retention_grace")]
    pub retention_grace_seconds: u64,
    /// Proactive expiry sweep
    #[serde(default)]
    pub sweep: SweepConfig,
}

fn default_expiry_seconds() -> u64 {
    1800
}

fn default_retention_grace() -> u64 {
    3600
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: default_expiry_seconds(),
            max_active: 0,
            retention_grace_seconds: default_retention_grace(),
            sweep: SweepConfig::default(),
        }
    }
}

impl SessionsConfig {
    /// Expiry window as a chrono duration, capped at [`MAX_SESSION_SECONDS`]
    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_seconds.min(MAX_SESSION_SECONDS) as i64)
    }

    /// Physical retention handed to the backing store; each part is capped
    /// at [`MAX_SESSION_SECONDS`]
    pub fn retention(&self) -> chrono::Duration {
        let grace = self.retention_grace_seconds.min(MAX_SESSION_SECONDS);
        self.expiry() + chrono::Duration::seconds(grace as i64)
    }
}

/// Expiry sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the background sweep runs
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_s: u64,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: default_sweep_interval(),
        }
    }
}

/// Context window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Prior turns carried into the window
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Character budget for carried history, 0 for unbounded
    #[serde(default)]
    pub max_history_chars: usize,
    /// Candidates fetched from retrieval
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Candidates kept in the window
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    /// Floor of the relevance threshold
    #[serde(default = "default_min_relevance")]
    pub min_relevance_score: f32,
}

fn default_max_history_turns() -> usize {
    10
}

fn default_retrieval_k() -> usize {
    10
}

fn default_context_k() -> usize {
    7
}

fn default_min_relevance() -> f32 {
    0.6
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            max_history_chars: 0,
            retrieval_k: default_retrieval_k(),
            context_k: default_context_k(),
            min_relevance_score: default_min_relevance(),
        }
    }
}

/// Archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory receiving archive records
    #[serde(default = "default_archive_destination")]
    pub destination: String,
}

fn default_archive_destination() -> String {
    "~/.parley/archives".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            destination: default_archive_destination(),
        }
    }
}

impl ArchiveConfig {
    /// Destination with a leading `~` expanded
    pub fn destination_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.destination)
    }
}

/// Generation collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the model server
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Seconds before a generation call is abandoned
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gpt-oss:20b".to_string()
}

fn default_max_tokens() -> u32 {
    750
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.7
}

fn default_generation_timeout() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

/// Retrieval collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Retrieval service URL; empty disables retrieval
    #[serde(default)]
    pub endpoint: String,
    /// Seconds before a retrieval call is abandoned
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_retrieval_timeout() -> u64 {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl RetrievalConfig {
    /// Whether a retrieval service is configured
    pub fn is_enabled(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}
