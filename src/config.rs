//! Runtime configuration, read once from the process environment.

use crate::{AtelierError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Credential for the classifier endpoint. Required.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const LOG_LEVEL_VAR: &str = "ATELIER_LOG_LEVEL";
pub const LOG_FILE_VAR: &str = "ATELIER_LOG_FILE";
pub const MODEL_VAR: &str = "ATELIER_MODEL";

pub const DEFAULT_LOG_FILE: &str = "atelier.log";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

/// Characters of combined stdout/stderr kept per agent
pub const OUTPUT_BUFFER_CHARS: usize = 2000;
/// Characters mirrored into `AgentStatus::last_output`
pub const LAST_OUTPUT_CHARS: usize = 500;
/// Characters of output the status classifier ever sends to the model
pub const CLASSIFIER_WINDOW_CHARS: usize = 500;

pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_millis(3000);
/// Longest a single classifier call may take before it counts as failed
pub const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);

pub const STATUS_MAX_TOKENS: u32 = 256;
pub const INPUT_MAX_TOKENS: u32 = 1024;

/// Log verbosity accepted in `ATELIER_LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Unknown values fall back to `Debug`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub log_level: LogLevel,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                AtelierError::Config(format!(
                    "{} is not set. Export your API key before starting atelier.",
                    API_KEY_VAR
                ))
            })?;

        let log_level = lookup(LOG_LEVEL_VAR)
            .map(|v| LogLevel::parse(&v))
            .unwrap_or_default();

        let log_file = lookup(LOG_FILE_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        let model = lookup(MODEL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            api_key,
            model,
            log_level,
            log_file,
        })
    }
}
