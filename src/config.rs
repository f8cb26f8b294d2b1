use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LearningOsError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MIN_REQUEST_INTERVAL_SECS: u64 = 4;
const DEFAULT_REQUESTS_PER_MINUTE: usize = 15;
const DEFAULT_CHUNK_DELAY_SECS: u64 = 2;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub min_request_interval_secs: Option<u64>,
    pub requests_per_minute: Option<usize>,
    pub chunk_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub gemini: Option<GeminiConfig>,
    pub limits: Option<LimitsConfig>,
    pub storage: Option<StorageConfig>,
}

/// Limits with every default applied, ready to hand to the gate and planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub min_request_interval: Duration,
    pub requests_per_minute: usize,
    pub chunk_delay: Duration,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            LearningOsError::Config(format!("failed to read {}: {e}", path.to_string_lossy()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            LearningOsError::Config(format!("failed to parse {}: {e}", path.to_string_lossy()))
        })
    }

    /// Loads the config file when present, otherwise falls back to defaults
    /// so a bare environment-variable setup still works.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Explicit config value first, then the GEMINI_API_KEY environment
    /// variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self
            .gemini
            .as_ref()
            .and_then(|g| g.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
        {
            return Ok(key.to_string());
        }

        std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                LearningOsError::Config(
                    "GEMINI_API_KEY not found; set it in the config file or environment"
                        .to_string(),
                )
            })
    }

    pub fn model(&self) -> String {
        self.gemini
            .as_ref()
            .and_then(|g| g.model.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn base_url(&self) -> String {
        self.gemini
            .as_ref()
            .and_then(|g| g.base_url.clone())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn sqlite_path(&self) -> String {
        self.storage
            .as_ref()
            .and_then(|s| s.sqlite_path.clone())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(crate::runtime_paths::default_db_path)
    }

    pub fn limits(&self) -> ResolvedLimits {
        let limits = self.limits.clone().unwrap_or_default();
        ResolvedLimits {
            min_request_interval: Duration::from_secs(
                limits
                    .min_request_interval_secs
                    .unwrap_or(DEFAULT_MIN_REQUEST_INTERVAL_SECS),
            ),
            requests_per_minute: limits
                .requests_per_minute
                .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE),
            chunk_delay: Duration::from_secs(
                limits.chunk_delay_secs.unwrap_or(DEFAULT_CHUNK_DELAY_SECS),
            ),
        }
    }
}
