//! Worker configuration.
//!
//! Loaded from an optional TOML file, then overridden by `MODERATION_*`
//! environment variables:
//!
//! | Variable                          | Field                           |
//! |-----------------------------------|---------------------------------|
//! | `MODERATION_AI_URL`               | adjudicator endpoint (enables)  |
//! | `MODERATION_AI_MODEL`             | adjudicator model               |
//! | `MODERATION_AI_API_KEY`           | adjudicator bearer token        |
//! | `MODERATION_AI_TIMEOUT_SECS`      | `ai_timeout_secs`               |
//! | `MODERATION_BATCH_DEADLINE_SECS`  | `batch_deadline_secs`           |
//! | `MODERATION_MAX_WORKERS`          | `max_workers`                   |
//! | `MODERATION_MAX_BATCH_SIZE`       | `max_batch_size`                |
//! | `MODERATION_FLAGGED_DIR`          | `flagged_dir`                   |
//! | `MODERATION_SEVERITY_THRESHOLD`   | `moderation.severity_threshold` |
//! | `MODERATION_AI_USAGE_THRESHOLD`   | `moderation.ai_usage_threshold` |
//! | `MODERATION_MAX_RETRIES`          | `moderation.max_retries`        |

use std::path::{Path, PathBuf};
use std::time::Duration;

use moderation::{ConfigError, ModerationConfig};
use serde::{Deserialize, Serialize};

use crate::errors::WorkerConfigError;

const DEFAULT_AI_MODEL: &str = "moderation-judge";

/// OpenAI-compatible chat endpoint used as the AI adjudicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicatorEndpoint {
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    DEFAULT_AI_MODEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub moderation: ModerationConfig,
    /// Items processed concurrently within one batch.
    pub max_workers: usize,
    pub ai_timeout_secs: u64,
    /// Overall budget for one batch run.
    pub batch_deadline_secs: u64,
    /// Requested batch sizes above this are clamped.
    pub max_batch_size: usize,
    /// `None` runs with the adjudicator disabled.
    pub adjudicator: Option<AdjudicatorEndpoint>,
    /// Root of the filesystem object store for flagged payloads.
    pub flagged_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            moderation: ModerationConfig::default(),
            max_workers: 8,
            ai_timeout_secs: 30,
            batch_deadline_secs: 240,
            max_batch_size: 200,
            adjudicator: None,
            flagged_dir: PathBuf::from("flagged-content"),
        }
    }
}

impl WorkerConfig {
    /// TOML file (if any), then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, WorkerConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, WorkerConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WorkerConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, WorkerConfigError> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    /// Apply `MODERATION_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), WorkerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MODERATION_AI_URL").filter(|u| !u.trim().is_empty()) {
            let previous = self.adjudicator.take();
            self.adjudicator = Some(AdjudicatorEndpoint {
                url,
                model: previous
                    .as_ref()
                    .map(|p| p.model.clone())
                    .unwrap_or_else(default_model),
                api_key: previous.and_then(|p| p.api_key),
            });
        }
        if let Some(endpoint) = self.adjudicator.as_mut() {
            if let Some(model) = lookup("MODERATION_AI_MODEL") {
                endpoint.model = model;
            }
            if let Some(key) = lookup("MODERATION_AI_API_KEY") {
                endpoint.api_key = Some(key);
            }
        }

        if let Some(v) = parsed(&lookup, "MODERATION_AI_TIMEOUT_SECS")? {
            self.ai_timeout_secs = v;
        }
        if let Some(v) = parsed(&lookup, "MODERATION_BATCH_DEADLINE_SECS")? {
            self.batch_deadline_secs = v;
        }
        if let Some(v) = parsed(&lookup, "MODERATION_MAX_WORKERS")? {
            self.max_workers = v;
        }
        if let Some(v) = parsed(&lookup, "MODERATION_MAX_BATCH_SIZE")? {
            self.max_batch_size = v;
        }
        if let Some(dir) = lookup("MODERATION_FLAGGED_DIR") {
            self.flagged_dir = PathBuf::from(dir);
        }
        if let Some(v) = parsed(&lookup, "MODERATION_SEVERITY_THRESHOLD")? {
            self.moderation.severity_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "MODERATION_AI_USAGE_THRESHOLD")? {
            self.moderation.ai_usage_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "MODERATION_MAX_RETRIES")? {
            self.moderation.max_retries = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.moderation.validate()?;
        if self.max_workers == 0 {
            return Err(ConfigError::Zero("max_workers"));
        }
        if self.ai_timeout_secs == 0 {
            return Err(ConfigError::Zero("ai_timeout_secs"));
        }
        if self.batch_deadline_secs == 0 {
            return Err(ConfigError::Zero("batch_deadline_secs"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Zero("max_batch_size"));
        }
        Ok(())
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs)
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, WorkerConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| WorkerConfigError::Env { var, value }),
    }
}
