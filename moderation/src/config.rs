//! Moderation decision configuration.
//!
//! Every numeric knob of the pipeline lives here; nothing in the core
//! hard-codes weights or cut points.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::signals::KNOWN_EXTRACTORS;

/// Decision-engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Width of the ambiguity band around `severity_threshold`.
    pub ai_usage_threshold: f64,
    /// Flag cut-point: severity at or above this is flagged.
    pub severity_threshold: f64,
    /// Maximum retries before an item fails.
    pub max_retries: u32,
    /// Extractor name → aggregation weight. Keys also select the active set.
    pub extractor_weights: BTreeMap<String, f64>,
    /// Cut points mapping [0,1] into NONE / LOW / MEDIUM / HIGH / CRITICAL.
    pub level_thresholds: [f64; 4],
    /// Spread between available signal scores that counts as disagreement.
    pub disagreement_margin: f64,
    pub escalate_on_disagreement: bool,
    pub escalate_on_degraded: bool,
    /// Confidence ceiling when local and AI levels are more than one apart.
    pub disagreement_confidence_cap: f64,
    /// Minimum characters of extracted text.
    pub min_text_chars: usize,
    /// Text beyond this many bytes is not scored.
    pub max_text_bytes: usize,
    /// Additional curated terms for the pattern scanner.
    pub extra_terms: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        let mut extractor_weights = BTreeMap::new();
        extractor_weights.insert("profanity".to_string(), 0.40);
        extractor_weights.insert("pattern".to_string(), 0.35);
        extractor_weights.insert("sentiment".to_string(), 0.25);

        Self {
            ai_usage_threshold: 0.30,
            severity_threshold: 0.50,
            max_retries: 3,
            extractor_weights,
            level_thresholds: [0.10, 0.30, 0.50, 0.75],
            disagreement_margin: 0.5,
            escalate_on_disagreement: false,
            escalate_on_degraded: false,
            disagreement_confidence_cap: 0.5,
            min_text_chars: 5,
            max_text_bytes: 64 * 1024,
            extra_terms: Vec::new(),
        }
    }
}

impl ModerationConfig {
    /// Parse from TOML; missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("ai_usage_threshold", self.ai_usage_threshold)?;
        unit_interval("severity_threshold", self.severity_threshold)?;
        unit_interval("disagreement_margin", self.disagreement_margin)?;
        unit_interval(
            "disagreement_confidence_cap",
            self.disagreement_confidence_cap,
        )?;

        let t = self.level_thresholds;
        let increasing = t.windows(2).all(|w| w[0] < w[1]);
        if !increasing || t.iter().any(|c| !c.is_finite() || *c <= 0.0 || *c > 1.0) {
            return Err(ConfigError::LevelThresholds(t));
        }

        let mut total = 0.0;
        for (name, weight) in &self.extractor_weights {
            if !KNOWN_EXTRACTORS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownExtractor(name.clone()));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name: name.clone(),
                    weight: *weight,
                });
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(ConfigError::NoActiveExtractors);
        }

        if self.max_text_bytes == 0 {
            return Err(ConfigError::Zero("max_text_bytes"));
        }

        Ok(())
    }

    /// Half-width of the ambiguity band.
    pub fn band_margin(&self) -> f64 {
        self.ai_usage_threshold / 2.0
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
