//! Severity aggregation: weighted combination of available signal scores.
//!
//! Weights are renormalised over the extractors that actually produced a
//! score, so a degraded extractor does not silently pull severity down.

use std::collections::BTreeMap;

use crate::config::ModerationConfig;
use crate::types::{SeverityLevel, SignalScore};

/// Output of [`SeverityAggregator::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub score: f64,
    pub level: SeverityLevel,
    /// Share of configured weight that was available, in [0,1].
    pub coverage: f64,
}

#[derive(Debug, Clone)]
pub struct SeverityAggregator {
    weights: BTreeMap<String, f64>,
    cut_points: [f64; 4],
}

impl SeverityAggregator {
    pub fn new(weights: BTreeMap<String, f64>, cut_points: [f64; 4]) -> Self {
        Self {
            weights,
            cut_points,
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.extractor_weights.clone(), config.level_thresholds)
    }

    pub fn aggregate(&self, scores: &[SignalScore]) -> Aggregate {
        let total_weight: f64 = self.weights.values().sum();

        let mut weighted = 0.0;
        let mut present = 0.0;
        for signal in scores.iter().filter(|s| s.is_available()) {
            let weight = self.weight(&signal.producer);
            weighted += weight * signal.score;
            present += weight;
        }

        let score = if present > 0.0 {
            (weighted / present).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let coverage = if total_weight > 0.0 {
            (present / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Aggregate {
            score,
            level: self.level_for(score),
            coverage,
        }
    }

    /// Level for a score. A score equal to a cut point takes the higher level.
    pub fn level_for(&self, score: f64) -> SeverityLevel {
        let passed = self.cut_points.iter().filter(|c| score >= **c).count();
        SeverityLevel::from_rank(passed)
    }

    fn weight(&self, producer: &str) -> f64 {
        self.weights.get(producer).copied().unwrap_or(0.0)
    }
}

/// Confidence of a local verdict.
///
/// Half confidence at the flag threshold, rising to full at either end of
/// the scale, scaled by how much of the signal weight was available.
pub fn local_confidence(score: f64, severity_threshold: f64, coverage: f64) -> f64 {
    let room = if score >= severity_threshold {
        1.0 - severity_threshold
    } else {
        severity_threshold
    };
    let decisiveness = if room > 0.0 {
        ((score - severity_threshold).abs() / room).min(1.0)
    } else {
        1.0
    };
    ((0.5 + 0.5 * decisiveness) * coverage).clamp(0.0, 1.0)
}

/// One human-readable line per signal that contributed or degraded.
pub fn describe_signals(scores: &[SignalScore]) -> Vec<String> {
    scores
        .iter()
        .filter_map(|s| {
            if !s.is_available() {
                return Some(format!("{} extractor unavailable", s.producer));
            }
            if s.score <= 0.0 {
                return None;
            }
            Some(if s.matched_terms.is_empty() {
                format!("{} score {:.2}", s.producer, s.score)
            } else {
                format!(
                    "{} score {:.2} ({} term(s): {})",
                    s.producer,
                    s.score,
                    s.matched_terms.len(),
                    s.matched_terms
                        .iter()
                        .take(3)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
        })
        .collect()
}
