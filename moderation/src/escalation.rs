//! Escalation policy: deterministic decision on whether to call the AI
//! adjudicator.
//!
//! Local signals are trusted when the score is clear-cut. Only items inside
//! the ambiguity band around the flag threshold (or explicitly forced) pay
//! for an AI call.
//!
//! ```text
//! 0.0 ──────── lower ════ threshold ════ upper ──────── 1.0
//!   library-only │     ambiguity band     │  library-only
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ModerationConfig;
use crate::types::{SeverityLevel, SeverityVerdict};

/// Scores within this distance of a band edge count as on the edge.
const BAND_TOLERANCE: f64 = 1e-9;

/// Inclusive severity range where local signals are least trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityBand {
    pub lower: f64,
    pub upper: f64,
}

impl AmbiguityBand {
    /// `threshold ± margin`, clipped to [0, 1].
    pub fn around(threshold: f64, margin: f64) -> Self {
        Self {
            lower: (threshold - margin).max(0.0),
            upper: (threshold + margin).min(1.0),
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.lower - BAND_TOLERANCE && score <= self.upper + BAND_TOLERANCE
    }
}

impl fmt::Display for AmbiguityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.lower, self.upper)
    }
}

/// Why an item was escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The invocation asked for AI analysis on every item.
    Forced,
    /// Score inside the ambiguity band.
    AmbiguousScore { score: f64 },
    /// Available extractors disagree by at least the configured margin.
    SignalDisagreement { spread: f64 },
    /// One or more extractors degraded to unavailable.
    DegradedSignals { extractors: Vec<String> },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "AI analysis forced"),
            Self::AmbiguousScore { score } => {
                write!(f, "score {score:.3} inside ambiguity band")
            }
            Self::SignalDisagreement { spread } => {
                write!(f, "signals disagree (spread {spread:.3})")
            }
            Self::DegradedSignals { extractors } => {
                write!(f, "degraded extractors: {}", extractors.join(", "))
            }
        }
    }
}

/// Decision produced by [`EscalationPolicy::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// Whether the AI adjudicator should be called.
    pub escalate: bool,
    /// Every trigger that fired; empty when not escalating.
    pub reasons: Vec<EscalationReason>,
    /// The band the score was checked against.
    pub band: AmbiguityBand,
}

impl EscalationDecision {
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return format!("library-only (outside band {})", self.band);
        }
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    band: AmbiguityBand,
    disagreement_margin: f64,
    escalate_on_disagreement: bool,
    escalate_on_degraded: bool,
}

impl EscalationPolicy {
    pub fn from_config(config: &ModerationConfig) -> Self {
        Self {
            band: AmbiguityBand::around(config.severity_threshold, config.band_margin()),
            disagreement_margin: config.disagreement_margin,
            escalate_on_disagreement: config.escalate_on_disagreement,
            escalate_on_degraded: config.escalate_on_degraded,
        }
    }

    pub fn band(&self) -> AmbiguityBand {
        self.band
    }

    /// Core rule: forced, or in-band and not clear-cut.
    pub fn should_escalate(&self, score: f64, level: SeverityLevel, force_ai: bool) -> bool {
        force_ai || (self.band.contains(score) && !is_clear_cut(level))
    }

    /// Full decision with the reasons behind it.
    ///
    /// With the optional triggers disabled this agrees exactly with
    /// [`should_escalate`](Self::should_escalate).
    pub fn evaluate(&self, verdict: &SeverityVerdict, force_ai: bool) -> EscalationDecision {
        let mut reasons = Vec::new();
        let clear_cut = is_clear_cut(verdict.level);

        if force_ai {
            reasons.push(EscalationReason::Forced);
        }

        if !clear_cut && self.band.contains(verdict.score) {
            reasons.push(EscalationReason::AmbiguousScore {
                score: verdict.score,
            });
        }

        if !clear_cut && self.escalate_on_disagreement {
            if let Some(spread) = signal_spread(verdict) {
                if spread >= self.disagreement_margin {
                    reasons.push(EscalationReason::SignalDisagreement { spread });
                }
            }
        }

        if !clear_cut && self.escalate_on_degraded {
            let degraded = verdict.unavailable_signals();
            if !degraded.is_empty() {
                reasons.push(EscalationReason::DegradedSignals {
                    extractors: degraded.into_iter().map(String::from).collect(),
                });
            }
        }

        EscalationDecision {
            escalate: !reasons.is_empty(),
            reasons,
            band: self.band,
        }
    }
}

/// NONE and CRITICAL are never worth a second opinion unless forced.
fn is_clear_cut(level: SeverityLevel) -> bool {
    matches!(level, SeverityLevel::None | SeverityLevel::Critical)
}

/// Max minus min of available scores; `None` with fewer than two.
fn signal_spread(verdict: &SeverityVerdict) -> Option<f64> {
    let scores: Vec<f64> = verdict
        .signals
        .iter()
        .filter(|s| s.is_available())
        .map(|s| s.score)
        .collect();
    if scores.len() < 2 {
        return None;
    }
    let max = scores.iter().copied().fold(f64::MIN, f64::max);
    let min = scores.iter().copied().fold(f64::MAX, f64::min);
    Some(max - min)
}
