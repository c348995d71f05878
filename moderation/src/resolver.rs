//! Decision resolver: combines the local verdict with the optional AI
//! verdict into the final [`AnalysisResult`].
//!
//! AI failure is a value here, not an error: [`AiOutcome::Unavailable`]
//! resolves library-only and is recorded for observability.

use thiserror::Error;
use tracing::debug;

use crate::config::ModerationConfig;
use crate::types::{
    AiRecord, AnalysisMethod, AnalysisResult, LevelDisagreement, ModerationStatus, SeverityVerdict,
};

/// Why the AI adjudicator produced no usable verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiUnavailable {
    #[error("AI adjudicator timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("AI adjudicator transport failure: {0}")]
    Transport(String),

    #[error("AI adjudicator throttled: {0}")]
    Throttled(String),

    #[error("AI adjudicator returned a malformed verdict: {0}")]
    Malformed(String),

    #[error("AI adjudicator disabled")]
    Disabled,

    #[error("batch deadline exhausted before AI call")]
    DeadlineExhausted,
}

/// Result of the escalation step for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome {
    /// The policy kept the item library-only.
    NotRequested,
    Succeeded(SeverityVerdict),
    Unavailable(AiUnavailable),
}

#[derive(Debug, Clone)]
pub struct DecisionResolver {
    severity_threshold: f64,
    disagreement_confidence_cap: f64,
}

impl DecisionResolver {
    pub fn new(severity_threshold: f64, disagreement_confidence_cap: f64) -> Self {
        Self {
            severity_threshold,
            disagreement_confidence_cap,
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(
            config.severity_threshold,
            config.disagreement_confidence_cap,
        )
    }

    /// `flagged` at or above the threshold, `approved` below.
    pub fn status_for(&self, verdict: &SeverityVerdict) -> ModerationStatus {
        if verdict.score >= self.severity_threshold {
            ModerationStatus::Flagged
        } else {
            ModerationStatus::Approved
        }
    }

    pub fn resolve(&self, local: SeverityVerdict, ai: AiOutcome) -> AnalysisResult {
        let ai = match ai {
            AiOutcome::Succeeded(verdict) => match check_ai_verdict(&verdict) {
                Ok(()) => AiOutcome::Succeeded(verdict),
                Err(e) => AiOutcome::Unavailable(e),
            },
            other => other,
        };

        match ai {
            AiOutcome::NotRequested => {
                let status = self.status_for(&local);
                AnalysisResult::decided(library_only(local), status, AiRecord::NotRequested)
            }
            AiOutcome::Unavailable(reason) => {
                debug!(reason = %reason, "Resolving library-only after AI unavailable");
                let status = self.status_for(&local);
                AnalysisResult::decided(
                    library_only(local),
                    status,
                    AiRecord::Unavailable {
                        reason: reason.to_string(),
                    },
                )
            }
            AiOutcome::Succeeded(ai_verdict) => self.resolve_enhanced(local, ai_verdict),
        }
    }

    fn resolve_enhanced(&self, local: SeverityVerdict, mut ai: SeverityVerdict) -> AnalysisResult {
        let gap = local.level.distance(ai.level);
        let mut disagreement = None;

        ai.confidence = match gap {
            0 => local.confidence.max(ai.confidence),
            1 => ai.confidence,
            _ => {
                disagreement = Some(LevelDisagreement {
                    local_level: local.level,
                    ai_level: ai.level,
                    gap,
                });
                ai.confidence.min(self.disagreement_confidence_cap)
            }
        };

        if let Some(d) = &disagreement {
            ai.concerns.push(format!(
                "AI level {} differs from local level {} by {} levels",
                d.ai_level, d.local_level, d.gap
            ));
        }
        if ai.signals.is_empty() {
            ai.signals = local.signals;
        }

        let status = self.status_for(&ai);
        AnalysisResult::decided(
            ai,
            status,
            AiRecord::Enhanced {
                local_level: local.level,
                local_score: local.score,
                disagreement,
            },
        )
    }
}

fn library_only(mut verdict: SeverityVerdict) -> SeverityVerdict {
    verdict.method = AnalysisMethod::LibraryOnly;
    verdict
}

fn check_ai_verdict(verdict: &SeverityVerdict) -> Result<(), AiUnavailable> {
    if verdict.method != AnalysisMethod::AiEnhanced {
        return Err(AiUnavailable::Malformed(format!(
            "verdict method is {}, expected ai_enhanced",
            verdict.method
        )));
    }
    if !verdict.score.is_finite() || !verdict.confidence.is_finite() {
        return Err(AiUnavailable::Malformed("non-finite score".into()));
    }
    Ok(())
}
