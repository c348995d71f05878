//! Moderation engine: the synchronous decision pipeline for one item.
//!
//! ```text
//! raw body ─> extract_text ─> signals ─> aggregate ─> escalation decision
//!                                                         │
//!                          AiOutcome (from the caller) ───┴─> resolve ─> AnalysisResult
//! ```
//!
//! The AI call itself happens outside: the engine says whether to make it
//! and folds in whatever came back.

use tracing::debug;

use crate::body::extract_text;
use crate::config::ModerationConfig;
use crate::error::{ConfigError, ValidationError};
use crate::escalation::{EscalationDecision, EscalationPolicy};
use crate::lifecycle::RetryPolicy;
use crate::resolver::{AiOutcome, AiUnavailable, DecisionResolver};
use crate::severity::{describe_signals, local_confidence, SeverityAggregator};
use crate::signals::SignalSet;
use crate::types::{AnalysisMethod, AnalysisResult, SeverityLevel, SeverityVerdict};

/// Local verdict plus the escalation decision taken on it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAssessment {
    pub verdict: SeverityVerdict,
    pub escalation: EscalationDecision,
}

pub struct ModerationEngine {
    config: ModerationConfig,
    signals: SignalSet,
    aggregator: SeverityAggregator,
    policy: EscalationPolicy,
    resolver: DecisionResolver,
    retry: RetryPolicy,
}

impl ModerationEngine {
    /// Validate `config` and build the extractor set it names.
    pub fn from_config(config: ModerationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let signals = SignalSet::from_config(&config)?;
        Ok(Self::assemble(config, signals))
    }

    /// Use an explicit extractor set instead of the configured one.
    pub fn with_signals(config: ModerationConfig, signals: SignalSet) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config, signals))
    }

    fn assemble(config: ModerationConfig, signals: SignalSet) -> Self {
        debug!(
            extractors = ?signals.names(),
            threshold = config.severity_threshold,
            "Moderation engine ready"
        );
        Self {
            aggregator: SeverityAggregator::from_config(&config),
            policy: EscalationPolicy::from_config(&config),
            resolver: DecisionResolver::from_config(&config),
            retry: RetryPolicy::new(config.max_retries),
            signals,
            config,
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// The text to score, or why this body cannot be moderated.
    pub fn prepare_text(&self, raw_body: &str) -> Result<String, ValidationError> {
        extract_text(
            raw_body,
            self.config.min_text_chars,
            self.config.max_text_bytes,
        )
    }

    /// Run the extractors and aggregate into a library-only verdict.
    pub fn local_verdict(&self, text: &str) -> SeverityVerdict {
        let signals = self.signals.extract(text);
        let aggregate = self.aggregator.aggregate(&signals);
        let confidence = local_confidence(
            aggregate.score,
            self.config.severity_threshold,
            aggregate.coverage,
        );
        let concerns = describe_signals(&signals);

        SeverityVerdict {
            score: aggregate.score,
            level: aggregate.level,
            signals,
            method: AnalysisMethod::LibraryOnly,
            confidence,
            concerns,
        }
    }

    pub fn assess(&self, text: &str, force_ai: bool) -> LocalAssessment {
        let verdict = self.local_verdict(text);
        let escalation = self.policy.evaluate(&verdict, force_ai);
        debug!(
            score = verdict.score,
            level = %verdict.level,
            escalate = escalation.escalate,
            "Local assessment"
        );
        LocalAssessment {
            verdict,
            escalation,
        }
    }

    pub fn should_escalate(&self, score: f64, level: SeverityLevel, force_ai: bool) -> bool {
        self.policy.should_escalate(score, level, force_ai)
    }

    pub fn resolve(&self, local: SeverityVerdict, ai: AiOutcome) -> AnalysisResult {
        self.resolver.resolve(local, ai)
    }

    /// Whole pipeline with no AI available: validation, scoring and
    /// resolution.
    pub fn analyze_library_only(&self, raw_body: &str) -> Result<AnalysisResult, ValidationError> {
        let text = self.prepare_text(raw_body)?;
        let assessment = self.assess(&text, false);
        let ai = if assessment.escalation.escalate {
            AiOutcome::Unavailable(AiUnavailable::Disabled)
        } else {
            AiOutcome::NotRequested
        };
        Ok(self.resolve(assessment.verdict, ai))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AiRecord, ModerationStatus};

    fn engine() -> ModerationEngine {
        ModerationEngine::from_config(ModerationConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ModerationConfig {
            severity_threshold: -0.1,
            ..Default::default()
        };
        assert!(ModerationEngine::from_config(config).is_err());
    }

    #[test]
    fn test_clean_text_is_approved() {
        let result = engine()
            .analyze_library_only("Thanks for the quick help!")
            .unwrap();
        assert_eq!(result.status, ModerationStatus::Approved);
        assert_eq!(result.level(), Some(SeverityLevel::None));
        assert_eq!(result.ai, AiRecord::NotRequested);
    }

    #[test]
    fn test_insult_is_flagged_without_escalation() {
        let e = engine();
        let assessment = e.assess(
            "You are a worthless idiot and your company is garbage",
            false,
        );
        assert_eq!(assessment.verdict.level, SeverityLevel::Critical);
        assert!(!assessment.escalation.escalate);
        assert!(!assessment.verdict.concerns.is_empty());
    }

    #[test]
    fn test_validation_error_surfaces() {
        assert!(matches!(
            engine().analyze_library_only("hey"),
            Err(ValidationError::TooShort { .. })
        ));
    }

    #[test]
    fn test_local_confidence_reflects_coverage() {
        let verdict = engine().local_verdict("Thanks for the quick help!");
        // score 0 sits as far from the threshold as possible
        assert!((verdict.confidence - 1.0).abs() < 1e-12);
    }
}
