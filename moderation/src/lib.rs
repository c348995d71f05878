//! Complaint Moderation Decision Core
//!
//! This library provides the deterministic half of the moderation pipeline:
//! - Complaint body extraction (plain text or the filed XML document)
//! - Signal extractors behind one capability trait, degrading on failure
//! - Weighted severity aggregation with configurable cut points
//! - Escalation policy deciding when an AI adjudicator is worth calling
//! - Decision resolution folding an optional AI verdict into the result
//! - Item lifecycle state machine and bounded retry policy
//!
//! No I/O happens here. The async worker crate owns fetching, the AI call,
//! persistence and notification.
//!
//! # Pipeline
//!
//! ```text
//! ComplaintItem.body
//!     │ extract_text
//!     ▼
//! profanity / pattern / sentiment ──> SeverityAggregator ──> SeverityVerdict (library_only)
//!                                                                 │
//!                                          EscalationPolicy ──────┤
//!                                                                 ▼
//!                                  AiOutcome ──> DecisionResolver ──> AnalysisResult
//! ```

pub mod body;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod lifecycle;
pub mod resolver;
pub mod severity;
pub mod signals;
pub mod types;

pub use config::ModerationConfig;
pub use engine::{LocalAssessment, ModerationEngine};
pub use error::{ConfigError, ExtractorError, ValidationError};

pub use escalation::{AmbiguityBand, EscalationDecision, EscalationPolicy, EscalationReason};
pub use lifecycle::{IllegalTransition, ItemLifecycle, RetryDecision, RetryPolicy, TransitionRecord};
pub use resolver::{AiOutcome, AiUnavailable, DecisionResolver};
pub use severity::{Aggregate, SeverityAggregator};
pub use signals::{
    PatternScanner, ProfanityClassifier, SentimentScorer, SignalExtractor, SignalSet,
};

pub use types::{
    AiRecord, AnalysisMethod, AnalysisResult, ComplaintId, ComplaintItem, ComplaintMetadata,
    LevelDisagreement, ModerationStatus, Priority, SeverityLevel, SeverityVerdict,
    SignalAvailability, SignalScore, StatusFilter,
};
