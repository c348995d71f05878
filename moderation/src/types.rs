//! Core data model: complaint items, signal scores, verdicts and results.
//!
//! Everything here is plain data. Serialization happens only at the storage
//! and notification boundaries, never inside the decision pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a complaint in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplaintId(String);

impl ComplaintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComplaintId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ComplaintId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ComplaintId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Handling priority assigned by the submitting system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Fetch ordering rank (lower is fetched first).
    pub fn rank(self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Urgent => write!(f, "urgent"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Free-form metadata attached to a complaint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Anything else the store carries along.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Moderation status of an item. These are also the lifecycle states.
///
/// `Pending` and the four outcomes are stable. `Processing` only exists
/// while a batch holds the claim and is never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Processing,
    Approved,
    Flagged,
    Retry,
    Failed,
}

impl ModerationStatus {
    /// Terminal for the automated pipeline.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Flagged | Self::Failed)
    }

    /// Whether a batch may claim an item in this status.
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Approved => write!(f, "approved"),
            Self::Flagged => write!(f, "flagged"),
            Self::Retry => write!(f, "retry"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "approved" => Ok(Self::Approved),
            "flagged" => Ok(Self::Flagged),
            "retry" => Ok(Self::Retry),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown moderation status '{other}'")),
        }
    }
}

/// Which items a batch run asks the store for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    Pending,
    Retry,
    /// Every claimable item (pending and retry).
    All,
}

impl StatusFilter {
    pub fn matches(self, status: ModerationStatus) -> bool {
        match self {
            Self::Pending => status == ModerationStatus::Pending,
            Self::Retry => status == ModerationStatus::Retry,
            Self::All => status.is_claimable(),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Retry => write!(f, "retry"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A complaint as handed over by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintItem {
    pub id: ComplaintId,
    /// Raw body: plain text or the XML document the complaint was filed as.
    pub body: String,
    #[serde(default)]
    pub metadata: ComplaintMetadata,
    #[serde(default)]
    pub status: ModerationStatus,
    /// Retry count carried by the latest persisted result.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ComplaintItem {
    /// A fresh pending item with default metadata.
    pub fn pending(id: impl Into<ComplaintId>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            metadata: ComplaintMetadata::default(),
            status: ModerationStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Discrete severity derived from the [0,1] severity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub const ALL: [SeverityLevel; 5] = [
        Self::None,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Level for a rank; ranks past CRITICAL saturate.
    pub fn from_rank(rank: usize) -> Self {
        Self::ALL[rank.min(Self::ALL.len() - 1)]
    }

    /// Number of levels between `self` and `other`.
    pub fn distance(self, other: SeverityLevel) -> u8 {
        self.rank().abs_diff(other.rank())
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown severity level '{other}'")),
        }
    }
}

/// How the final verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    LibraryOnly,
    AiEnhanced,
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryOnly => write!(f, "library_only"),
            Self::AiEnhanced => write!(f, "ai_enhanced"),
        }
    }
}

/// Whether an extractor actually produced its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SignalAvailability {
    Available,
    /// The extractor failed internally; its score is a placeholder zero.
    Unavailable { reason: String },
}

/// Output of one signal extractor for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Extractor name (`profanity`, `pattern`, `sentiment`, ...).
    pub producer: String,
    /// Score in [0,1].
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
    pub availability: SignalAvailability,
}

impl SignalScore {
    pub fn available(producer: &str, score: f64, matched_terms: Vec<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            producer: producer.to_string(),
            score,
            matched_terms,
            availability: SignalAvailability::Available,
        }
    }

    pub fn unavailable(producer: &str, reason: impl Into<String>) -> Self {
        Self {
            producer: producer.to_string(),
            score: 0.0,
            matched_terms: Vec::new(),
            availability: SignalAvailability::Unavailable {
                reason: reason.into(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability == SignalAvailability::Available
    }
}

/// Aggregated severity assessment, local or AI-produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityVerdict {
    /// Severity score in [0,1].
    pub score: f64,
    pub level: SeverityLevel,
    /// Signal scores that went into the verdict.
    #[serde(default)]
    pub signals: Vec<SignalScore>,
    pub method: AnalysisMethod,
    /// Confidence in [0,1].
    pub confidence: f64,
    /// Human-readable reasons behind the score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concerns: Vec<String>,
}

impl SeverityVerdict {
    /// Verdict returned by an AI adjudicator.
    pub fn ai_enhanced(
        score: f64,
        level: SeverityLevel,
        confidence: f64,
        concerns: Vec<String>,
    ) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            level,
            signals: Vec::new(),
            method: AnalysisMethod::AiEnhanced,
            confidence: confidence.clamp(0.0, 1.0),
            concerns,
        }
    }

    /// Names of extractors that degraded to "unavailable".
    pub fn unavailable_signals(&self) -> Vec<&str> {
        self.signals
            .iter()
            .filter(|s| !s.is_available())
            .map(|s| s.producer.as_str())
            .collect()
    }
}

/// Level disagreement between the local and AI verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDisagreement {
    pub local_level: SeverityLevel,
    pub ai_level: SeverityLevel,
    /// Distance in levels; always greater than one when recorded.
    pub gap: u8,
}

/// What happened with the AI adjudicator for this attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AiRecord {
    #[default]
    NotRequested,
    Enhanced {
        local_level: SeverityLevel,
        local_score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disagreement: Option<LevelDisagreement>,
    },
    /// Escalated, but the adjudicator could not answer; resolved library-only.
    Unavailable { reason: String },
}

/// Persisted record of one processing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Absent when the attempt failed before a verdict existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<SeverityVerdict>,
    pub status: ModerationStatus,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub ai: AiRecord,
    /// Object store reference for flagged payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<String>,
}

const UNSPECIFIED_FAILURE: &str = "unspecified failure";

impl AnalysisResult {
    /// Result of a completed decision (`approved` or `flagged`).
    pub fn decided(verdict: SeverityVerdict, status: ModerationStatus, ai: AiRecord) -> Self {
        Self {
            verdict: Some(verdict),
            status,
            timestamp: Utc::now(),
            retry_count: 0,
            error: None,
            ai,
            payload_ref: None,
        }
    }

    /// Result of a failed attempt (`retry` or `failed`). The error reason is
    /// never empty.
    pub fn unsuccessful(status: ModerationStatus, retry_count: u32, reason: &str) -> Self {
        let reason = if reason.trim().is_empty() {
            UNSPECIFIED_FAILURE.to_string()
        } else {
            reason.to_string()
        };
        Self {
            verdict: None,
            status,
            timestamp: Utc::now(),
            retry_count,
            error: Some(reason),
            ai: AiRecord::NotRequested,
            payload_ref: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_payload_ref(mut self, payload_ref: impl Into<String>) -> Self {
        self.payload_ref = Some(payload_ref.into());
        self
    }

    pub fn method(&self) -> Option<AnalysisMethod> {
        self.verdict.as_ref().map(|v| v.method)
    }

    pub fn level(&self) -> Option<SeverityLevel> {
        self.verdict.as_ref().map(|v| v.level)
    }
}
