//! Batch summary and AI usage accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moderation::{AiRecord, AnalysisMethod, ComplaintId, SeverityLevel, StatusFilter};
use serde::{Deserialize, Serialize};

/// Final disposition of one fetched item within a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Approved,
    Flagged,
    Retry,
    Failed,
    /// Duplicate id within the fetched batch.
    Skipped,
    /// Deadline hit before a result was committed; claim released.
    Abandoned,
    /// No result could be written; the item stays re-fetchable.
    Unpersisted,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Flagged => write!(f, "flagged"),
            Self::Retry => write!(f, "retry"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Unpersisted => write!(f, "unpersisted"),
        }
    }
}

/// What the batch did with one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_id: ComplaintId,
    pub outcome: ItemOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AnalysisMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<SeverityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<String>,
    pub elapsed_ms: u64,
}

impl ItemReport {
    pub fn bare(item_id: ComplaintId, outcome: ItemOutcome) -> Self {
        Self {
            item_id,
            outcome,
            method: None,
            level: None,
            score: None,
            retry_count: 0,
            error: None,
            payload_ref: None,
            elapsed_ms: 0,
        }
    }
}

/// AI adjudicator usage, shared by every item task of a batch.
#[derive(Debug, Default)]
pub struct AiUsage {
    attempted: AtomicU64,
    enhanced: AtomicU64,
    unavailable: AtomicU64,
}

impl AiUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one resolved attempt. `called` is false when no request
    /// left the process (not escalated, disabled, or out of time).
    pub fn record(&self, called: bool, ai: &AiRecord) {
        if called {
            self.attempted.fetch_add(1, Ordering::Relaxed);
        }
        match ai {
            AiRecord::NotRequested => {}
            AiRecord::Enhanced { .. } => {
                self.enhanced.fetch_add(1, Ordering::Relaxed);
            }
            AiRecord::Unavailable { .. } => {
                self.unavailable.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> AiUsageSnapshot {
        AiUsageSnapshot {
            calls_attempted: self.attempted.load(Ordering::Relaxed),
            enhanced: self.enhanced.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiUsageSnapshot {
    pub calls_attempted: u64,
    pub enhanced: u64,
    pub unavailable: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub approved: usize,
    pub flagged: usize,
    pub retry: usize,
    pub failed: usize,
    pub skipped: usize,
    pub abandoned: usize,
    pub unpersisted: usize,
}

impl OutcomeCounts {
    pub fn tally(reports: &[ItemReport]) -> Self {
        let mut counts = Self::default();
        for report in reports {
            match report.outcome {
                ItemOutcome::Approved => counts.approved += 1,
                ItemOutcome::Flagged => counts.flagged += 1,
                ItemOutcome::Retry => counts.retry += 1,
                ItemOutcome::Failed => counts.failed += 1,
                ItemOutcome::Skipped => counts.skipped += 1,
                ItemOutcome::Abandoned => counts.abandoned += 1,
                ItemOutcome::Unpersisted => counts.unpersisted += 1,
            }
        }
        counts
    }

    pub fn resolved(&self) -> usize {
        self.approved + self.flagged
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_duration_ms: u64,
    pub avg_ms_per_item: f64,
    pub items_per_minute: f64,
}

/// The configuration a batch ran with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEcho {
    pub requested_batch_size: usize,
    pub effective_batch_size: usize,
    pub status_filter: StatusFilter,
    pub force_ai_analysis: bool,
    pub adjudicator: String,
    pub severity_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// One report per fetched item, in fetch order.
    pub outcomes: Vec<ItemReport>,
    pub counts: OutcomeCounts,
    pub ai_usage: AiUsageSnapshot,
    /// Resolved items decided from local signals alone.
    pub library_only: usize,
    /// Percent of resolved items decided library-only.
    pub efficiency_rate: f64,
    /// Percent of resolved items decided with the AI verdict.
    pub ai_usage_rate: f64,
    pub performance: Performance,
    pub config: ConfigEcho,
}

impl BatchSummary {
    pub fn build(
        outcomes: Vec<ItemReport>,
        ai_usage: AiUsageSnapshot,
        config: ConfigEcho,
        elapsed: Duration,
    ) -> Self {
        let counts = OutcomeCounts::tally(&outcomes);
        let resolved = counts.resolved();
        let resolved_with = |method: AnalysisMethod| {
            outcomes
                .iter()
                .filter(|r| matches!(r.outcome, ItemOutcome::Approved | ItemOutcome::Flagged))
                .filter(|r| r.method == Some(method))
                .count()
        };
        let library_only = resolved_with(AnalysisMethod::LibraryOnly);
        let ai_enhanced = resolved_with(AnalysisMethod::AiEnhanced);

        let processed = outcomes.len() - counts.skipped;
        let total_ms = elapsed.as_millis() as u64;
        let minutes = elapsed.as_secs_f64() / 60.0;

        Self {
            counts,
            ai_usage,
            library_only,
            efficiency_rate: percent(library_only, resolved),
            ai_usage_rate: percent(ai_enhanced, resolved),
            performance: Performance {
                total_duration_ms: total_ms,
                avg_ms_per_item: if processed == 0 {
                    0.0
                } else {
                    total_ms as f64 / processed as f64
                },
                items_per_minute: if minutes > 0.0 {
                    processed as f64 / minutes
                } else {
                    0.0
                },
            },
            outcomes,
            config,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// One-line digest for the log.
    pub fn summary_line(&self) -> String {
        let c = &self.counts;
        format!(
            "{} items: {} approved, {} flagged, {} retry, {} failed, {} skipped, {} abandoned, {} unpersisted; AI {}/{} enhanced ({:.1}% library-only)",
            self.total(),
            c.approved,
            c.flagged,
            c.retry,
            c.failed,
            c.skipped,
            c.abandoned,
            c.unpersisted,
            self.ai_usage.enhanced,
            self.ai_usage.calls_attempted,
            self.efficiency_rate,
        )
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, outcome: ItemOutcome, method: Option<AnalysisMethod>) -> ItemReport {
        ItemReport {
            method,
            ..ItemReport::bare(ComplaintId::from(id), outcome)
        }
    }

    fn echo() -> ConfigEcho {
        ConfigEcho {
            requested_batch_size: 50,
            effective_batch_size: 50,
            status_filter: StatusFilter::Pending,
            force_ai_analysis: false,
            adjudicator: "disabled".into(),
            severity_threshold: 0.5,
        }
    }

    #[test]
    fn test_ai_usage_counts_each_kind() {
        let usage = AiUsage::new();
        usage.record(false, &AiRecord::NotRequested);
        usage.record(
            true,
            &AiRecord::Enhanced {
                local_level: SeverityLevel::Medium,
                local_score: 0.4,
                disagreement: None,
            },
        );
        usage.record(
            true,
            &AiRecord::Unavailable {
                reason: "timeout".into(),
            },
        );
        usage.record(
            false,
            &AiRecord::Unavailable {
                reason: "disabled".into(),
            },
        );
        assert_eq!(
            usage.snapshot(),
            AiUsageSnapshot {
                calls_attempted: 2,
                enhanced: 1,
                unavailable: 2,
            }
        );
    }

    #[test]
    fn test_summary_rates_and_counts() {
        let outcomes = vec![
            report("1", ItemOutcome::Approved, Some(AnalysisMethod::LibraryOnly)),
            report("2", ItemOutcome::Flagged, Some(AnalysisMethod::LibraryOnly)),
            report("3", ItemOutcome::Flagged, Some(AnalysisMethod::AiEnhanced)),
            report("4", ItemOutcome::Approved, Some(AnalysisMethod::LibraryOnly)),
            report("5", ItemOutcome::Retry, None),
            report("5", ItemOutcome::Skipped, None),
        ];
        let summary = BatchSummary::build(
            outcomes,
            AiUsageSnapshot::default(),
            echo(),
            Duration::from_secs(30),
        );
        assert_eq!(summary.total(), 6);
        assert_eq!(summary.counts.resolved(), 4);
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.library_only, 3);
        assert_eq!(summary.efficiency_rate, 75.0);
        assert_eq!(summary.ai_usage_rate, 25.0);
        assert_eq!(summary.performance.avg_ms_per_item, 6000.0);
        assert_eq!(summary.performance.items_per_minute, 10.0);
        assert!(summary.summary_line().starts_with("6 items: 2 approved, 2 flagged"));
    }

    #[test]
    fn test_empty_batch_has_zero_rates() {
        let summary =
            BatchSummary::build(vec![], AiUsageSnapshot::default(), echo(), Duration::ZERO);
        assert_eq!(summary.efficiency_rate, 0.0);
        assert_eq!(summary.performance.items_per_minute, 0.0);
        assert_eq!(summary.performance.avg_ms_per_item, 0.0);
    }
}
