//! Item lifecycle: explicit moderation states and legal transition guards.
//!
//! Every status change an item goes through during a batch run is checked
//! against the transition table and recorded, so a run can be audited per
//! item after the fact.
//!
//! ```text
//! pending ─┐                 ┌─> approved
//!          ├─> processing ───┼─> flagged
//! retry ───┘       │         ├─> retry
//!                  │         └─> failed
//!                  └─> pending / retry   (claim released, nothing persisted)
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::types::{ComplaintId, ModerationStatus};

fn is_legal_transition(from: ModerationStatus, to: ModerationStatus) -> bool {
    use ModerationStatus::*;

    matches!(
        (from, to),
        (Pending, Processing)
            | (Retry, Processing)
            | (Processing, Approved)
            | (Processing, Flagged)
            | (Processing, Retry)
            | (Processing, Failed)
            // release of an abandoned claim
            | (Processing, Pending)
    )
}

/// A single recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ModerationStatus,
    pub to: ModerationStatus,
    /// Milliseconds since the lifecycle was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: ModerationStatus,
    pub to: ModerationStatus,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal status transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Lifecycle of one item within one batch run.
pub struct ItemLifecycle {
    id: ComplaintId,
    initial: ModerationStatus,
    current: ModerationStatus,
    claimed_from: Option<ModerationStatus>,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl ItemLifecycle {
    pub fn new(id: ComplaintId, status: ModerationStatus) -> Self {
        Self {
            id,
            initial: status,
            current: status,
            claimed_from: None,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> ModerationStatus {
        self.current
    }

    /// Move to `processing`. Terminal and already-claimed items refuse.
    pub fn claim(&mut self) -> Result<(), IllegalTransition> {
        let from = self.current;
        self.advance(ModerationStatus::Processing, Some("claimed"))?;
        self.claimed_from = Some(from);
        Ok(())
    }

    pub fn advance(
        &mut self,
        to: ModerationStatus,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            item_id = %self.id,
            from = %self.current,
            to = %to,
            "Status transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Give up the claim without an outcome, restoring the claimed-from
    /// status so a later run can fetch the item again.
    pub fn release(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        let back_to = self.claimed_from.unwrap_or(ModerationStatus::Pending);
        self.advance(back_to, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{}: {} → {} ({}ms, {} transitions)",
            self.id,
            self.initial,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

/// Outcome of a transient failure under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// `retry` or `failed`.
    pub status: ModerationStatus,
    /// Retry count to persist with the result.
    pub retry_count: u32,
}

/// Bounded retry for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// `retry` with the count incremented while under the bound, else
    /// `failed` with the count unchanged.
    pub fn on_transient_failure(&self, retry_count: u32) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision {
                status: ModerationStatus::Retry,
                retry_count: retry_count + 1,
            }
        } else {
            RetryDecision {
                status: ModerationStatus::Failed,
                retry_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModerationStatus::*;

    fn lifecycle(status: ModerationStatus) -> ItemLifecycle {
        ItemLifecycle::new(ComplaintId::from("c-1"), status)
    }

    #[test]
    fn test_happy_path() {
        let mut lc = lifecycle(Pending);
        lc.claim().unwrap();
        lc.advance(Flagged, Some("score 0.93")).unwrap();
        assert!(lc.is_terminal());
        assert_eq!(lc.transitions().len(), 2);
        assert_eq!(lc.transitions()[1].reason.as_deref(), Some("score 0.93"));
    }

    #[test]
    fn test_retry_item_is_reclaimable() {
        let mut lc = lifecycle(Retry);
        lc.claim().unwrap();
        lc.advance(Approved, None).unwrap();
        assert_eq!(lc.current(), Approved);
    }

    #[test]
    fn test_terminal_items_cannot_be_claimed() {
        for status in [Approved, Flagged, Failed] {
            let mut lc = lifecycle(status);
            let err = lc.claim().unwrap_err();
            assert_eq!(err, IllegalTransition { from: status, to: Processing });
            assert!(lc.transitions().is_empty());
        }
    }

    #[test]
    fn test_double_claim_is_illegal() {
        let mut lc = lifecycle(Pending);
        lc.claim().unwrap();
        assert!(lc.claim().is_err());
    }

    #[test]
    fn test_outcome_requires_claim() {
        let mut lc = lifecycle(Pending);
        assert!(lc.advance(Approved, None).is_err());
        assert!(lc.advance(Retry, None).is_err());
    }

    #[test]
    fn test_release_restores_claimed_from() {
        let mut lc = lifecycle(Retry);
        lc.claim().unwrap();
        lc.release("batch deadline").unwrap();
        assert_eq!(lc.current(), Retry);

        let mut lc = lifecycle(Pending);
        lc.claim().unwrap();
        lc.release("batch deadline").unwrap();
        assert_eq!(lc.current(), Pending);
    }

    #[test]
    fn test_summary_lists_path() {
        let mut lc = lifecycle(Pending);
        lc.claim().unwrap();
        lc.advance(Approved, None).unwrap();
        let summary = lc.summary();
        assert!(summary.starts_with("c-1: pending → approved"));
        assert!(summary.ends_with("[processing → approved]"));
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = IllegalTransition { from: Flagged, to: Processing };
        assert_eq!(err.to_string(), "Illegal status transition: flagged → processing");
    }

    #[test]
    fn test_retry_bound() {
        let policy = RetryPolicy::new(3);
        let mut count = 0;
        let mut statuses = Vec::new();
        loop {
            let decision = policy.on_transient_failure(count);
            statuses.push(decision.status);
            if decision.status == Failed {
                assert_eq!(decision.retry_count, 3);
                break;
            }
            count = decision.retry_count;
        }
        assert_eq!(statuses, vec![Retry, Retry, Retry, Failed]);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let decision = RetryPolicy::new(0).on_transient_failure(0);
        assert_eq!(decision, RetryDecision { status: Failed, retry_count: 0 });
    }
}
