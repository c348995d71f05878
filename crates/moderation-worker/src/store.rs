//! Complaint store contract and an in-memory implementation.
//!
//! The store hands out items at-least-once: nothing is reserved on fetch,
//! so an item whose result was never persisted is fetched again by the next
//! run.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moderation::{AnalysisResult, ComplaintId, ComplaintItem, ModerationStatus, StatusFilter};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// How far back [`ComplaintStore::submitter_history`] looks.
pub const HISTORY_WINDOW_DAYS: i64 = 90;

/// A submitter's recent complaints, given to the adjudicator as context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterHistory {
    pub complaint_count: u32,
    pub flagged_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_complaint: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Up to `limit` claimable items matching `filter`, highest priority and
    /// oldest first.
    async fn fetch_batch(
        &self,
        filter: StatusFilter,
        limit: usize,
    ) -> Result<Vec<ComplaintItem>, StoreError>;

    /// Write the result and move the item to `result.status`.
    async fn persist_result(
        &self,
        id: &ComplaintId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError>;

    /// Complaints by `submitter` created at or after `since`, the item being
    /// moderated included.
    async fn submitter_history(
        &self,
        submitter: &str,
        since: DateTime<Utc>,
    ) -> Result<SubmitterHistory, StoreError>;
}

/// Fetch order: priority rank, then age.
pub fn fetch_order(a: &ComplaintItem, b: &ComplaintItem) -> std::cmp::Ordering {
    a.metadata
        .priority
        .rank()
        .cmp(&b.metadata.priority.rank())
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Process-local store, used by the CLI and tests.
#[derive(Default)]
pub struct InMemoryStore {
    items: Mutex<Vec<ComplaintItem>>,
    results: Mutex<HashMap<ComplaintId, Vec<AnalysisResult>>>,
}

impl InMemoryStore {
    pub fn new(items: Vec<ComplaintItem>) -> Self {
        Self {
            items: Mutex::new(items),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Current copy of an item.
    pub fn item(&self, id: &ComplaintId) -> Option<ComplaintItem> {
        lock(&self.items).iter().find(|i| &i.id == id).cloned()
    }

    /// Every result persisted for `id`, oldest first.
    pub fn results(&self, id: &ComplaintId) -> Vec<AnalysisResult> {
        lock(&self.results).get(id).cloned().unwrap_or_default()
    }

    pub fn latest_result(&self, id: &ComplaintId) -> Option<AnalysisResult> {
        lock(&self.results).get(id).and_then(|r| r.last().cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ComplaintStore for InMemoryStore {
    async fn fetch_batch(
        &self,
        filter: StatusFilter,
        limit: usize,
    ) -> Result<Vec<ComplaintItem>, StoreError> {
        let mut batch: Vec<ComplaintItem> = lock(&self.items)
            .iter()
            .filter(|i| filter.matches(i.status))
            .cloned()
            .collect();
        batch.sort_by(fetch_order);
        batch.truncate(limit);
        Ok(batch)
    }

    async fn persist_result(
        &self,
        id: &ComplaintId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        {
            let mut items = lock(&self.items);
            let mut found = false;
            for item in items.iter_mut().filter(|i| &i.id == id) {
                item.status = result.status;
                item.retry_count = result.retry_count;
                found = true;
            }
            if !found {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        lock(&self.results)
            .entry(id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn submitter_history(
        &self,
        submitter: &str,
        since: DateTime<Utc>,
    ) -> Result<SubmitterHistory, StoreError> {
        let items = lock(&self.items);
        let mut history = SubmitterHistory::default();
        for item in items.iter().filter(|i| {
            i.metadata.submitter_id.as_deref() == Some(submitter) && i.created_at >= since
        }) {
            history.complaint_count += 1;
            if item.status == ModerationStatus::Flagged {
                history.flagged_count += 1;
            }
            history.last_complaint = history.last_complaint.max(Some(item.created_at));
        }
        Ok(history)
    }
}
