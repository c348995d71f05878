//! Batch orchestrator: drives the moderation pipeline over one fetched
//! batch.
//!
//! ```text
//! fetch_batch ──> dedupe ──> JoinSet (≤ max_workers in flight)
//!                               │ per item:
//!                               │   claim → prepare_text → assess
//!                               │   → [submitter history → AI,
//!                               │      min(ai_timeout, time left)] → resolve
//!                               │   → [flagged: store payload] → persist → notify
//!                               ▼
//!                         BatchSummary (one report per fetched item)
//! ```
//!
//! Item failures never escape: each becomes a lifecycle transition and an
//! [`ItemReport`]. The batch deadline cancels queued items and items still
//! deciding, which release their claim without persisting anything. Once an
//! item starts storing its payload or result it runs to completion.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use moderation::{
    AiOutcome, AiRecord, AiUnavailable, AnalysisResult, ComplaintId, ComplaintItem,
    ItemLifecycle, ModerationEngine, ModerationStatus, SeverityVerdict, StatusFilter,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adjudicator::{AiContext, InferenceProvider};
use crate::config::WorkerConfig;
use crate::errors::{BatchError, ItemError};
use crate::notify::{ModerationEvent, NotificationSink};
use crate::objects::{content_digest, FlaggedPayload, ObjectStore};
use crate::store::{ComplaintStore, SubmitterHistory, HISTORY_WINDOW_DAYS};
use crate::telemetry::{AiUsage, BatchSummary, ConfigEcho, ItemOutcome, ItemReport};

const DEFAULT_BATCH_SIZE: usize = 50;

/// Time kept back from the AI budget so a resolved item can still persist
/// before the batch deadline.
const COMMIT_RESERVE: Duration = Duration::from_secs(2);

/// Invocation payload of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    pub batch_size: usize,
    pub status_filter: StatusFilter,
    pub force_ai_analysis: bool,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            status_filter: StatusFilter::Pending,
            force_ai_analysis: false,
        }
    }
}

pub struct BatchOrchestrator {
    engine: Arc<ModerationEngine>,
    config: WorkerConfig,
    store: Arc<dyn ComplaintStore>,
    adjudicator: Arc<dyn InferenceProvider>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl BatchOrchestrator {
    /// Build the engine from `config.moderation` and wire the collaborators.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ComplaintStore>,
        adjudicator: Arc<dyn InferenceProvider>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        let engine = ModerationEngine::from_config(config.moderation.clone())?;
        Ok(Self {
            engine: Arc::new(engine),
            config,
            store,
            adjudicator,
            objects,
            notifier,
        })
    }

    /// Replace the engine, e.g. with one using a custom extractor set.
    pub fn with_engine(mut self, engine: ModerationEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one batch. Fails only on invocation-level problems; every fetched
    /// item gets exactly one report.
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        if request.batch_size == 0 {
            return Err(BatchError::InvalidRequest(
                "batch_size must be greater than zero".into(),
            ));
        }
        let effective = request.batch_size.min(self.config.max_batch_size);
        if effective < request.batch_size {
            warn!(
                requested = request.batch_size,
                max = self.config.max_batch_size,
                "Clamping batch size"
            );
        }

        let items = self
            .store
            .fetch_batch(request.status_filter, effective)
            .await
            .map_err(BatchError::StoreUnreachable)?;
        info!(
            fetched = items.len(),
            filter = %request.status_filter,
            force_ai = request.force_ai_analysis,
            adjudicator = self.adjudicator.name(),
            "Starting moderation batch"
        );

        let usage = Arc::new(AiUsage::new());
        let cancel = CancellationToken::new();
        let deadline = started + self.config.batch_deadline();
        let worker = Arc::new(ItemWorker {
            engine: Arc::clone(&self.engine),
            store: Arc::clone(&self.store),
            adjudicator: Arc::clone(&self.adjudicator),
            objects: Arc::clone(&self.objects),
            notifier: Arc::clone(&self.notifier),
            usage: Arc::clone(&usage),
            cancel: cancel.clone(),
            deadline,
            ai_timeout: self.config.ai_timeout(),
            force_ai: request.force_ai_analysis,
        });

        let ids: Vec<ComplaintId> = items.iter().map(|i| i.id.clone()).collect();
        let mut reports: Vec<Option<ItemReport>> = vec![None; items.len()];
        let mut seen = HashSet::new();
        let sem = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set: JoinSet<(usize, ItemReport)> = JoinSet::new();

        for (idx, item) in items.into_iter().enumerate() {
            if !seen.insert(item.id.clone()) {
                warn!(item_id = %item.id, "Duplicate item in batch, skipping");
                reports[idx] = Some(ItemReport {
                    error: Some("duplicate id in batch".into()),
                    ..ItemReport::bare(item.id, ItemOutcome::Skipped)
                });
                continue;
            }

            let sem = Arc::clone(&sem);
            let worker = Arc::clone(&worker);
            join_set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = worker.cancel.cancelled() => None,
                    permit = sem.acquire_owned() => permit.ok(),
                };
                let report = match permit {
                    Some(_permit) => worker.run(&item).await,
                    None => {
                        debug!(item_id = %item.id, "Deadline reached before item started");
                        ItemReport::bare(item.id.clone(), ItemOutcome::Abandoned)
                    }
                };
                (idx, report)
            });
        }

        let watchdog = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                warn!("Batch deadline reached, cancelling remaining items");
                cancel.cancel();
            })
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, report)) => reports[idx] = Some(report),
                Err(e) => error!(error = %e, "Item task failed outside its pipeline"),
            }
        }
        watchdog.abort();

        let outcomes: Vec<ItemReport> = reports
            .into_iter()
            .zip(ids)
            .map(|(report, id)| {
                report.unwrap_or_else(|| ItemReport {
                    error: Some("item task aborted".into()),
                    ..ItemReport::bare(id, ItemOutcome::Unpersisted)
                })
            })
            .collect();

        let summary = BatchSummary::build(
            outcomes,
            usage.snapshot(),
            ConfigEcho {
                requested_batch_size: request.batch_size,
                effective_batch_size: effective,
                status_filter: request.status_filter,
                force_ai_analysis: request.force_ai_analysis,
                adjudicator: self.adjudicator.name().to_string(),
                severity_threshold: self.engine.config().severity_threshold,
            },
            started.elapsed(),
        );
        info!(
            duration_ms = summary.performance.total_duration_ms,
            "{}",
            summary.summary_line()
        );
        Ok(summary)
    }
}

/// Shared, per-batch state handed to every item task.
struct ItemWorker {
    engine: Arc<ModerationEngine>,
    store: Arc<dyn ComplaintStore>,
    adjudicator: Arc<dyn InferenceProvider>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn NotificationSink>,
    usage: Arc<AiUsage>,
    cancel: CancellationToken,
    deadline: Instant,
    ai_timeout: Duration,
    force_ai: bool,
}

/// Where the pipeline stopped short of the commit point.
enum Stage {
    /// A result is ready to persist. `ai_called` and `ai` feed the usage
    /// counters once the item is committed.
    Decided {
        lifecycle: ItemLifecycle,
        result: AnalysisResult,
        ai_called: bool,
        ai: AiRecord,
    },
    Cancelled(ItemLifecycle),
}

impl Stage {
    fn without_ai(lifecycle: ItemLifecycle, result: AnalysisResult) -> Self {
        Self::Decided {
            lifecycle,
            result,
            ai_called: false,
            ai: AiRecord::NotRequested,
        }
    }
}

impl ItemWorker {
    /// Decide under `catch_unwind`, then commit. A panic while deciding
    /// becomes a transient failure; nothing after the commit point can
    /// rewrite the persisted result.
    async fn run(&self, item: &ComplaintItem) -> ItemReport {
        let started = Instant::now();
        let mut lifecycle = ItemLifecycle::new(item.id.clone(), item.status);
        if let Err(e) = lifecycle.claim() {
            warn!(item_id = %item.id, error = %e, "Item not claimable, skipping");
            return ItemReport {
                error: Some(e.to_string()),
                ..ItemReport::bare(item.id.clone(), ItemOutcome::Skipped)
            };
        }

        let stage = match AssertUnwindSafe(self.decide(item, lifecycle))
            .catch_unwind()
            .await
        {
            Ok(stage) => stage,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(item_id = %item.id, panic = %message, "Item pipeline panicked");
                let mut lifecycle = ItemLifecycle::new(item.id.clone(), item.status);
                if let Err(e) = lifecycle.claim() {
                    return ItemReport {
                        error: Some(e.to_string()),
                        ..ItemReport::bare(item.id.clone(), ItemOutcome::Unpersisted)
                    };
                }
                let result = self.transient_failure(item, &ItemError::Panicked(message));
                Stage::without_ai(lifecycle, result)
            }
        };

        let report = match stage {
            Stage::Cancelled(lifecycle) => self.abandon(item, lifecycle, started),
            Stage::Decided {
                lifecycle,
                result,
                ai_called,
                ai,
            } => {
                let report = self.commit(item, lifecycle, result, started).await;
                self.usage.record(ai_called, &ai);
                report
            }
        };
        debug!(
            item_id = %item.id,
            outcome = %report.outcome,
            elapsed_ms = report.elapsed_ms,
            "Item finished"
        );
        report
    }

    /// Everything before the commit point. Returns `Cancelled` when the batch
    /// deadline fired before the item reached it.
    async fn decide(&self, item: &ComplaintItem, lifecycle: ItemLifecycle) -> Stage {
        if self.cancel.is_cancelled() {
            return Stage::Cancelled(lifecycle);
        }

        let text = match self.engine.prepare_text(&item.body) {
            Ok(text) => text,
            Err(e) => {
                let err = ItemError::from(e);
                warn!(item_id = %item.id, error = %err, "Rejecting complaint content");
                let result = AnalysisResult::unsuccessful(
                    ModerationStatus::Failed,
                    item.retry_count,
                    &err.to_string(),
                );
                return Stage::without_ai(lifecycle, result);
            }
        };

        let assessment = self.engine.assess(&text, self.force_ai);
        let (ai, ai_called) = if assessment.escalation.escalate {
            debug!(
                item_id = %item.id,
                reasons = %assessment.escalation.summary(),
                "Escalating to AI adjudicator"
            );
            match self.adjudicate(item, &text, &assessment.verdict).await {
                Some(adjudicated) => adjudicated,
                None => return Stage::Cancelled(lifecycle),
            }
        } else {
            (AiOutcome::NotRequested, false)
        };

        let mut result = self
            .engine
            .resolve(assessment.verdict, ai)
            .with_retry_count(item.retry_count);
        let ai = result.ai.clone();

        if self.cancel.is_cancelled() {
            return Stage::Cancelled(lifecycle);
        }

        if result.status == ModerationStatus::Flagged {
            let payload = FlaggedPayload::new(item, &text, result.clone());
            match self.objects.store_flagged_payload(&payload).await {
                Ok(reference) => result = result.with_payload_ref(reference),
                Err(e) => result = self.transient_failure(item, &ItemError::from(e)),
            }
        }
        Stage::Decided {
            lifecycle,
            result,
            ai_called,
            ai,
        }
    }

    /// Call the adjudicator within `min(ai_timeout, remaining - COMMIT_RESERVE)`.
    /// `None` when the batch was cancelled mid-call.
    async fn adjudicate(
        &self,
        item: &ComplaintItem,
        text: &str,
        local: &SeverityVerdict,
    ) -> Option<(AiOutcome, bool)> {
        let context = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            context = self.context_for(item) => context,
        };

        let remaining = self
            .deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(COMMIT_RESERVE);
        let timeout = self.ai_timeout.min(remaining);
        if timeout.is_zero() {
            info!(item_id = %item.id, "No AI budget left before the deadline, resolving library-only");
            return Some((AiOutcome::Unavailable(AiUnavailable::DeadlineExhausted), false));
        }

        let call = tokio::time::timeout(
            timeout,
            self.adjudicator.infer(text, local, &context, timeout),
        );
        let joined = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            joined = call => joined,
        };

        let outcome = match joined {
            Ok(Ok(verdict)) => AiOutcome::Succeeded(verdict),
            Ok(Err(reason)) => AiOutcome::Unavailable(reason),
            Err(_) => AiOutcome::Unavailable(AiUnavailable::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        if let AiOutcome::Unavailable(reason) = &outcome {
            info!(item_id = %item.id, reason = %reason, "AI adjudicator unavailable, resolving library-only");
        }
        let called = !matches!(outcome, AiOutcome::Unavailable(AiUnavailable::Disabled));
        Some((outcome, called))
    }

    /// Submitter details for the adjudicator. A failed history lookup
    /// degrades to zero counts.
    async fn context_for(&self, item: &ComplaintItem) -> AiContext {
        let history = match item.metadata.submitter_id.as_deref() {
            Some(submitter) => {
                let since = Utc::now() - chrono::Duration::days(HISTORY_WINDOW_DAYS);
                match self.store.submitter_history(submitter, since).await {
                    Ok(history) => history,
                    Err(e) => {
                        warn!(item_id = %item.id, error = %e, "Submitter history unavailable");
                        SubmitterHistory::default()
                    }
                }
            }
            None => SubmitterHistory::default(),
        };
        AiContext::for_item(item, history)
    }

    /// Result for a transient failure: `retry` under the bound, `failed` at it.
    fn transient_failure(&self, item: &ComplaintItem, err: &ItemError) -> AnalysisResult {
        let decision = self
            .engine
            .retry_policy()
            .on_transient_failure(item.retry_count);
        warn!(
            item_id = %item.id,
            error = %err,
            category = %err.retry_category(),
            status = %decision.status,
            retry_count = decision.retry_count,
            "Transient item failure"
        );
        AnalysisResult::unsuccessful(decision.status, decision.retry_count, &err.to_string())
    }

    /// Persist `result`, the commit point. A decision that cannot be written
    /// falls back once to a retry result; if that cannot be written either the
    /// item is left re-fetchable.
    async fn commit(
        &self,
        item: &ComplaintItem,
        lifecycle: ItemLifecycle,
        result: AnalysisResult,
        started: Instant,
    ) -> ItemReport {
        let err = match self.store.persist_result(&item.id, &result).await {
            Ok(()) => return self.committed(item, lifecycle, result, started).await,
            Err(e) => ItemError::Persist(e),
        };

        if !matches!(
            result.status,
            ModerationStatus::Approved | ModerationStatus::Flagged
        ) {
            return self.unpersisted(item, lifecycle, err, started);
        }

        let fallback = self.transient_failure(item, &err);
        match self.store.persist_result(&item.id, &fallback).await {
            Ok(()) => self.committed(item, lifecycle, fallback, started).await,
            Err(e) => self.unpersisted(item, lifecycle, ItemError::Persist(e), started),
        }
    }

    async fn committed(
        &self,
        item: &ComplaintItem,
        mut lifecycle: ItemLifecycle,
        result: AnalysisResult,
        started: Instant,
    ) -> ItemReport {
        if let Err(e) = lifecycle.advance(result.status, result.error.as_deref()) {
            error!(item_id = %item.id, error = %e, "Lifecycle out of step with persisted result");
        }
        info!(
            item_id = %item.id,
            status = %result.status,
            level = ?result.level(),
            method = ?result.method(),
            retry_count = result.retry_count,
            "Item resolved"
        );
        debug!("{}", lifecycle.summary());

        if matches!(
            result.status,
            ModerationStatus::Flagged | ModerationStatus::Failed
        ) {
            self.notify(item, &result).await;
        }

        let outcome = match result.status {
            ModerationStatus::Approved => ItemOutcome::Approved,
            ModerationStatus::Flagged => ItemOutcome::Flagged,
            ModerationStatus::Retry => ItemOutcome::Retry,
            _ => ItemOutcome::Failed,
        };
        ItemReport {
            item_id: item.id.clone(),
            outcome,
            method: result.method(),
            level: result.level(),
            score: result.verdict.as_ref().map(|v| v.score),
            retry_count: result.retry_count,
            error: result.error,
            payload_ref: result.payload_ref,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Publish the alert. Errors and panics are logged; the committed
    /// outcome stands either way.
    async fn notify(&self, item: &ComplaintItem, result: &AnalysisResult) {
        let event = ModerationEvent::new(item, result, &content_digest(&item.body));
        match AssertUnwindSafe(self.notifier.publish(&event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(item_id = %item.id, alert_id = %event.alert_id, error = %e, "Failed to publish moderation alert");
            }
            Err(panic) => {
                error!(
                    item_id = %item.id,
                    alert_id = %event.alert_id,
                    panic = %panic_message(panic.as_ref()),
                    "Notification sink panicked"
                );
            }
        }
    }

    fn unpersisted(
        &self,
        item: &ComplaintItem,
        mut lifecycle: ItemLifecycle,
        err: ItemError,
        started: Instant,
    ) -> ItemReport {
        error!(item_id = %item.id, error = %err, "No result could be persisted, item stays re-fetchable");
        if let Err(e) = lifecycle.release("unpersisted") {
            error!(item_id = %item.id, error = %e, "Failed to release claim");
        }
        ItemReport {
            error: Some(err.to_string()),
            retry_count: item.retry_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            ..ItemReport::bare(item.id.clone(), ItemOutcome::Unpersisted)
        }
    }

    fn abandon(
        &self,
        item: &ComplaintItem,
        mut lifecycle: ItemLifecycle,
        started: Instant,
    ) -> ItemReport {
        info!(item_id = %item.id, "Batch deadline reached, releasing item");
        if let Err(e) = lifecycle.release("deadline") {
            error!(item_id = %item.id, error = %e, "Failed to release claim");
        }
        ItemReport {
            retry_count: item.retry_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            ..ItemReport::bare(item.id.clone(), ItemOutcome::Abandoned)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudicator::MockInferenceProvider;
    use crate::notify::RecordingSink;
    use crate::objects::InMemoryObjectStore;
    use crate::store::InMemoryStore;
    use crate::adjudicator::DisabledAdjudicator;
    use crate::errors::NotifyError;
    use moderation::{AnalysisMethod, ModerationConfig, SeverityLevel};

    struct Harness {
        store: Arc<InMemoryStore>,
        objects: Arc<InMemoryObjectStore>,
        sink: Arc<RecordingSink>,
        orchestrator: BatchOrchestrator,
    }

    fn harness(items: Vec<ComplaintItem>, provider: MockInferenceProvider) -> Harness {
        let store = Arc::new(InMemoryStore::new(items));
        let objects = Arc::new(InMemoryObjectStore::new());
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default(),
            store.clone(),
            Arc::new(provider),
            objects.clone(),
            sink.clone(),
        )
        .unwrap();
        Harness {
            store,
            objects,
            sink,
            orchestrator,
        }
    }

    fn named(mut provider: MockInferenceProvider) -> MockInferenceProvider {
        provider.expect_name().return_const("mock".to_string());
        provider
    }

    #[test]
    fn test_request_defaults() {
        let request: BatchRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, BatchRequest::default());
        assert_eq!(request.batch_size, 50);
        assert_eq!(request.status_filter, StatusFilter::Pending);
        assert!(!request.force_ai_analysis);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let h = harness(vec![], named(MockInferenceProvider::new()));
        let err = h
            .orchestrator
            .run_batch(BatchRequest {
                batch_size: 0,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_clear_cut_items_never_call_ai() {
        let mut provider = named(MockInferenceProvider::new());
        provider.expect_infer().never();
        let h = harness(
            vec![
                ComplaintItem::pending("ok", "Thanks for the quick help!"),
                ComplaintItem::pending(
                    "bad",
                    "You are a worthless idiot and your company is garbage",
                ),
            ],
            provider,
        );

        let summary = h.orchestrator.run_batch(BatchRequest::default()).await.unwrap();
        assert_eq!(summary.counts.approved, 1);
        assert_eq!(summary.counts.flagged, 1);
        assert_eq!(summary.ai_usage.calls_attempted, 0);
        assert_eq!(summary.library_only, 2);

        let bad = h.store.latest_result(&ComplaintId::from("bad")).unwrap();
        assert_eq!(bad.status, ModerationStatus::Flagged);
        let key = bad.payload_ref.unwrap();
        assert_eq!(h.objects.get(&key).unwrap().id, "bad");

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id, "bad");
        assert_eq!(events[0].storage_location.as_deref(), Some(key.as_str()));
    }

    #[tokio::test]
    async fn test_forced_ai_verdict_is_used() {
        let mut provider = named(MockInferenceProvider::new());
        provider.expect_infer().times(1).returning(|_, _, _, _| {
            Ok(SeverityVerdict::ai_enhanced(
                0.9,
                SeverityLevel::Critical,
                0.95,
                vec!["veiled threat".into()],
            ))
        });
        let h = harness(
            vec![ComplaintItem::pending("c", "Thanks for the quick help!")],
            provider,
        );

        let summary = h
            .orchestrator
            .run_batch(BatchRequest {
                force_ai_analysis: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.counts.flagged, 1);
        assert_eq!(summary.ai_usage.enhanced, 1);
        assert_eq!(summary.outcomes[0].method, Some(AnalysisMethod::AiEnhanced));

        let result = h.store.latest_result(&ComplaintId::from("c")).unwrap();
        assert!(matches!(result.ai, AiRecord::Enhanced { disagreement: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_ai_failure_resolves_library_only() {
        let mut provider = named(MockInferenceProvider::new());
        provider
            .expect_infer()
            .returning(|_, _, _, _| Err(AiUnavailable::Throttled("HTTP 429".into())));
        let h = harness(
            vec![ComplaintItem::pending("c", "Thanks for the quick help!")],
            provider,
        );

        let summary = h
            .orchestrator
            .run_batch(BatchRequest {
                force_ai_analysis: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.counts.approved, 1);
        assert_eq!(summary.ai_usage.unavailable, 1);
        assert_eq!(summary.ai_usage.calls_attempted, 1);
        let result = h.store.latest_result(&ComplaintId::from("c")).unwrap();
        assert_eq!(result.method(), Some(AnalysisMethod::LibraryOnly));
        assert!(matches!(result.ai, AiRecord::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_content_fails_without_retry() {
        let h = harness(
            vec![ComplaintItem::pending("empty", "   ")],
            named(MockInferenceProvider::new()),
        );
        let summary = h.orchestrator.run_batch(BatchRequest::default()).await.unwrap();
        assert_eq!(summary.counts.failed, 1);

        let result = h.store.latest_result(&ComplaintId::from("empty")).unwrap();
        assert_eq!(result.status, ModerationStatus::Failed);
        assert_eq!(result.retry_count, 0);
        assert!(result.error.is_some());
        assert_eq!(h.sink.events()[0].subject, "Moderation Failure - ID: empty");
    }

    #[tokio::test]
    async fn test_panicking_provider_becomes_retry() {
        struct Exploding;

        #[async_trait::async_trait]
        impl InferenceProvider for Exploding {
            fn name(&self) -> &str {
                "exploding"
            }

            async fn infer(
                &self,
                _text: &str,
                _local: &SeverityVerdict,
                _context: &AiContext,
                _timeout: Duration,
            ) -> Result<SeverityVerdict, AiUnavailable> {
                panic!("adjudicator blew up")
            }
        }

        let store = Arc::new(InMemoryStore::new(vec![ComplaintItem::pending(
            "c",
            "Thanks for the quick help!",
        )]));
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default(),
            store.clone(),
            Arc::new(Exploding),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(RecordingSink::new()),
        )
        .unwrap();

        let summary = orchestrator
            .run_batch(BatchRequest {
                force_ai_analysis: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.counts.retry, 1);
        let result = store.latest_result(&ComplaintId::from("c")).unwrap();
        assert_eq!(result.status, ModerationStatus::Retry);
        assert_eq!(result.retry_count, 1);
        assert!(result.error.unwrap().contains("adjudicator blew up"));
    }

    #[tokio::test]
    async fn test_batch_size_is_clamped() {
        let items = (0..5)
            .map(|i| ComplaintItem::pending(format!("c-{i}"), "Thanks for the quick help!"))
            .collect();
        let store = Arc::new(InMemoryStore::new(items));
        let config = WorkerConfig {
            max_batch_size: 3,
            moderation: ModerationConfig::default(),
            ..Default::default()
        };
        let orchestrator = BatchOrchestrator::new(
            config,
            store,
            Arc::new(named(MockInferenceProvider::new())),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(RecordingSink::new()),
        )
        .unwrap();

        let summary = orchestrator
            .run_batch(BatchRequest {
                batch_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.config.requested_batch_size, 10);
        assert_eq!(summary.config.effective_batch_size, 3);
    }

    #[tokio::test]
    async fn test_adjudicator_sees_submitter_context() {
        let mut earlier = ComplaintItem::pending("earlier", "Still waiting on my refund");
        earlier.metadata.submitter_id = Some("user-5".into());
        earlier.status = ModerationStatus::Flagged;
        let mut current = ComplaintItem::pending("current", "Thanks for the quick help!");
        current.metadata.submitter_id = Some("user-5".into());
        current.metadata.category = Some("billing".into());

        let mut provider = named(MockInferenceProvider::new());
        provider
            .expect_infer()
            .withf(|_, _, context, _| {
                context.submitter_id.as_deref() == Some("user-5")
                    && context.category.as_deref() == Some("billing")
                    && context.history.complaint_count == 2
                    && context.history.flagged_count == 1
            })
            .times(1)
            .returning(|_, _, _, _| Err(AiUnavailable::Throttled("HTTP 429".into())));
        let h = harness(vec![earlier, current], provider);

        let summary = h
            .orchestrator
            .run_batch(BatchRequest {
                force_ai_analysis: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.counts.approved, 1);
        assert_eq!(summary.ai_usage.calls_attempted, 1);
    }

    #[tokio::test]
    async fn test_panicking_sink_keeps_committed_outcome() {
        struct PanickingSink;

        #[async_trait::async_trait]
        impl NotificationSink for PanickingSink {
            async fn publish(&self, _event: &ModerationEvent) -> Result<(), NotifyError> {
                panic!("alert channel exploded")
            }
        }

        let store = Arc::new(InMemoryStore::new(vec![ComplaintItem::pending(
            "bad",
            "You are a worthless idiot and your company is garbage",
        )]));
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default(),
            store.clone(),
            Arc::new(DisabledAdjudicator),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(PanickingSink),
        )
        .unwrap();

        let summary = orchestrator.run_batch(BatchRequest::default()).await.unwrap();
        assert_eq!(summary.counts.flagged, 1);
        assert_eq!(summary.counts.retry, 0);

        let id = ComplaintId::from("bad");
        let history = store.results(&id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ModerationStatus::Flagged);
        assert_eq!(history[0].retry_count, 0);
        assert_eq!(store.item(&id).unwrap().status, ModerationStatus::Flagged);
    }
}
