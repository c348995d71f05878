//! Moderation alerts for `flagged` and `failed` outcomes.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moderation::{
    AnalysisMethod, AnalysisResult, ComplaintItem, ModerationStatus, Priority, SeverityLevel,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::NotifyError;

pub const ALERT_TYPE: &str = "CONTENT_MODERATION_ALERT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationEvent {
    pub alert_type: String,
    /// `alert_<id>_<first 8 hex of the content digest>`.
    pub alert_id: String,
    pub subject: String,
    pub item_id: String,
    pub status: ModerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AnalysisMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concerns: Vec<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub priority: Priority,
    /// Object store reference of the flagged payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    pub requires_immediate_attention: bool,
    pub generated_at: DateTime<Utc>,
}

impl ModerationEvent {
    pub fn new(item: &ComplaintItem, result: &AnalysisResult, content_digest: &str) -> Self {
        let severity = result.level();
        let subject = match (result.status, severity) {
            (ModerationStatus::Flagged, Some(level)) => {
                format!("Content Alert - {level} - ID: {}", item.id)
            }
            (ModerationStatus::Failed, _) => format!("Moderation Failure - ID: {}", item.id),
            (status, _) => format!("Moderation {status} - ID: {}", item.id),
        };
        let digest8: String = content_digest.chars().take(8).collect();
        let verdict = result.verdict.as_ref();

        Self {
            alert_type: ALERT_TYPE.to_string(),
            alert_id: format!("alert_{}_{digest8}", item.id),
            subject,
            item_id: item.id.to_string(),
            status: result.status,
            severity,
            score: verdict.map(|v| v.score),
            method: verdict.map(|v| v.method),
            concerns: verdict.map(|v| v.concerns.clone()).unwrap_or_default(),
            retry_count: result.retry_count,
            error: result.error.clone(),
            category: item.metadata.category.clone(),
            priority: item.metadata.priority,
            storage_location: result.payload_ref.clone(),
            requires_immediate_attention: matches!(
                severity,
                Some(SeverityLevel::High | SeverityLevel::Critical)
            ),
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &ModerationEvent) -> Result<(), NotifyError>;
}

/// Publishes alerts to the log.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, event: &ModerationEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_string(event).map_err(|e| NotifyError::Rejected(e.to_string()))?;
        if event.requires_immediate_attention {
            warn!(alert_id = %event.alert_id, item_id = %event.item_id, subject = %event.subject, "{body}");
        } else {
            info!(alert_id = %event.alert_id, item_id = %event.item_id, subject = %event.subject, "{body}");
        }
        Ok(())
    }
}

/// Keeps every published event, in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ModerationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ModerationEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: &ModerationEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}
