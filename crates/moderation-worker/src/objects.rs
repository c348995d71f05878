//! Object storage for flagged payloads.
//!
//! Keys are `flagged/YYYY/MM/DD/<submitter>/<id>.json`, dated by the analysis
//! timestamp. An item flagged again on the same UTC day overwrites its
//! payload; a re-flag on a later day is kept as a separate dated object.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moderation::{AnalysisResult, ComplaintItem, Priority};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ObjectStoreError;

const PREVIEW_CHARS: usize = 200;
const UNKNOWN_SUBMITTER: &str = "unknown";

/// Everything kept about a flagged complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedPayload {
    pub id: String,
    pub submitter: Option<String>,
    pub category: Option<String>,
    pub priority: Priority,
    pub analysis: AnalysisResult,
    pub flagged_at: DateTime<Utc>,
    /// First 200 characters of the moderated text.
    pub preview: String,
    /// blake3 hex digest of the raw complaint body.
    pub content_digest: String,
}

impl FlaggedPayload {
    pub fn new(item: &ComplaintItem, text: &str, analysis: AnalysisResult) -> Self {
        Self {
            id: item.id.to_string(),
            submitter: item.metadata.submitter_id.clone(),
            category: item.metadata.category.clone(),
            priority: item.metadata.priority,
            flagged_at: analysis.timestamp,
            analysis,
            preview: preview(text),
            content_digest: content_digest(&item.body),
        }
    }

    pub fn key(&self) -> String {
        flagged_key(&self.id, self.submitter.as_deref(), self.flagged_at)
    }
}

pub fn flagged_key(id: &str, submitter: Option<&str>, at: DateTime<Utc>) -> String {
    format!(
        "flagged/{}/{}/{}.json",
        at.format("%Y/%m/%d"),
        path_segment(submitter.unwrap_or(UNKNOWN_SUBMITTER)),
        path_segment(id),
    )
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        UNKNOWN_SUBMITTER.to_string()
    } else {
        cleaned
    }
}

pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub fn content_digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the payload and return its reference.
    async fn store_flagged_payload(
        &self,
        payload: &FlaggedPayload,
    ) -> Result<String, ObjectStoreError>;
}

/// Payloads as pretty JSON files under a root directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn store_flagged_payload(
        &self,
        payload: &FlaggedPayload,
    ) -> Result<String, ObjectStoreError> {
        let key = payload.key();
        let path = self.root.join(&key);
        let bytes = serde_json::to_vec_pretty(payload)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(item_id = %payload.id, key = %key, "Stored flagged payload");
        Ok(key)
    }
}

/// Payloads kept in memory, keyed like the filesystem store.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, FlaggedPayload>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<FlaggedPayload> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, FlaggedPayload>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store_flagged_payload(
        &self,
        payload: &FlaggedPayload,
    ) -> Result<String, ObjectStoreError> {
        let key = payload.key();
        self.lock().insert(key.clone(), payload.clone());
        Ok(key)
    }
}
