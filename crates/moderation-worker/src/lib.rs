//! Moderation Batch Worker
//!
//! Async half of the complaint moderation pipeline. Wires the decision core
//! in the `moderation` crate to its collaborators:
//! - `ComplaintStore` for fetching batches, persisting results and submitter
//!   history
//! - `InferenceProvider` for the AI adjudicator (HTTP or disabled)
//! - `ObjectStore` for flagged payloads
//! - `NotificationSink` for flagged and failed alerts
//!
//! `BatchOrchestrator::run_batch` is the entry point; everything it needs is
//! passed in explicitly.

pub mod adjudicator;
pub mod config;
pub mod errors;
pub mod notify;
pub mod objects;
pub mod orchestrator;
pub mod store;
pub mod telemetry;

pub use adjudicator::{AiContext, DisabledAdjudicator, HttpAdjudicator, InferenceProvider};
pub use config::{AdjudicatorEndpoint, WorkerConfig};
pub use errors::{
    BatchError, ItemError, NotifyError, ObjectStoreError, RetryCategory, StoreError,
    WorkerConfigError,
};
pub use notify::{ModerationEvent, NotificationSink, RecordingSink, TracingSink};
pub use objects::{FlaggedPayload, FsObjectStore, InMemoryObjectStore, ObjectStore};
pub use orchestrator::{BatchOrchestrator, BatchRequest};
pub use store::{ComplaintStore, InMemoryStore, SubmitterHistory};
pub use telemetry::{AiUsage, BatchSummary, ItemOutcome, ItemReport};
