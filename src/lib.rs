//! FlowSense - Developer-activity telemetry engine
//!
//! FlowSense turns a live stream of editor events into a focus score, a
//! productivity classification, streak and achievement tracking, and
//! periodic session snapshots through a single-writer pipeline:
//! event recording → rolling metrics → scoring → policy → snapshot export.
//!
//! ## Modules
//!
//! - **Engine**: `FlowEngine`, one per session, consuming `FlowEvent`s
//! - **Service**: `FlowService`, the engine on its own task with persist and refresh timers

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod policy;
pub mod recorder;
pub mod scoring;
pub mod service;
pub mod snapshot;
pub mod streak;
pub mod types;
pub mod window;

pub use config::FlowSettings;
pub use engine::FlowEngine;
pub use error::{FlowError, PersistError, ScoringError};
pub use events::{Diagnostic, EventLog, FlowEvent, TimedEvent};
pub use scoring::{FocusScorer, HttpFocusScorer, OfflineScorer, ScoreOutcome};
pub use service::{FlowHandle, FlowService, IngestStats};
pub use snapshot::{HttpSnapshotSink, JsonLinesSink, SessionRecord, SnapshotSink};
pub use types::{FlowSnapshot, Notification};

/// FlowSense version embedded in CLI reports
pub const FLOWSENSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for persisted records and reports
pub const PRODUCER_NAME: &str = "flowsense";
