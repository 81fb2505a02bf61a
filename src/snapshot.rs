//! Snapshot export and persistence
//!
//! Status mapping for snapshots, the persisted `SessionRecord` shape, and
//! the sinks that receive copies of it. Sinks report failures to their
//! caller; the service logs them and moves on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::{PersistenceSettings, ProductivityThresholds};
use crate::error::PersistError;
use crate::types::{FlowSnapshot, ProductivityStatus};

/// Map a focus score onto the ordered threshold buckets.
pub fn productivity_status(score: f64, thresholds: &ProductivityThresholds) -> ProductivityStatus {
    if score >= thresholds.high {
        ProductivityStatus::FlowState
    } else if score >= thresholds.medium {
        ProductivityStatus::InTheZone
    } else if score >= thresholds.low {
        ProductivityStatus::Focused
    } else {
        ProductivityStatus::GettingStarted
    }
}

/// Persisted shape: a snapshot tagged with who and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: FlowSnapshot,
}

impl SessionRecord {
    pub fn new(user_id: impl Into<String>, snapshot: FlowSnapshot) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: snapshot.computed_at,
            snapshot,
        }
    }
}

/// Receiver of persisted session records
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    fn name(&self) -> &str;

    async fn persist(&self, record: &SessionRecord) -> Result<(), PersistError>;
}

/// POSTs each record as JSON. Each request is bounded by
/// `persistence.timeout_ms`.
pub struct HttpSnapshotSink {
    client: Client,
    endpoint: String,
}

impl HttpSnapshotSink {
    pub fn new(settings: &PersistenceSettings) -> Result<Self, PersistError> {
        let client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

#[async_trait]
impl SnapshotSink for HttpSnapshotSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn persist(&self, record: &SessionRecord) -> Result<(), PersistError> {
        let response = self.client.post(&self.endpoint).json(record).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

/// Appends each record as one JSON line.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn persist(&self, record: &SessionRecord) -> Result<(), PersistError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
