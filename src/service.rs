//! Flow service
//!
//! Runs a `FlowEngine` on its own task as the single writer. Collaborators
//! talk to it through a cloneable `FlowHandle`; commands are processed one
//! at a time in arrival order. Two timers run alongside:
//!
//! - persist: every `persistence.interval_secs`, snapshot the engine and
//!   hand a copy to the sink on a detached task
//! - refresh: every `refresh_interval_ms`, publish a live view on a watch
//!   channel (no scoring, no streak evaluation)

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::FlowEngine;
use crate::error::FlowError;
use crate::events::{EventLog, FlowEvent};
use crate::snapshot::{SessionRecord, SnapshotSink};
use crate::types::{ErrorSummary, FlowSnapshot, Notification};

/// Queued commands before senders wait
const COMMAND_BUFFER: usize = 256;

enum Command {
    Event {
        event: FlowEvent,
        at: DateTime<Utc>,
    },
    Metrics(oneshot::Sender<FlowSnapshot>),
    ErrorSummary(oneshot::Sender<ErrorSummary>),
    Notifications(oneshot::Sender<Vec<Notification>>),
    Reset(oneshot::Sender<()>),
}

/// Line counts reported by `FlowHandle::ingest_ndjson`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: usize,
    pub recorded: usize,
    pub skipped: usize,
}

/// Cloneable handle to a running service
#[derive(Clone)]
pub struct FlowHandle {
    commands: mpsc::Sender<Command>,
    live: watch::Receiver<Option<FlowSnapshot>>,
    cancel: CancellationToken,
}

impl FlowHandle {
    /// Record an event stamped now.
    pub async fn record(&self, event: FlowEvent) -> Result<(), FlowError> {
        self.record_at(event, Utc::now()).await
    }

    pub async fn record_at(&self, event: FlowEvent, at: DateTime<Utc>) -> Result<(), FlowError> {
        self.send(Command::Event { event, at }).await
    }

    /// Full snapshot, including one scoring tick.
    pub async fn get_metrics(&self) -> Result<FlowSnapshot, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Metrics(tx)).await?;
        rx.await.map_err(|_| FlowError::ServiceClosed)
    }

    pub async fn get_error_summary(&self) -> Result<ErrorSummary, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ErrorSummary(tx)).await?;
        rx.await.map_err(|_| FlowError::ServiceClosed)
    }

    pub async fn drain_notifications(&self) -> Result<Vec<Notification>, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Notifications(tx)).await?;
        rx.await.map_err(|_| FlowError::ServiceClosed)
    }

    /// Persist the current session, then start a new one. Resolves once
    /// the new session accepts events.
    pub async fn reset(&self) -> Result<(), FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Reset(tx)).await?;
        rx.await.map_err(|_| FlowError::ServiceClosed)
    }

    /// Live views published by the refresh timer
    pub fn live(&self) -> watch::Receiver<Option<FlowSnapshot>> {
        self.live.clone()
    }

    /// Feed a live NDJSON event stream into the service until EOF.
    ///
    /// Events are stamped on arrival and the `timestamp` of each line is
    /// ignored, so the session clock, the timers and the events share the
    /// wall clock. Recorded logs belong to `FlowEngine::apply_timed`.
    /// Unparseable lines are logged and skipped.
    pub async fn ingest_ndjson<R>(&self, reader: R) -> Result<IngestStats, FlowError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = IngestStats::default();
        while let Some(line) = lines.next_line().await? {
            stats.lines += 1;
            match EventLog::parse_line(&line) {
                Ok(Some(timed)) => {
                    self.record(timed.event).await?;
                    stats.recorded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    stats.skipped += 1;
                    warn!("Skipping line {}: {}", stats.lines, e);
                }
            }
        }
        Ok(stats)
    }

    /// Stop the service. Commands already queued are applied first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn send(&self, command: Command) -> Result<(), FlowError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FlowError::ServiceClosed)
    }
}

/// Single-writer task owning the engine
pub struct FlowService {
    engine: FlowEngine,
    sink: Arc<dyn SnapshotSink>,
    user_id: String,
    commands: mpsc::Receiver<Command>,
    live: watch::Sender<Option<FlowSnapshot>>,
    cancel: CancellationToken,
}

impl FlowService {
    /// Spawn the service on the current runtime. The join handle yields the
    /// engine back after shutdown.
    pub fn spawn(
        engine: FlowEngine,
        sink: Arc<dyn SnapshotSink>,
        user_id: impl Into<String>,
    ) -> (FlowHandle, JoinHandle<FlowEngine>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (live_tx, live_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let service = Self {
            engine,
            sink,
            user_id: user_id.into(),
            commands: command_rx,
            live: live_tx,
            cancel: cancel.clone(),
        };
        let handle = FlowHandle {
            commands: command_tx,
            live: live_rx,
            cancel,
        };

        (handle, tokio::spawn(service.run()))
    }

    async fn run(mut self) -> FlowEngine {
        let persist_every = self.engine.settings().persistence.interval();
        let mut persist_ticker =
            tokio::time::interval_at(Instant::now() + persist_every, persist_every);
        persist_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut refresh_ticker = tokio::time::interval(self.engine.settings().refresh_interval());
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Flow service started for session {} (persist every {}s, {} sink)",
            self.engine.session_id(),
            persist_every.as_secs(),
            self.sink.name()
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let mut drained = 0usize;
                    while let Ok(command) = self.commands.try_recv() {
                        self.handle(command).await;
                        drained += 1;
                    }
                    info!("Flow service shutting down ({} queued commands applied)", drained);
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await {
                            persist_ticker.reset();
                        }
                    }
                    None => {
                        info!("All flow handles dropped, stopping service");
                        break;
                    }
                },
                _ = persist_ticker.tick() => self.persist().await,
                _ = refresh_ticker.tick() => {
                    let view = self.engine.live_view();
                    self.live.send_replace(Some(view));
                }
            }
        }

        self.engine
    }

    /// Apply one command. Returns true when a new session was started.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Event { event, at } => self.engine.apply_at(event, at),
            Command::Metrics(reply) => {
                let snapshot = self.engine.get_metrics().await;
                let _ = reply.send(snapshot);
            }
            Command::ErrorSummary(reply) => {
                let _ = reply.send(self.engine.get_error_summary());
            }
            Command::Notifications(reply) => {
                let _ = reply.send(self.engine.drain_notifications());
            }
            Command::Reset(reply) => {
                self.persist().await;
                self.engine.reset();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    /// Snapshot the engine and hand the record to the sink without waiting.
    async fn persist(&mut self) {
        let snapshot = self.engine.get_metrics().await;
        let record = SessionRecord::new(self.user_id.clone(), snapshot);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            match sink.persist(&record).await {
                Ok(()) => debug!(
                    "Persisted session {} via {} sink",
                    record.snapshot.session_id,
                    sink.name()
                ),
                Err(e) => warn!(
                    "Failed to persist session {} via {} sink: {}",
                    record.snapshot.session_id,
                    sink.name(),
                    e
                ),
            }
        });
    }
}
