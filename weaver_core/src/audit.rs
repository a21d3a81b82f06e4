//! Per-run audit log with JSON persistence.
//!
//! Every coordinator run records what it did: when it started, each batch it
//! dispatched, each node output it recorded and the dependents that release
//! unblocked, and how it ended. The log lives beside the [`WorkflowState`]
//! rather than inside it, so the state stays a pure function of the graph
//! and the executor outputs while the log carries wall-clock timestamps.
//!
//! # Persistence
//!
//! [`RunLog::persist`] writes the events as pretty JSON to
//! `{dir}/{run_id}.json`.
//!
//! [`WorkflowState`]: crate::WorkflowState

use crate::workflow::graph::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Error types for run log persistence.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Failed to serialize or parse the log
    #[error("run log serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or write the log file
    #[error("run log I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A single coordinator action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Run accepted for validation
    RunStarted {
        timestamp: DateTime<Utc>,
        node_count: usize,
        edge_count: usize,
    },
    /// Graph rejected before execution
    ValidationFailed {
        timestamp: DateTime<Utc>,
        errors: Vec<String>,
    },
    /// Batch handed to the executor
    BatchDispatched {
        timestamp: DateTime<Utc>,
        batch: usize,
        node_ids: Vec<NodeId>,
    },
    /// Node output applied to the state
    NodeRecorded {
        timestamp: DateTime<Utc>,
        node_id: NodeId,
    },
    /// Dependents of a completed node released in the scheduler
    DependenciesReleased {
        timestamp: DateTime<Utc>,
        node_id: NodeId,
        newly_ready: Vec<NodeId>,
    },
    /// Run reached the Completed phase
    RunCompleted {
        timestamp: DateTime<Utc>,
        completed: usize,
        batches: usize,
    },
    /// Run ended in failure
    RunFailed {
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl RunEvent {
    pub fn run_started(node_count: usize, edge_count: usize) -> Self {
        RunEvent::RunStarted {
            timestamp: Utc::now(),
            node_count,
            edge_count,
        }
    }

    pub fn validation_failed(errors: Vec<String>) -> Self {
        RunEvent::ValidationFailed {
            timestamp: Utc::now(),
            errors,
        }
    }

    pub fn batch_dispatched(batch: usize, node_ids: Vec<NodeId>) -> Self {
        RunEvent::BatchDispatched {
            timestamp: Utc::now(),
            batch,
            node_ids,
        }
    }

    pub fn node_recorded(node_id: NodeId) -> Self {
        RunEvent::NodeRecorded {
            timestamp: Utc::now(),
            node_id,
        }
    }

    pub fn dependencies_released(node_id: NodeId, newly_ready: Vec<NodeId>) -> Self {
        RunEvent::DependenciesReleased {
            timestamp: Utc::now(),
            node_id,
            newly_ready,
        }
    }

    pub fn run_completed(completed: usize, batches: usize) -> Self {
        RunEvent::RunCompleted {
            timestamp: Utc::now(),
            completed,
            batches,
        }
    }

    pub fn run_failed(reason: impl Into<String>) -> Self {
        RunEvent::RunFailed {
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Event name as it appears in the serialized log.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::ValidationFailed { .. } => "validation_failed",
            RunEvent::BatchDispatched { .. } => "batch_dispatched",
            RunEvent::NodeRecorded { .. } => "node_recorded",
            RunEvent::DependenciesReleased { .. } => "dependencies_released",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            RunEvent::RunStarted { timestamp, .. }
            | RunEvent::ValidationFailed { timestamp, .. }
            | RunEvent::BatchDispatched { timestamp, .. }
            | RunEvent::NodeRecorded { timestamp, .. }
            | RunEvent::DependenciesReleased { timestamp, .. }
            | RunEvent::RunCompleted { timestamp, .. }
            | RunEvent::RunFailed { timestamp, .. } => *timestamp,
        }
    }
}

/// Ordered record of one coordinator run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    run_id: Uuid,
    events: Vec<RunEvent>,
}

impl RunLog {
    /// Creates an empty log with a fresh run ID.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Appends an event.
    pub fn record(&mut self, event: RunEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Consumes the log and returns its events.
    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Writes the log to `{dir}/{run_id}.json`, creating `dir` if needed.
    ///
    /// Returns the path written.
    pub async fn persist(&self, dir: impl AsRef<Path>) -> Result<PathBuf, AuditError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let json = serde_json::to_string_pretty(self)?;
        let path = dir.join(format!("{}.json", self.run_id));
        tokio::fs::write(&path, json).await?;

        tracing::debug!(run_id = %self.run_id, path = %path.display(), events = self.events.len(), "run log persisted");
        Ok(path)
    }

    /// Reads a log previously written by [`persist`](Self::persist).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}
