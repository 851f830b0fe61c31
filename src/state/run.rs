//! Run records.
//!
//! A [`Run`] is one orchestrated execution over a target set of steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique run identifier: `<yyyymmddThhmmssZ>-<8 hex>`.
///
/// Identifiers sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a new run identifier.
    pub fn generate() -> Self {
        let now = Utc::now();
        let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(counter.to_le_bytes());
        let suffix = hex::encode(&hasher.finalize()[..4]);

        Self(format!("{}-{}", now.format("%Y%m%dT%H%M%SZ"), suffix))
    }

    /// Wrap an existing identifier (e.g. from the command line).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `id` has the shape of a generated identifier.
    ///
    /// Identifiers become directory names, so anything else is refused
    /// before touching the file system.
    pub fn is_well_formed(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 64
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Computing the order and loading prior results.
    Planning,
    /// Steps are being executed.
    Executing,
    /// Every step succeeded or was already satisfied.
    Completed,
    /// At least one step failed.
    Failed,
    /// Cancellation stopped the run before it finished.
    Cancelled,
}

impl RunStatus {
    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One execution attempt of a requested step set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,

    /// When the run was created.
    pub created_at: DateTime<Utc>,

    /// Requested target steps (after workflow expansion).
    pub targets: Vec<String>,

    /// Execution order, fixed once planning finishes.
    #[serde(default)]
    pub order: Vec<String>,

    /// Current status.
    pub status: RunStatus,

    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Run this one resumed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<RunId>,
}

impl Run {
    /// Start a new run in `Planning`.
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            id: RunId::generate(),
            created_at: Utc::now(),
            targets,
            order: Vec::new(),
            status: RunStatus::Planning,
            finished_at: None,
            resumed_from: None,
        }
    }

    /// Move to a terminal status, stamping the finish time.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Wall time of a finished run in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.created_at).num_milliseconds().max(0) as u64)
    }
}
