//! End-of-run reporting types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a target was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Still rate limited after every backoff attempt
    RateLimited { attempts: u32 },
    /// Rejected credentials; never retried
    Unauthorized,
    /// Network, timeout, decode or unexpected status
    Transient { attempts: u32, cause: String },
    /// Body fetched but the parser could not use it
    Malformed { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { attempts } => {
                write!(f, "rate limited after {attempts} attempt(s)")
            }
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::Transient { attempts, cause } => {
                write!(f, "transient error after {attempts} attempt(s): {cause}")
            }
            Self::Malformed { message } => write!(f, "malformed: {message}"),
        }
    }
}

/// A target recorded in the failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    /// Target id (`cursor:40`, an entity key, an event URL)
    pub target: String,
    pub reason: FailureReason,
}

impl FailedTarget {
    pub fn new(target: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            target: target.into(),
            reason,
        }
    }
}

/// Summary of one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub total: usize,
    /// Items merged/folded (entities, detail records, events)
    pub completed: usize,
    pub resumed: bool,
    pub cancelled: bool,
    pub failures: Vec<FailedTarget>,
}

impl RunReport {
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            kind: kind.into(),
            started_at: now,
            finished_at: now,
            processed: 0,
            total: 0,
            completed: 0,
            resumed: false,
            cancelled: false,
            failures: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// Key/value lines for [`crate::utils::log::summary`].
    pub fn summary_items(&self) -> Vec<(&'static str, String)> {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        vec![
            ("processed", format!("{}/{}", self.processed, self.total)),
            ("completed", self.completed.to_string()),
            ("failed", self.failures.len().to_string()),
            ("resumed", self.resumed.to_string()),
            ("cancelled", self.cancelled.to_string()),
            ("elapsed", format!("{elapsed:.1}s")),
        ]
    }
}
