//! Analysis run lifecycle
//!
//! A run moves `running -> completed | failed` exactly once. On failure the
//! impact total stays unset unless the run was cut off by its deadline, in
//! which case it records the impacts that finished in time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AnalysisError, Result};

/// Run state. Terminal states keep their timestamps for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunState {
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        total_impacts: usize,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        /// Set only when the run deadline expired mid-analysis
        total_impacts: Option<usize>,
    },
}

impl RunState {
    pub fn state_name(&self) -> &'static str {
        match self {
            RunState::Running { .. } => "running",
            RunState::Completed { .. } => "completed",
            RunState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running { .. })
    }
}

/// One invocation of the change-impact analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub run_type: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRun {
    /// Create a run already in the `running` state.
    pub fn start(tenant_id: impl Into<String>, run_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            run_type: run_type.into(),
            state: RunState::Running { started_at: now },
            created_at: now,
            updated_at: now,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match &self.state {
            RunState::Running { started_at }
            | RunState::Completed { started_at, .. }
            | RunState::Failed { started_at, .. } => *started_at,
        }
    }

    /// Transition: running -> completed.
    pub fn complete(&mut self, total_impacts: usize) -> Result<()> {
        match &self.state {
            RunState::Running { started_at } => {
                let now = Utc::now();
                self.state = RunState::Completed {
                    started_at: *started_at,
                    completed_at: now,
                    total_impacts,
                };
                self.updated_at = now;
                Ok(())
            }
            other => Err(AnalysisError::InvalidStateTransition {
                from: other.state_name().to_string(),
                to: "completed".to_string(),
            }),
        }
    }

    /// Transition: running -> failed.
    pub fn fail(&mut self, error: String, total_impacts: Option<usize>) -> Result<()> {
        match &self.state {
            RunState::Running { started_at } => {
                let now = Utc::now();
                self.state = RunState::Failed {
                    started_at: *started_at,
                    failed_at: now,
                    error,
                    total_impacts,
                };
                self.updated_at = now;
                Ok(())
            }
            other => Err(AnalysisError::InvalidStateTransition {
                from: other.state_name().to_string(),
                to: "failed".to_string(),
            }),
        }
    }
}
