//! Job status updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobDescription;

/// State reported for a job in a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
    Held,
    Killed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Submitted => write!(f, "Submitted"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Held => write!(f, "Held"),
            JobState::Killed => write!(f, "Killed"),
        }
    }
}

/// Status update published for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub job: JobDescription,
    pub state: JobState,
    pub message: String,
    pub sent_on: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(job: JobDescription, state: JobState, message: impl Into<String>) -> Self {
        Self {
            job,
            state,
            message: message.into(),
            sent_on: Utc::now(),
        }
    }

    pub fn submitted(job: JobDescription, message: impl Into<String>) -> Self {
        Self::new(job, JobState::Submitted, message)
    }

    pub fn failed(job: JobDescription, message: impl Into<String>) -> Self {
        Self::new(job, JobState::Failed, message)
    }
}
