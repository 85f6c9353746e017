//! Request DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobDescription;

/// Command carried by a job request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Launch,
    Stop,
    /// Any tag this version doesn't know about
    #[serde(other)]
    Unknown,
}

/// Request to act on a job, published on the launches topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub command: Command,
    pub job: JobDescription,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: u32,
}

impl JobRequest {
    pub fn launch(job: JobDescription) -> Self {
        Self {
            command: Command::Launch,
            job,
            message: String::new(),
            version: 0,
        }
    }
}

/// Request to stop every cluster job belonging to an invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub invocation_id: Uuid,
    #[serde(default)]
    pub reason: String,
}
