//! Error types for a single launch or stop attempt

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Everything that can go wrong while handling one job
///
/// None of these are fatal to the process; they end up in a Failed status
/// update for the job that caused them.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The job can't be rendered into a submit file
    #[error("malformed job: {0}")]
    MalformedJob(String),

    /// Directory or file creation failed
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// The job document couldn't be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A scheduler executable isn't on the search path
    #[error("{0} not found on the search path")]
    BinaryNotFound(String),

    /// A scheduler executable exited unsuccessfully
    #[error("{program} exited with status {code}:\n{output}")]
    Subprocess {
        program: String,
        code: i32,
        output: String,
    },

    /// condor_submit succeeded but didn't report a cluster id
    #[error("no job id found in condor_submit output:\n{output}")]
    MissingJobId { output: String },

    /// Stop was requested for a job that was never submitted
    #[error("job {0} has no condor id")]
    MissingCondorId(Uuid),
}
