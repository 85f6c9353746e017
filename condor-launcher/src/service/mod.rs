//! Service layer
//!
//! Services contain the launch pipeline: rendering a job's submission files,
//! laying them out on disk, and driving the scheduler to submit or remove
//! the job.

mod directory;
mod launcher;
mod submission;

pub use launcher::Launcher;
pub use submission::SubmissionBundle;
