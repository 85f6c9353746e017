//! Launch orchestration
//!
//! Coordinates the steps of getting one job onto the cluster, or off it:
//! - launch: directory → render → write files → condor_submit
//! - stop: condor_rm with the job's recorded cluster id
//!
//! The first failing step aborts the rest. All state is local to the call, so
//! concurrent launches for different jobs don't interfere.

use condor_core::domain::job::JobDescription;
use std::sync::Arc;
use tracing::{error, info};

use crate::condor::Scheduler;
use crate::config::Config;
use crate::error::{LaunchError, Result};
use crate::service::directory::{create_submission_directory, write_submission_files};
use crate::service::submission::SubmissionBundle;

/// Submits jobs to and removes jobs from the cluster
pub struct Launcher {
    config: Arc<Config>,
    scheduler: Arc<dyn Scheduler>,
}

impl Launcher {
    /// Creates a new launcher
    ///
    /// # Arguments
    /// * `config` - Shared read-only configuration
    /// * `scheduler` - Scheduler the jobs are submitted to
    pub fn new(config: Arc<Config>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { config, scheduler }
    }

    /// The scheduler this launcher drives
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Submits a job to the cluster
    ///
    /// # Returns
    /// The cluster id assigned by the scheduler
    pub fn launch(&self, job: &JobDescription) -> Result<String> {
        let log_dir = create_submission_directory(job, &self.config.condor.log_path)
            .inspect_err(|e| error!("Error creating submission directory:\n{}", e))?;

        let bundle = SubmissionBundle::render(job, &self.config)
            .inspect_err(|e| error!("Error rendering submission files:\n{}", e))?;

        let submission_dir = log_dir.parent().unwrap_or(&log_dir);
        let cmd_path = write_submission_files(submission_dir, &bundle)
            .inspect_err(|e| error!("Error creating submission files:\n{}", e))?;

        let id = self
            .scheduler
            .submit(&cmd_path)
            .inspect_err(|e| error!("Error submitting job:\n{}", e))?;

        info!("Condor job id is {}", id);
        Ok(id)
    }

    /// Removes a previously submitted job from the cluster
    ///
    /// The job must carry the cluster id from a successful launch.
    ///
    /// # Returns
    /// condor_rm output
    pub fn stop(&self, job: &JobDescription) -> Result<String> {
        let condor_id = job
            .condor_id
            .as_deref()
            .ok_or(LaunchError::MissingCondorId(job.invocation_id))?;

        self.scheduler.remove(condor_id)
    }
}
