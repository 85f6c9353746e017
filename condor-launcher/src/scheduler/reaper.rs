//! Held job reaper
//!
//! Jobs that HTCondor puts on hold never make progress and keep holding
//! cluster resources. Every 30 seconds the reaper asks the scheduler for held
//! jobs, removes each one, and reports it as failed.

use anyhow::{Context as AnyhowContext, Result};
use condor_bus::StatusPublisher;
use condor_core::domain::job::JobDescription;
use condor_core::domain::status::StatusUpdate;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use crate::condor::HeldJob;
use crate::service::Launcher;

/// How often held jobs are looked for
pub const HELD_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically removes held jobs from the cluster
pub struct HeldJobReaper {
    launcher: Arc<Launcher>,
    publisher: Arc<dyn StatusPublisher>,
}

impl HeldJobReaper {
    /// Creates a new reaper
    pub fn new(launcher: Arc<Launcher>, publisher: Arc<dyn StatusPublisher>) -> Self {
        Self {
            launcher,
            publisher,
        }
    }

    /// Starts the reaper loop in its own task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs the reaper loop forever
    pub async fn run(&self) {
        info!("Starting held job reaper (interval: {:?})", HELD_SCAN_INTERVAL);

        let mut ticker = time::interval(HELD_SCAN_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; wait a full period first.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            debug!("Looking for held jobs");

            match self.reap_once().await {
                Ok(removed) => {
                    if removed > 0 {
                        info!("Attempted removal of {} held job(s) this cycle", removed);
                    }
                }
                Err(e) => {
                    error!("Error during held job scan: {:#}", e);
                }
            }
        }
    }

    /// Performs a single scan-and-remove pass
    ///
    /// A failed removal is logged and doesn't stop the remaining ones.
    ///
    /// # Returns
    /// The number of removals attempted
    pub async fn reap_once(&self) -> Result<usize> {
        let launcher = Arc::clone(&self.launcher);
        let held = tokio::task::spawn_blocking(move || launcher.scheduler().held_jobs())
            .await
            .context("Held job query panicked")?
            .context("Failed to list held jobs")?;

        if held.is_empty() {
            debug!("No held jobs");
            return Ok(0);
        }

        info!("Found {} held job(s)", held.len());

        let mut attempted = 0;
        for entry in held {
            attempted += 1;
            self.kill_held_job(entry).await;
        }

        Ok(attempted)
    }

    /// Removes one held job and publishes its failure
    ///
    /// Nothing is published for a job whose invocation id can't be read.
    async fn kill_held_job(&self, entry: HeldJob) {
        let job = held_job_description(&entry);
        let condor_id = entry.condor_id;

        let launcher = Arc::clone(&self.launcher);
        let remove_id = condor_id.clone();
        let result =
            tokio::task::spawn_blocking(move || launcher.scheduler().remove(&remove_id)).await;

        match result {
            Ok(Ok(_)) => {
                info!("Removed held job {}", condor_id);
                let Some(job) = job else {
                    warn!("Held job {} has no invocation id, not reporting it", condor_id);
                    return;
                };
                let update = StatusUpdate::failed(
                    job,
                    format!(
                        "Job was held by the cluster and has been removed (Condor ID {})",
                        condor_id
                    ),
                );
                if let Err(e) = self.publisher.publish_job_update(&update).await {
                    error!("Failed to publish update for held job {}: {}", condor_id, e);
                }
            }
            Ok(Err(e)) => {
                warn!("Failed to remove held job {}: {}", condor_id, e);
            }
            Err(e) => {
                warn!("Removal of held job {} panicked: {}", condor_id, e);
            }
        }
    }
}

/// Builds the job description a held job is reported under
///
/// Returns `None` when the job carries no readable invocation id.
fn held_job_description(entry: &HeldJob) -> Option<JobDescription> {
    let mut job = JobDescription::new(
        entry.invocation_id?,
        entry.submitter.clone().unwrap_or_default(),
        Vec::new(),
    );
    job.condor_id = Some(entry.condor_id.clone());
    Some(job)
}
