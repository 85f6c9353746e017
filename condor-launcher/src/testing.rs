//! Test doubles shared by the launcher's unit tests

use condor_core::domain::job::{Component, JobDescription, Step};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::condor::{HeldJob, Scheduler};
use crate::config::Config;
use crate::config::tests::sample;
use crate::error::{LaunchError, Result};

/// Scheduler double that records calls instead of running condor tools
#[derive(Default)]
pub struct FakeScheduler {
    pub submit_result: Mutex<Option<Result<String>>>,
    pub failing_removals: Vec<String>,
    pub held: Vec<HeldJob>,
    pub by_invocation: Vec<String>,
    pub submitted: Mutex<Vec<PathBuf>>,
    pub removed: Mutex<Vec<String>>,
}

impl FakeScheduler {
    /// Scheduler whose next submit succeeds with the given id
    pub fn submitting(id: &str) -> Self {
        Self {
            submit_result: Mutex::new(Some(Ok(id.to_string()))),
            ..Default::default()
        }
    }

    /// Scheduler whose next submit fails like a non-zero condor_submit
    pub fn failing_submit(output: &str) -> Self {
        Self {
            submit_result: Mutex::new(Some(Err(LaunchError::Subprocess {
                program: "condor_submit".to_string(),
                code: 1,
                output: output.to_string(),
            }))),
            ..Default::default()
        }
    }
}

impl Scheduler for FakeScheduler {
    fn submit(&self, cmd_path: &Path) -> Result<String> {
        assert!(cmd_path.is_file(), "submit file must exist before submit");
        self.submitted.lock().unwrap().push(cmd_path.to_path_buf());
        self.submit_result.lock().unwrap().take().unwrap_or_else(|| {
            Err(LaunchError::MissingJobId {
                output: String::new(),
            })
        })
    }

    fn remove(&self, condor_id: &str) -> Result<String> {
        self.removed.lock().unwrap().push(condor_id.to_string());
        if self.failing_removals.iter().any(|id| id == condor_id) {
            return Err(LaunchError::Subprocess {
                program: "condor_rm".to_string(),
                code: 1,
                output: format!("Couldn't find/remove all jobs in cluster {}", condor_id),
            });
        }
        Ok(format!(
            "All jobs in cluster {} have been marked for removal",
            condor_id
        ))
    }

    fn held_jobs(&self) -> Result<Vec<HeldJob>> {
        Ok(self.held.clone())
    }

    fn find_by_invocation(&self, _invocation_id: Uuid) -> Result<Vec<String>> {
        Ok(self.by_invocation.clone())
    }
}

/// A one-step job submitted by alice, with no group and no disk request
pub fn alice_job() -> JobDescription {
    JobDescription::new(
        Uuid::new_v4(),
        "alice",
        vec![Step {
            component: Component {
                name: "wc_wrapper.sh".to_string(),
                location: "/usr/local3/bin/wc_tool-1.00".to_string(),
            },
        }],
    )
}

/// Sample configuration with submission directories under `base`
pub fn config_in(base: &Path) -> Arc<Config> {
    let mut config = sample();
    config.condor.log_path = base.to_path_buf();
    Arc::new(config)
}
