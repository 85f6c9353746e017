//! HTCondor command-line tools
//!
//! Runs condor_submit, condor_rm and condor_q for the launcher:
//! - Locating the binaries and resolving them to absolute paths
//! - Running them with a cleared environment (PATH and CONDOR_CONFIG only)
//! - Capturing combined output and interpreting exit status
//! - Parsing cluster ids out of submit and query output
//!
//! Every call blocks until the process exits, with no timeout. Async callers
//! go through `tokio::task::spawn_blocking`.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CondorConfig;
use crate::error::{LaunchError, Result};

const SUBMIT_BIN: &str = "condor_submit";
const REMOVE_BIN: &str = "condor_rm";
const QUEUE_BIN: &str = "condor_q";

/// Marker condor_submit prints before the cluster id, e.g.
/// `1 job(s) submitted to cluster 1234.`
const SUBMITTED_MARKER: &str = "submitted to cluster ";

/// JobStatus value HTCondor uses for held jobs
const HELD_STATUS: u32 = 5;

/// A job the scheduler reports as held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldJob {
    pub condor_id: String,
    pub invocation_id: Option<Uuid>,
    pub submitter: Option<String>,
}

/// Operations the launcher needs from the cluster scheduler
pub trait Scheduler: Send + Sync {
    /// Submits the given submit file, returning the assigned cluster id
    fn submit(&self, cmd_path: &Path) -> Result<String>;

    /// Removes a job by cluster id, returning the tool's output
    fn remove(&self, condor_id: &str) -> Result<String>;

    /// Lists held jobs that were submitted by this launcher
    fn held_jobs(&self) -> Result<Vec<HeldJob>>;

    /// Lists the cluster ids belonging to an invocation
    fn find_by_invocation(&self, invocation_id: Uuid) -> Result<Vec<String>>;
}

/// Scheduler backed by the HTCondor command-line tools
pub struct CondorClient {
    path_env: String,
    condor_config: String,
}

impl CondorClient {
    /// Creates a client from the condor section of the configuration
    pub fn new(config: &CondorConfig) -> Self {
        Self {
            path_env: config.path_env_var.clone(),
            condor_config: config.condor_config.clone(),
        }
    }

    /// Finds an executable, searching the configured PATH before the
    /// process PATH, and returns its absolute path
    fn locate(&self, program: &str) -> Result<PathBuf> {
        let process_path = std::env::var_os("PATH").unwrap_or_default();
        let found = std::env::split_paths(&self.path_env)
            .chain(std::env::split_paths(&process_path))
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| LaunchError::BinaryNotFound(program.to_string()))?;

        let absolute = if found.is_absolute() {
            found
        } else {
            std::path::absolute(&found)?
        };
        debug!("{} found at {}", program, absolute.display());
        Ok(absolute)
    }

    /// Builds a command for a condor tool with the constrained environment
    fn command(&self, program: &str) -> Result<Command> {
        let path = self.locate(program)?;
        let mut command = Command::new(path);
        command
            .env_clear()
            .env("PATH", &self.path_env)
            .env("CONDOR_CONFIG", &self.condor_config);
        Ok(command)
    }

    /// Runs a command, failing on non-zero exit
    ///
    /// stdout and stderr share one pipe, so the output keeps the order the
    /// tool wrote it in.
    ///
    /// # Returns
    /// Combined stdout and stderr
    fn run(&self, program: &str, mut command: Command) -> Result<String> {
        let (mut reader, writer) = io::pipe()?;
        command
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);

        let mut child = command.spawn()?;
        // The command still owns the write ends; the read only ends once they close.
        drop(command);

        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let status = child.wait()?;
        let combined = String::from_utf8_lossy(&raw).into_owned();

        info!("Output of {}:\n{}", program, combined.trim_end());

        if !status.success() {
            return Err(LaunchError::Subprocess {
                program: program.to_string(),
                code: status.code().unwrap_or(-1),
                output: combined,
            });
        }

        Ok(combined)
    }
}

impl Scheduler for CondorClient {
    fn submit(&self, cmd_path: &Path) -> Result<String> {
        let mut command = self.command(SUBMIT_BIN)?;
        command.arg(cmd_path);
        if let Some(dir) = cmd_path.parent() {
            command.current_dir(dir);
        }

        let output = self.run(SUBMIT_BIN, command)?;
        let id = extract_job_id(&output).ok_or(LaunchError::MissingJobId { output })?;

        info!("Extracted ID: {}", id);
        Ok(id)
    }

    fn remove(&self, condor_id: &str) -> Result<String> {
        let mut command = self.command(REMOVE_BIN)?;
        command.arg(condor_id);

        let output = self.run(REMOVE_BIN, command)?;
        info!("condor_rm output for job {}:\n{}", condor_id, output.trim_end());
        Ok(output)
    }

    fn held_jobs(&self) -> Result<Vec<HeldJob>> {
        let mut command = self.command(QUEUE_BIN)?;
        command
            .arg("-constraint")
            .arg(format!("JobStatus == {} && IpcUuid =!= undefined", HELD_STATUS))
            .arg("-af")
            .args(["ClusterId", "IpcUuid", "IpcUsername"]);

        let output = self.run(QUEUE_BIN, command)?;
        Ok(parse_held_jobs(&output))
    }

    fn find_by_invocation(&self, invocation_id: Uuid) -> Result<Vec<String>> {
        let mut command = self.command(QUEUE_BIN)?;
        command
            .arg("-constraint")
            .arg(format!("IpcUuid == \"{}\"", invocation_id))
            .arg("-af")
            .arg("ClusterId");

        let output = self.run(QUEUE_BIN, command)?;
        Ok(output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|id| is_cluster_id(id))
            .map(str::to_string)
            .collect())
    }
}

/// Extracts the cluster id from condor_submit output
///
/// Returns the digits following the first `submitted to cluster` marker, or
/// `None` when the marker is missing or isn't followed by a number.
pub fn extract_job_id(output: &str) -> Option<String> {
    let start = output.find(SUBMITTED_MARKER)? + SUBMITTED_MARKER.len();
    let digits: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Parses `condor_q -af ClusterId IpcUuid IpcUsername` output
///
/// Unset attributes come back as `undefined`.
fn parse_held_jobs(output: &str) -> Vec<HeldJob> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let condor_id = fields.next().filter(|id| is_cluster_id(id))?;
            let invocation_id = fields.next().and_then(|u| Uuid::parse_str(u).ok());
            let submitter = fields
                .next()
                .filter(|s| *s != "undefined")
                .map(str::to_string);
            Some(HeldJob {
                condor_id: condor_id.to_string(),
                invocation_id,
                submitter,
            })
        })
        .collect()
}

fn is_cluster_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
