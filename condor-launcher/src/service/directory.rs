//! Submission directory management
//!
//! Each job gets its own directory under the configured log path, named after
//! the job's invocation id, holding the submission files and a `logs`
//! subdirectory for the scheduler's output. Nothing here cleans up.

use condor_core::domain::job::JobDescription;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::service::submission::SubmissionBundle;

pub const SUBMIT_FILE_NAME: &str = "iplant.cmd";
pub const JOB_CONFIG_FILE_NAME: &str = "config";
pub const JOB_DOCUMENT_FILE_NAME: &str = "job";
pub const IRODS_CONFIG_FILE_NAME: &str = "irods-config";

/// Creates the job's log directory and any missing parents
///
/// Creating a directory that already exists is not an error.
///
/// # Returns
/// The log directory path
pub fn create_submission_directory(job: &JobDescription, default_base: &Path) -> Result<PathBuf> {
    let dir = job.log_directory(default_base);
    fs::create_dir_all(&dir)?;
    debug!("Created submission directory {}", dir.display());
    Ok(dir)
}

/// Writes the bundle into the submission directory
///
/// The irods-config file holds credentials and is only readable by the owner.
/// A failure part way through leaves the files written so far in place.
///
/// # Returns
/// Path to the written submit file
pub fn write_submission_files(dir: &Path, bundle: &SubmissionBundle) -> Result<PathBuf> {
    let submit_path = dir.join(SUBMIT_FILE_NAME);
    write_file(&submit_path, &bundle.submit_file, 0o644)?;
    write_file(&dir.join(JOB_CONFIG_FILE_NAME), &bundle.job_config, 0o644)?;
    write_file(&dir.join(JOB_DOCUMENT_FILE_NAME), &bundle.job_document, 0o644)?;
    write_file(&dir.join(IRODS_CONFIG_FILE_NAME), &bundle.irods_config, 0o600)?;
    Ok(submit_path)
}

fn write_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}
