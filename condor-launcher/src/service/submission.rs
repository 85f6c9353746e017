//! Submission file rendering
//!
//! Turns a job and the configuration into the four files a submission needs:
//! - `iplant.cmd`: the HTCondor submit description
//! - `config`: settings for the job process itself
//! - `irods-config`: iRODS connection settings for data staging
//! - `job`: the job description as JSON
//!
//! Rendering never touches the filesystem.

use condor_core::domain::job::{JobDescription, escape_classad};

use crate::config::{Config, IrodsConfig};
use crate::error::{LaunchError, Result};

/// Disk request rendered when the job carries none
const DEFAULT_REQUEST_DISK: &str = "0";

/// The rendered submission files for one job
#[derive(Debug, Clone)]
pub struct SubmissionBundle {
    pub submit_file: String,
    pub job_config: String,
    pub irods_config: String,
    pub job_document: String,
}

impl SubmissionBundle {
    /// Renders all four files; any failure invalidates the whole bundle
    pub fn render(job: &JobDescription, config: &Config) -> Result<Self> {
        Ok(Self {
            submit_file: render_submit_file(job)?,
            job_config: render_job_config(config),
            irods_config: render_irods_config(&config.irods),
            job_document: render_job_document(job)?,
        })
    }
}

/// Renders the HTCondor submit description for a job
///
/// Fails if the job has no steps, since the executable attributes come from
/// the first one.
pub fn render_submit_file(job: &JobDescription) -> Result<String> {
    let step = job.first_step().ok_or_else(|| {
        LaunchError::MalformedJob(format!("job {} has no steps", job.invocation_id))
    })?;

    let request_disk = job
        .request_disk
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_REQUEST_DISK);

    let mut out = String::new();
    out.push_str("universe = vanilla\n");
    out.push_str("executable = /usr/local/bin/road-runner\n");
    out.push_str("rank = mips\n");
    out.push_str("arguments = --config config --job job\n");
    out.push_str("output = script-output.log\n");
    out.push_str("error = script-error.log\n");
    out.push_str("log = condor.log\n");
    if let Some(group) = job.accounting_group() {
        out.push_str(&format!("accounting_group = {}\n", group));
        out.push_str(&format!(
            "accounting_group_user = {}\n",
            job.accounting_group_user()
        ));
    }
    out.push_str(&format!("request_disk = {}\n", request_disk));
    out.push_str(&format!("+IpcUuid = \"{}\"\n", job.invocation_id));
    out.push_str("+IpcJobId = \"generated_script\"\n");
    out.push_str(&format!(
        "+IpcUsername = \"{}\"\n",
        escape_classad(&job.submitter)
    ));
    out.push_str(&format!("+IpcUserGroups = {}\n", job.format_user_groups()));
    out.push_str(&format!(
        "concurrency_limits = {}\n",
        job.concurrency_limit_key()
    ));
    out.push_str(&format!(
        "+IpcExe = \"{}\"\n",
        escape_classad(&step.component.name)
    ));
    out.push_str(&format!(
        "+IpcExePath = \"{}\"\n",
        escape_classad(&step.component.location)
    ));
    out.push_str("should_transfer_files = YES\n");
    out.push_str("transfer_input_files = irods-config,iplant.cmd,config,job\n");
    out.push_str("transfer_output_files = logs/de-transfer-trigger.log,logs/logs-stdout-output,logs/logs-stderr-output\n");
    out.push_str("when_to_transfer_output = ON_EXIT_OR_EVICT\n");
    out.push_str("notification = NEVER\n");
    out.push_str("queue\n");

    Ok(out)
}

/// Renders the YAML config handed to the job process
pub fn render_job_config(config: &Config) -> String {
    format!(
        "amqp:\n  uri: {}\nirods:\n  base: \"{}\"\nporklock:\n  image: \"{}\"\n  tag: \"{}\"\ncondor:\n  filter_files: \"{}\"\n",
        config.broker.uri,
        config.irods.base,
        config.porklock.image,
        config.porklock.tag,
        config.condor.filter_files,
    )
}

/// Renders the irods-config file
pub fn render_irods_config(irods: &IrodsConfig) -> String {
    [
        ("host", &irods.host),
        ("port", &irods.port),
        ("user", &irods.user),
        ("pass", &irods.pass),
        ("home", &irods.base),
        ("zone", &irods.zone),
        ("resc", &irods.resc),
    ]
    .iter()
    .map(|(key, value)| format!("porklock.irods-{} = {}\n", key, value))
    .collect()
}

/// Serializes the job for the job process to read back at runtime
pub fn render_job_document(job: &JobDescription) -> Result<String> {
    Ok(serde_json::to_string(job)?)
}
