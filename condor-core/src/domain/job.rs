//! Job domain types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Name of the directory the cluster writes job output and logs into.
pub const LOGS_DIR_NAME: &str = "logs";

/// A job to be submitted to the cluster.
///
/// Built upstream and decoded from a launch request. The only field this
/// system writes is `condor_id`, once, after a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Invocation identifier, unique per launch
    #[serde(rename = "uuid")]
    pub invocation_id: Uuid,

    /// Submitting user
    #[serde(rename = "username")]
    pub submitter: String,

    /// Human-readable analysis name, used for the directory name only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Accounting group the job is charged to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Accounting group user; the submitter is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_user: Option<String>,

    /// Requested disk, in KiB as understood by the scheduler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_disk: Option<String>,

    /// Ordered execution steps
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Groups the submitter belongs to
    #[serde(default)]
    pub user_groups: Vec<String>,

    /// Scheduler-assigned cluster id, absent until submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condor_id: Option<String>,

    /// Base path for the submission directory; the configured one is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condor_log_path: Option<PathBuf>,
}

/// A single execution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub component: Component,
}

/// The runnable a step executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub location: String,
}

impl JobDescription {
    /// Creates a job with the required fields and everything else empty
    pub fn new(invocation_id: Uuid, submitter: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            invocation_id,
            submitter: submitter.into(),
            name: None,
            group: None,
            group_user: None,
            request_disk: None,
            steps,
            user_groups: Vec::new(),
            condor_id: None,
            condor_log_path: None,
        }
    }

    /// First execution step, if any
    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    /// Accounting group, treating an empty string as absent
    pub fn accounting_group(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.trim().is_empty())
    }

    /// User the accounting group is charged under
    pub fn accounting_group_user(&self) -> &str {
        self.group_user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.submitter)
    }

    /// Whether a non-blank disk request is present
    pub fn has_request_disk(&self) -> bool {
        self.request_disk
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// User groups as a ClassAd list literal, e.g. `{"a","b"}`
    pub fn format_user_groups(&self) -> String {
        let quoted: Vec<String> = self
            .user_groups
            .iter()
            .map(|g| format!("\"{}\"", escape_classad(g)))
            .collect();
        format!("{{{}}}", quoted.join(","))
    }

    /// Concurrency limit name derived from the submitter.
    ///
    /// Limit names must be valid ClassAd attribute names, so anything outside
    /// `[A-Za-z0-9_]` becomes `_` and the result is prefixed with `_`.
    pub fn concurrency_limit_key(&self) -> String {
        let sanitized: String = self
            .submitter
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("_{}", sanitized)
    }

    /// Name of this job's directory under the submitter's directory
    pub fn directory_name(&self) -> String {
        match self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("{}-{}", path_safe(name), self.invocation_id),
            None => self.invocation_id.to_string(),
        }
    }

    /// Directory holding the submission files for this job
    ///
    /// `<base>/<submitter>/<directory_name>`, where `base` is the job's own
    /// log path or `default_base` when the job doesn't carry one.
    pub fn submission_directory(&self, default_base: &Path) -> PathBuf {
        let base = self.condor_log_path.as_deref().unwrap_or(default_base);
        base.join(path_safe(&self.submitter))
            .join(self.directory_name())
    }

    /// Directory the scheduler writes this job's output and logs into.
    ///
    /// Always ends in a `logs` segment.
    pub fn log_directory(&self, default_base: &Path) -> PathBuf {
        let dir = self.submission_directory(default_base);
        if dir.file_name().is_some_and(|n| n == LOGS_DIR_NAME) {
            dir
        } else {
            dir.join(LOGS_DIR_NAME)
        }
    }
}

/// Escapes a value for use inside a double-quoted ClassAd string
pub fn escape_classad(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Replaces characters that would change the meaning of a path segment
fn path_safe(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '@' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}
