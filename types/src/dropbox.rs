use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// The `job.json` document dropped into a cluster job directory.
///
/// Input and output entries are bare file names relative to the job
/// directory's `inputs/` and `outputs/` subdirectories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpcJobRequest {
    /// Name of the cluster-side script that processes this job
    pub script: String,

    /// Staged input file names, in caller order
    pub inputs: Vec<String>,

    /// Output file names the cluster is expected to produce, in caller order
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    pub submitted_at: DateTime<Utc>,
}

impl HpcJobRequest {
    /// Check the document before it is written to, or after it is read
    /// from, the dropbox.
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.script.trim().is_empty() {
            return Err("script must not be empty".to_string());
        }

        if self.outputs.is_empty() {
            return Err("at least one output is required".to_string());
        }

        for name in self.inputs.iter().chain(&self.outputs) {
            if !is_bare_file_name(name) {
                return Err(format!("invalid file name in job document: {name:?}"));
            }
        }

        Ok(())
    }
}

fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HpcJobStatus {
    Pending,
    Running,
    Ok,
    Error,
}

/// The `status.json` document written by the cluster side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpcJobState {
    pub status: HpcJobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Wall-clock accounting for a finished cluster job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpcTimestamps {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds between start and end
    pub elapsed_time: f64,
}

impl HpcJobState {
    pub fn timestamps(&self) -> Option<HpcTimestamps> {
        let (start_time, end_time) = (self.started_at?, self.finished_at?);

        #[allow(clippy::cast_precision_loss)]
        let elapsed_time =
            (end_time - start_time).num_milliseconds() as f64 / 1000.0;

        Some(HpcTimestamps {
            start_time,
            end_time,
            elapsed_time,
        })
    }
}
