use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fingerprint::{self, JobFingerprint};
use crate::{ArtifactSet, JobError};

/// Everything one invocation asks for: which backend, which files, and the
/// backend-specific `key=value` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRequest {
    tag: String,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    params: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn new(
        tag: impl Into<String>,
        inputs: Vec<PathBuf>,
        outputs: Vec<PathBuf>,
    ) -> Self {
        Self {
            tag: tag.into(),
            inputs,
            outputs,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.params.extend(params);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// # Errors
    /// If the parameter was not given.
    pub fn require_param(&self, key: &str) -> Result<&str, JobError> {
        self.param(key)
            .ok_or_else(|| JobError::MissingParameter(key.to_string()))
    }

    /// # Errors
    /// If no input was declared.
    pub fn primary_input(&self) -> Result<&Path, JobError> {
        self.inputs
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| JobError::MissingParameter("--input".to_string()))
    }

    /// # Errors
    /// If no output was declared.
    pub fn primary_output(&self) -> Result<&Path, JobError> {
        self.outputs
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| JobError::MissingParameter("--output".to_string()))
    }

    /// The persistent name of this job.
    ///
    /// Parameters are deliberately left out: only the caller-visible
    /// inputs and outputs identify a job, so a rerun with a fresh temp
    /// directory or tweaked tuning still finds the original.
    ///
    /// # Errors
    /// If relative paths cannot be resolved against the working directory.
    pub fn fingerprint(&self) -> Result<JobFingerprint, JobError> {
        let artifacts: Vec<&Path> = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .map(PathBuf::as_path)
            .collect();

        Ok(fingerprint::generate(&self.tag, &artifacts)?)
    }

    pub fn artifacts(&self, wait_for_inputs: bool) -> ArtifactSet {
        ArtifactSet::new(self.inputs.clone(), self.outputs.clone())
            .waiting_for_inputs(wait_for_inputs)
    }
}

/// Split a `key=value` CLI parameter.
///
/// # Errors
/// If there is no `=` or the key is empty.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
