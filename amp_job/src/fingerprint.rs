//! Persistent job names.
//!
//! A fingerprint is recomputed from the CLI arguments on every invocation;
//! it is never stored locally. Backends name their remote job after it, so
//! a rerun with the same role and artifacts finds the job it started
//! earlier.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Number of hex characters kept from the digest (128 bits).
pub const HASH_HEX_LEN: usize = 32;

/// Longest role prefix kept in the name.
pub const MAX_ROLE_LEN: usize = 32;

/// Longest fingerprint that [`generate`] can produce.
pub const MAX_FINGERPRINT_LEN: usize = MAX_ROLE_LEN + 1 + HASH_HEX_LEN;

/// Deterministic identifier of one job: `<ROLE>-<hex>`.
///
/// Only `[A-Z0-9-]` and lowercase hex digits are used, which fits the naming
/// rules of cloud job names, object keys, and directory names alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobFingerprint(String);

impl JobFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the fingerprint for `role` and the ordered `artifacts`, resolving
/// relative paths against the current working directory.
///
/// Only stable, caller-visible paths (the declared inputs and outputs)
/// belong in `artifacts`. Temporary paths change from run to run and would
/// defeat resumption.
///
/// # Errors
/// If the current working directory cannot be determined.
pub fn generate<P: AsRef<Path>>(
    role: &str,
    artifacts: &[P],
) -> std::io::Result<JobFingerprint> {
    let base = std::env::current_dir()?;
    Ok(generate_from(&base, role, artifacts))
}

/// Same as [`generate`] with an explicit base directory for relative paths.
pub fn generate_from<P: AsRef<Path>>(
    base: &Path,
    role: &str,
    artifacts: &[P],
) -> JobFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(role.as_bytes());
    hasher.update([0]);

    for artifact in artifacts {
        let path = normalize(base, artifact.as_ref());
        hasher.update(path.as_os_str().as_encoded_bytes());
        hasher.update([0]);
    }

    let digest = hasher.finalize();
    let hex: String = digest
        .iter()
        .take(HASH_HEX_LEN / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect();

    JobFingerprint(format!("{}-{hex}", role_prefix(role)))
}

/// Absolute, lexically normalized form of `path`.
///
/// # Errors
/// If `path` is relative and the current working directory cannot be
/// determined.
pub fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(Path::new("/"), path));
    }

    Ok(normalize(&std::env::current_dir()?, path))
}

// Lexical only: symlinks are not resolved, so the result does not depend
// on whether the file exists yet.
fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // `/..` stays at the root
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
        }
    }

    normalized
}

fn role_prefix(role: &str) -> String {
    let mut mapped = String::with_capacity(role.len());
    for c in role.chars() {
        if c.is_ascii_alphanumeric() {
            mapped.push(c.to_ascii_uppercase());
        } else if !mapped.ends_with('-') {
            mapped.push('-');
        }
    }

    let trimmed: String = mapped
        .trim_matches('-')
        .chars()
        .take(MAX_ROLE_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches('-');

    if trimmed.is_empty() {
        "JOB".to_string()
    } else {
        trimmed.to_string()
    }
}
