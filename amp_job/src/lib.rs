//! Drive long-running jobs hosted on remote backends from a stateless,
//! repeatedly invoked process.
//!
//! A job is named by its [`JobFingerprint`], recomputed from the command
//! line on every invocation, so the backend itself is the only record of
//! what has been submitted. The [`Driver`] sequences the four [`Job`]
//! operations and reduces everything to a [`RunResult`].

pub mod artifact;
mod cache;
mod driver;
mod error;
pub mod fingerprint;
mod job;
mod registry;
mod request;

pub use artifact::ArtifactSet;
pub use cache::ToolCache;
pub use driver::{Driver, DriverOptions, DriverState, Mode, DEFAULT_POLL_INTERVAL};
pub use error::{BoxError, JobError};
pub use fingerprint::JobFingerprint;
pub use job::Job;
pub use registry::{JobFuture, Registry};
pub use request::{parse_param, JobRequest};
pub use types::{JobStatus, RunResult};
