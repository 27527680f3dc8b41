//! Backend tag → Job constructor table, resolved once at startup.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{Job, JobError, JobRequest};

pub type JobFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn Job>, JobError>> + Send>>;

type Constructor<C> = Box<dyn Fn(Arc<C>, JobRequest) -> JobFuture + Send + Sync>;

/// Maps backend tags to constructors taking the application context `C`.
pub struct Registry<C> {
    constructors: BTreeMap<String, Constructor<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }
}

impl<C: Send + Sync + 'static> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any earlier one for `tag`.
    pub fn register<F, Fut>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(Arc<C>, JobRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Box<dyn Job>, JobError>> + Send + 'static,
    {
        let boxed: Constructor<C> =
            Box::new(move |context: Arc<C>, request: JobRequest| -> JobFuture {
                Box::pin(constructor(context, request))
            });
        self.constructors.insert(tag.into(), boxed);
    }

    pub fn tags(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Construct the job for `request.tag()`.
    ///
    /// # Errors
    /// If the tag is unknown or the backend rejects the request.
    pub async fn build(
        &self,
        context: Arc<C>,
        request: JobRequest,
    ) -> Result<Box<dyn Job>, JobError> {
        let Some(constructor) = self.constructors.get(request.tag()) else {
            return Err(JobError::UnknownBackend {
                tag: request.tag().to_string(),
                known: self.tags().join(", "),
            });
        };

        tracing::debug!("building {} job", request.tag());
        constructor(context, request).await
    }
}
