use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::fingerprint::canonical_path;

/// Memoized results of an external tool, keyed by the file it inspected.
///
/// Owned by the application context of one invocation and handed to the
/// backends that shell out, so repeated probes of the same file run the
/// tool once.
#[derive(Debug, Default)]
pub struct ToolCache<V> {
    entries: Mutex<HashMap<PathBuf, V>>,
}

impl<V: Clone> ToolCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(path: &Path) -> PathBuf {
        canonical_path(path).unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn get(&self, path: &Path) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(path))
            .cloned()
    }

    pub fn insert(&self, path: &Path, value: V) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(path), value);
    }

    /// Return the cached value for `path`, computing it with `compute` on a
    /// miss. Failures are not cached.
    ///
    /// # Errors
    /// Whatever `compute` returns.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        path: &Path,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(path) {
            tracing::debug!("tool cache hit for {}", path.display());
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(path, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
