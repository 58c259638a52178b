use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// A mutex-guarded JSON document written back to disk after every mutation.
///
/// Each persisted file gets its own store, so contention stays scoped to a
/// single document. Reads see whatever the last completed update left behind.
pub struct JsonStore<T> {
    path: PathBuf,
    document: Arc<Mutex<T>>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            document: Arc::clone(&self.document),
        }
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Loads the document at `path`, substituting `fallback` when the file is
    /// missing or does not parse. A malformed file is reported and reset on
    /// the next update rather than aborting startup.
    pub fn open_with(path: impl Into<PathBuf>, fallback: T) -> Self {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "malformed document, starting from a clean state"
                    );
                    fallback
                }
            },
            Err(_) => fallback,
        };

        Self {
            path,
            document: Arc::new(Mutex::new(document)),
        }
    }

    /// Runs `f` against the current document without touching disk.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Runs `f` against the document, then writes the whole document back to
    /// its file before the lock is released. Concurrent updates serialize on
    /// the document mutex, so read-modify-write cycles never interleave.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        let value = f(&mut guard);
        let json = serde_json::to_vec_pretty(&*guard)
            .with_context(|| format!("failed to serialize {}", self.path.display()))?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to persist {}", self.path.display()))?;
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.document
            .lock()
            .map_err(|_| anyhow!("document mutex poisoned: {}", self.path.display()))
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with(path, T::default())
    }
}
