//! An in-process chain-state backend.
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use stk_types::ChainSnapshot;
use stk_types::StorageKey;
use stk_types::StorageValue;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::QueryError;
use crate::QueryStream;
use crate::StateQuery;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read snapshot `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse snapshot `{path}`: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

struct Inner {
    entries: RwLock<HashMap<StorageKey, StorageValue>>,
    failures: RwLock<HashMap<StorageKey, String>>,
    revision: watch::Sender<u64>,
    queries: AtomicU64,
    reads: AtomicU64,
}

impl Default for Inner {
    fn default() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            entries: RwLock::default(),
            failures: RwLock::default(),
            revision,
            queries: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }
}

impl Inner {
    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn read(
        &self,
        keys: &[StorageKey],
    ) -> Result<Vec<StorageValue>, QueryError> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let failures = self.failures.read();
        if let Some((key, reason)) = keys
            .iter()
            .find_map(|key| failures.get(key).map(|reason| (key, reason)))
        {
            return Err(QueryError::Backend(format!("reading {key}: {reason}")));
        }
        drop(failures);

        let entries = self.entries.read();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| key.default_value())
            })
            .collect())
    }
}

/// Chain state held in memory, notifying readers of every write.
///
/// Cloning is cheap and clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryState {
    inner: Arc<Inner>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ChainSnapshot) -> Self {
        let state = Self::new();
        state.replace(snapshot);
        state
    }

    /// Reads a JSON encoded [`ChainSnapshot`].
    pub fn read_snapshot(path: impl AsRef<Path>) -> Result<ChainSnapshot, SnapshotError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn set(
        &self,
        key: StorageKey,
        value: StorageValue,
    ) {
        debug_assert!(key.accepts(&value), "{key} can not hold {}", value.name());
        self.inner.entries.write().insert(key, value);
        self.inner.bump();
    }

    pub fn remove(
        &self,
        key: &StorageKey,
    ) {
        if self.inner.entries.write().remove(key).is_some() {
            self.inner.bump();
        }
    }

    /// Writes several entries with a single notification.
    pub fn apply(
        &self,
        entries: impl IntoIterator<Item = (StorageKey, StorageValue)>,
    ) {
        self.inner.entries.write().extend(entries);
        self.inner.bump();
    }

    /// Replaces the whole state with `snapshot`.
    pub fn replace(
        &self,
        snapshot: ChainSnapshot,
    ) {
        let entries: HashMap<_, _> = snapshot.into_entries().into_iter().collect();
        info!("replacing chain state. entries: {}", entries.len());
        *self.inner.entries.write() = entries;
        self.inner.bump();
    }

    /// Makes every read touching `key` fail with `reason`.
    pub fn fail(
        &self,
        key: StorageKey,
        reason: impl Into<String>,
    ) {
        self.inner.failures.write().insert(key, reason.into());
        self.inner.bump();
    }

    pub fn clear_failure(
        &self,
        key: &StorageKey,
    ) {
        if self.inner.failures.write().remove(key).is_some() {
            self.inner.bump();
        }
    }

    /// Number of multi-read subscriptions opened so far.
    pub fn query_count(&self) -> u64 {
        self.inner.queries.load(Ordering::Relaxed)
    }

    /// Number of multi-reads served so far.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }
}

impl StateQuery for MemoryState {
    fn query_multi(
        &self,
        keys: Vec<StorageKey>,
    ) -> QueryStream<Vec<StorageValue>> {
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let mut revision = inner.revision.subscribe();

        Box::pin(async_stream::stream! {
            let mut last: Option<Vec<StorageValue>> = None;
            loop {
                revision.borrow_and_update();
                match inner.read(&keys) {
                    Ok(values) => {
                        if last.as_ref() != Some(&values) {
                            debug!("state changed. keys: {}", keys.len());
                            last = Some(values.clone());
                            yield Ok(values);
                        }
                    },
                    Err(err) => {
                        yield Err(err);
                        break;
                    },
                }
                if revision.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use stk_types::AccountId;

    use super::*;

    #[tokio::test]
    async fn missing_entries_read_as_defaults() {
        let state = MemoryState::new();
        let id = AccountId::new([1; 32]);

        let mut values = state.query_multi(vec![StorageKey::Bonded(id), StorageKey::CurrentEra]);

        assert_eq!(
            values.next().await,
            Some(Ok(vec![
                StorageValue::Bonded(None),
                StorageValue::CurrentEra(0)
            ]))
        );
        assert_eq!(state.query_count(), 1);
    }

    #[tokio::test]
    async fn only_relevant_changes_re_emit() {
        let state = MemoryState::new();
        let id = AccountId::new([1; 32]);
        let mut values = state.query_multi(vec![StorageKey::CurrentEra]);
        assert_eq!(
            values.next().await,
            Some(Ok(vec![StorageValue::CurrentEra(0)]))
        );

        state.set(StorageKey::Bonded(id), StorageValue::Bonded(Some(id)));
        state.set(StorageKey::CurrentEra, StorageValue::CurrentEra(3));

        assert_eq!(
            values.next().await,
            Some(Ok(vec![StorageValue::CurrentEra(3)]))
        );
    }

    #[tokio::test]
    async fn failures_end_the_stream() {
        let state = MemoryState::new();
        let mut values = state.query_multi(vec![StorageKey::QueuedKeys]);
        assert!(matches!(values.next().await, Some(Ok(_))));

        state.fail(StorageKey::QueuedKeys, "rpc timeout");

        assert_eq!(
            values.next().await,
            Some(Err(QueryError::Backend(
                "reading queuedKeys(): rpc timeout".into()
            )))
        );
        assert_eq!(values.next().await, None);
    }

    #[test]
    fn snapshot_file_errors_name_the_path() {
        let err = MemoryState::read_snapshot("/nonexistent/snapshot.json").unwrap_err();

        assert!(err.to_string().contains("/nonexistent/snapshot.json"));
    }
}
