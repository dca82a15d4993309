//! Sharing of derivations between subscribers.
//!
//! A [`Memo`] maps the serialized arguments of a derivation to a single
//! [`Shared`] handle. The handle owns a task driving the derived stream and
//! broadcasting its latest item; every subscriber reads from that one task.
//! The memo only keeps weak references, so the task is aborted and the entry
//! removed as soon as the last handle (or subscription stream) is dropped.
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;
use tracing::warn;

use crate::QueryError;
use crate::QueryStream;

type Latest<T> = Option<Result<Arc<T>, QueryError>>;
type Registry<T> = DashMap<String, Weak<Shared<T>>>;

/// A derivation shared by all subscribers using the same arguments.
pub struct Shared<T> {
    key: String,
    name: &'static str,
    latest: watch::Receiver<Latest<T>>,
    driver: JoinHandle<()>,
    registry: Weak<Registry<T>>,
}

impl<T> Shared<T>
where
    T: Send + Sync + 'static,
{
    fn spawn(
        name: &'static str,
        key: String,
        mut source: QueryStream<T>,
        registry: Weak<Registry<T>>,
    ) -> Self {
        let (tx, latest) = watch::channel(None);

        let driver = tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let failed = item.is_err();
                tx.send_replace(Some(item.map(Arc::new)));
                if failed {
                    break;
                }
            }
        });

        Self {
            key,
            name,
            latest,
            driver,
            registry,
        }
    }

    /// The serialized arguments identifying this derivation.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The most recent item, if the derivation produced one yet.
    pub fn latest(&self) -> Latest<T> {
        self.latest.borrow().clone()
    }

    /// Streams the current item followed by every new one.
    ///
    /// The stream keeps the derivation alive until it is dropped.
    pub fn subscribe(self: &Arc<Self>) -> QueryStream<Arc<T>> {
        let handle = Arc::clone(self);
        WatchStream::new(self.latest.clone())
            .filter_map(move |item| {
                let _alive = &handle;
                futures_util::future::ready(item)
            })
            .boxed()
    }

    /// Waits for the first item.
    pub async fn first(self: &Arc<Self>) -> Result<Arc<T>, QueryError> {
        match self.subscribe().next().await {
            Some(item) => item,
            None => Err(QueryError::Backend(format!(
                "derivation `{}` ended without a value",
                self.name
            ))),
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.driver.abort();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(&self.key, |_, entry| entry.strong_count() == 0);
        }
        counter!("stk_derive_subscriptions_released_total", "derive" => self.name).increment(1);
        debug!("released derivation. derive: {} key: {}", self.name, self.key);
    }
}

/// Caches derivations by their arguments.
pub struct Memo<A, T> {
    name: &'static str,
    registry: Arc<Registry<T>>,
    derive: Box<dyn Fn(&A) -> QueryStream<T> + Send + Sync>,
    _args: PhantomData<fn(&A)>,
}

impl<A, T> Memo<A, T>
where
    A: Serialize + Debug,
    T: Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        derive: impl Fn(&A) -> QueryStream<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            registry: Arc::new(DashMap::new()),
            derive: Box::new(derive),
            _args: PhantomData,
        }
    }

    /// Returns the shared derivation for `args`, starting it if nobody is
    /// subscribed to it yet. Must be called within a Tokio runtime.
    ///
    /// The derivation is started without holding the map lock, so it may
    /// itself depend on other entries of the same memo.
    pub fn get(
        &self,
        args: &A,
    ) -> Arc<Shared<T>> {
        let key = self.key(args);

        if let Some(shared) = self.lookup(&key) {
            counter!("stk_derive_subscriptions_reused_total", "derive" => self.name).increment(1);
            return shared;
        }

        let started = self.start(key.clone(), args);
        let (shared, raced) = match self.registry.entry(key) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => (existing, Some(started)),
                None => {
                    entry.insert(Arc::downgrade(&started));
                    (started, None)
                },
            },
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(&started));
                (started, None)
            },
        };

        // Released only after the entry lock, its drop touches the map.
        if raced.is_some() {
            counter!("stk_derive_subscriptions_reused_total", "derive" => self.name).increment(1);
        }
        drop(raced);

        shared
    }

    fn lookup(
        &self,
        key: &str,
    ) -> Option<Arc<Shared<T>>> {
        self.registry.get(key).and_then(|entry| entry.upgrade())
    }

    /// Number of live derivations.
    pub fn len(&self) -> usize {
        self.registry
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start(
        &self,
        key: String,
        args: &A,
    ) -> Arc<Shared<T>> {
        counter!("stk_derive_subscriptions_created_total", "derive" => self.name).increment(1);
        debug!("starting derivation. derive: {} key: {}", self.name, key);

        Arc::new(Shared::spawn(
            self.name,
            key,
            (self.derive)(args),
            Arc::downgrade(&self.registry),
        ))
    }

    fn key(
        &self,
        args: &A,
    ) -> String {
        serde_json::to_string(args).unwrap_or_else(|err| {
            warn!(
                "arguments are not serializable, keying on their debug form. derive: {} err: {}",
                self.name, err
            );
            format!("{args:?}")
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::time::Duration;

    use futures_util::stream;
    use futures_util::StreamExt;
    use futures_util::TryStreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    fn counting_memo() -> (Memo<u32, u32>, Arc<std::sync::atomic::AtomicUsize>) {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let memo = Memo::new("test", move |value: &u32| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            stream::iter([Ok(*value * 10)])
                .chain(stream::pending())
                .boxed()
        });
        (memo, calls)
    }

    #[tokio::test]
    async fn identical_arguments_share_one_handle() -> anyhow::Result<()> {
        let (memo, calls) = counting_memo();

        let a = memo.get(&1);
        let b = memo.get(&1);
        let c = memo.get(&2);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(memo.len(), 2);

        assert_eq!(*a.first().await?, 10);
        assert_eq!(*c.first().await?, 20);

        Ok(())
    }

    #[tokio::test]
    async fn last_handle_tears_the_derivation_down() {
        let (memo, calls) = counting_memo();

        let a = memo.get(&1);
        let b = memo.get(&1);
        drop(a);
        assert_eq!(memo.len(), 1);

        drop(b);
        assert!(memo.is_empty());
        assert!(memo.registry.is_empty());

        let _again = memo.get(&1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_subscription_keeps_the_derivation_alive() -> anyhow::Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(parking_lot::Mutex::new(Some(
            UnboundedReceiverStream::new(rx).boxed(),
        )));
        let memo: Memo<&str, u32> = Memo::new("test", move |_| {
            source.lock().take().unwrap_or_else(|| stream::pending().boxed())
        });

        let mut updates = memo.get(&"key").subscribe();
        assert!(memo.len() == 1);

        tx.send(Ok(1))?;
        assert_eq!(updates.next().await.transpose()?.as_deref(), Some(&1));
        tx.send(Ok(2))?;
        assert_eq!(updates.next().await.transpose()?.as_deref(), Some(&2));

        drop(updates);
        assert!(memo.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn errors_reach_every_subscriber() {
        let memo: Memo<u8, u32> = Memo::new("test", |_| {
            stream::iter([Err(QueryError::Backend("down".into()))]).boxed()
        });

        let shared = memo.get(&0);
        let mut first = shared.subscribe();
        let mut second = shared.subscribe();

        let expected = Some(Err(QueryError::Backend("down".into())));
        assert_eq!(first.next().await, expected);
        assert_eq!(second.next().await, expected);
        assert_eq!(first.next().await, None);
    }

    #[tokio::test]
    async fn derivations_may_depend_on_the_same_memo() -> anyhow::Result<()> {
        let cell: Arc<OnceLock<Memo<u32, u32>>> = Arc::new(OnceLock::new());
        let lower = Arc::clone(&cell);
        let memo = cell.get_or_init(|| {
            Memo::new("test", move |depth: &u32| {
                match (depth.checked_sub(1), lower.get()) {
                    (Some(below), Some(memo)) => memo
                        .get(&below)
                        .subscribe()
                        .map_ok(|value| *value + 1)
                        .boxed(),
                    _ => stream::iter([Ok(0)]).chain(stream::pending()).boxed(),
                }
            })
        });

        let top = memo.get(&8);
        assert_eq!(memo.len(), 9);

        let value = tokio::time::timeout(Duration::from_secs(5), top.first()).await??;
        assert_eq!(*value, 8);

        Ok(())
    }
}
