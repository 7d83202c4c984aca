//! Observer registration and delivery.
//!
//! A publisher computes data; each registered observer gets its own delivery
//! job on its scheduler. Observers of the same publisher can therefore be
//! notified concurrently, and one observer's notifications may arrive on
//! different worker threads. Subscription order is not a delivery order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

use super::pool::ThreadPool;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives published data.
pub trait DataObserver<T>: Send + Sync {
    /// Called on a worker thread with one snapshot.
    fn on_data(&self, data: T);
}

impl<T, F> DataObserver<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn on_data(&self, data: T) {
        self(data);
    }
}

/// Receives failures raised while computing published data.
pub type ErrorHandler = Arc<dyn Fn(&QueryError) + Send + Sync>;

/// An observer bound to its delivery scheduler.
pub struct ObserverHandle<T> {
    id: SubscriptionId,
    observer: Arc<dyn DataObserver<T>>,
    on_error: Option<ErrorHandler>,
    scheduler: ThreadPool,
    canceled: Arc<AtomicBool>,
}

impl<T> Clone for ObserverHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            observer: Arc::clone(&self.observer),
            on_error: self.on_error.clone(),
            scheduler: self.scheduler.clone(),
            canceled: Arc::clone(&self.canceled),
        }
    }
}

impl<T> fmt::Debug for ObserverHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.id)
            .field("canceled", &self.canceled.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ObserverHandle<T> {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether delivery stopped.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Marks the observer canceled from the publisher side.
    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Queues `data` for this observer. Skipped if canceled before it runs.
    pub fn deliver(&self, data: T) {
        let observer = Arc::clone(&self.observer);
        let canceled = Arc::clone(&self.canceled);
        let queued = self.scheduler.execute(move || {
            if !canceled.load(Ordering::Acquire) {
                observer.on_data(data);
            }
        });
        if let Err(e) = queued {
            warn!(subscription = %self.id, error = %e, "dropping notification");
        }
    }

    /// Reports a publish failure to the error handler, or logs it. Canceled
    /// observers get nothing.
    pub fn fail(&self, error: Arc<QueryError>) {
        if self.is_canceled() {
            return;
        }
        let Some(handler) = self.on_error.clone() else {
            warn!(subscription = %self.id, error = %error, "publish failed and no error handler is set");
            return;
        };
        let canceled = Arc::clone(&self.canceled);
        let queued = self.scheduler.execute(move || {
            if !canceled.load(Ordering::Acquire) {
                handler(&error);
            }
        });
        if let Err(e) = queued {
            warn!(subscription = %self.id, error = %e, "dropping error notification");
        }
    }
}

/// Source of data for observers.
pub trait DataPublisher<T>: Send + Sync {
    /// Registers an observer for future publishes without delivering.
    ///
    /// # Errors
    ///
    /// The publisher no longer accepts observers.
    fn subscribe(&self, handle: ObserverHandle<T>) -> QueryResult<()>;

    /// Computes current data once and delivers it to `handle` only.
    ///
    /// # Errors
    ///
    /// The publisher can no longer compute data.
    fn publish_single(&self, handle: ObserverHandle<T>) -> QueryResult<()>;

    /// Removes an observer. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Configures and registers one observer.
pub struct SubscriptionBuilder<T> {
    publisher: Arc<dyn DataPublisher<T>>,
    scheduler: ThreadPool,
    single: bool,
    only_changes: bool,
    on_error: Option<ErrorHandler>,
}

impl<T: Send + 'static> SubscriptionBuilder<T> {
    /// Builder delivering on `scheduler`.
    #[must_use]
    pub fn new(publisher: Arc<dyn DataPublisher<T>>, scheduler: ThreadPool) -> Self {
        Self {
            publisher,
            scheduler,
            single: false,
            only_changes: false,
            on_error: None,
        }
    }

    /// Deliver the current data once, then stay unregistered.
    #[must_use]
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Skip the initial snapshot; only later publishes are delivered.
    #[must_use]
    pub fn only_changes(mut self) -> Self {
        self.only_changes = true;
        self
    }

    /// Receives failures while publishing. Without it they are logged.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Deliver on a different pool.
    #[must_use]
    pub fn on(mut self, scheduler: ThreadPool) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Registers `observer` and, unless `only_changes`, queues the initial snapshot.
    ///
    /// # Errors
    ///
    /// Invalid argument if both `single()` and `only_changes()` were requested.
    /// Publisher refusals (for example `QueryClosed`) are returned unchanged
    /// and leave nothing registered.
    pub fn observer(self, observer: impl DataObserver<T> + 'static) -> QueryResult<Subscription<T>> {
        if self.single && self.only_changes {
            return Err(QueryError::invalid_argument(
                "subscription",
                "single() and only_changes() are mutually exclusive",
            ));
        }

        let id = SubscriptionId::new();
        let canceled = Arc::new(AtomicBool::new(false));
        let handle = ObserverHandle {
            id,
            observer: Arc::new(observer),
            on_error: self.on_error,
            scheduler: self.scheduler,
            canceled: Arc::clone(&canceled),
        };

        if !self.single {
            self.publisher.subscribe(handle.clone())?;
        }
        if !self.only_changes {
            if let Err(e) = self.publisher.publish_single(handle) {
                canceled.store(true, Ordering::Release);
                self.publisher.unsubscribe(id);
                return Err(e);
            }
        }

        Ok(Subscription {
            id,
            publisher: Arc::downgrade(&self.publisher),
            canceled,
            registered: !self.single,
        })
    }
}

/// A registered observer.
///
/// Dropping a registered subscription cancels it. A `single()` subscription
/// is never registered and is not canceled by drop.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription<T> {
    id: SubscriptionId,
    publisher: Weak<dyn DataPublisher<T>>,
    canceled: Arc<AtomicBool>,
    registered: bool,
}

impl<T> Subscription<T> {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether delivery stopped.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Stops delivery. Idempotent; queued notifications are skipped.
    pub fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.unsubscribe(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.registered {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crossbeam_channel::{unbounded, Sender};

    use crate::reactive::ThreadPoolConfig;

    /// Publisher that hands out a fixed value.
    #[derive(Default)]
    struct FixedPublisher {
        value: u32,
        observers: Mutex<Vec<ObserverHandle<u32>>>,
    }

    impl FixedPublisher {
        fn publish(&self) {
            for handle in self.observers.lock().unwrap().iter() {
                handle.deliver(self.value);
            }
        }
    }

    impl DataPublisher<u32> for FixedPublisher {
        fn subscribe(&self, handle: ObserverHandle<u32>) -> QueryResult<()> {
            self.observers.lock().unwrap().push(handle);
            Ok(())
        }

        fn publish_single(&self, handle: ObserverHandle<u32>) -> QueryResult<()> {
            handle.deliver(self.value);
            Ok(())
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            self.observers.lock().unwrap().retain(|h| h.id() != id);
        }
    }

    fn pool() -> ThreadPool {
        ThreadPool::new(ThreadPoolConfig {
            workers: 2,
            thread_name_prefix: "sub-test".to_string(),
        })
        .unwrap()
    }

    fn sender_observer(tx: Sender<u32>) -> impl Fn(u32) + Send + Sync {
        move |v| {
            let _ = tx.send(v);
        }
    }

    #[test]
    fn test_observer_gets_initial_snapshot() {
        let publisher = Arc::new(FixedPublisher { value: 7, ..Default::default() });
        let (tx, rx) = unbounded();
        let sub = SubscriptionBuilder::new(publisher.clone() as Arc<dyn DataPublisher<u32>>, pool())
            .observer(sender_observer(tx))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        assert_eq!(publisher.observers.lock().unwrap().len(), 1);
        sub.cancel();
        assert!(sub.is_canceled());
        assert!(publisher.observers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_only_changes_skips_initial_snapshot() {
        let publisher = Arc::new(FixedPublisher { value: 3, ..Default::default() });
        let (tx, rx) = unbounded();
        let _sub = SubscriptionBuilder::new(publisher.clone() as Arc<dyn DataPublisher<u32>>, pool())
            .only_changes()
            .observer(sender_observer(tx))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        publisher.publish();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 3);
    }

    #[test]
    fn test_single_does_not_register() {
        let publisher = Arc::new(FixedPublisher { value: 5, ..Default::default() });
        let (tx, rx) = unbounded();
        let sub = SubscriptionBuilder::new(publisher.clone() as Arc<dyn DataPublisher<u32>>, pool())
            .single()
            .observer(sender_observer(tx))
            .unwrap();
        drop(sub);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 5);
        assert!(publisher.observers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_and_only_changes_rejected() {
        let publisher: Arc<dyn DataPublisher<u32>> = Arc::new(FixedPublisher::default());
        let err = SubscriptionBuilder::new(publisher, pool())
            .single()
            .only_changes()
            .observer(|_: u32| {})
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_drop_cancels_registered_subscription() {
        let publisher = Arc::new(FixedPublisher::default());
        let sub = SubscriptionBuilder::new(publisher.clone() as Arc<dyn DataPublisher<u32>>, pool())
            .only_changes()
            .observer(|_: u32| {})
            .unwrap();
        assert_eq!(publisher.observers.lock().unwrap().len(), 1);
        drop(sub);
        assert!(publisher.observers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_handler_receives_failure() {
        let publisher: Arc<dyn DataPublisher<u32>> = Arc::new(FixedPublisher::default());
        let (tx, rx) = unbounded();
        let handle = ObserverHandle {
            id: SubscriptionId::new(),
            observer: Arc::new(|_: u32| {}),
            on_error: Some(Arc::new(move |e: &QueryError| {
                let _ = tx.send(e.to_string());
            })),
            scheduler: pool(),
            canceled: Arc::new(AtomicBool::new(false)),
        };
        drop(publisher);
        handle.fail(Arc::new(QueryError::internal("boom")));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().contains("boom"));

        handle.cancel();
        handle.fail(Arc::new(QueryError::internal("late")));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    /// Publisher that refuses every observer.
    struct RefusingPublisher;

    impl DataPublisher<u32> for RefusingPublisher {
        fn subscribe(&self, _handle: ObserverHandle<u32>) -> QueryResult<()> {
            Err(crate::error::ExecutionError::QueryClosed.into())
        }

        fn publish_single(&self, _handle: ObserverHandle<u32>) -> QueryResult<()> {
            Err(crate::error::ExecutionError::QueryClosed.into())
        }

        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    #[test]
    fn test_refused_subscription_is_an_error() {
        let publisher: Arc<dyn DataPublisher<u32>> = Arc::new(RefusingPublisher);
        let err = SubscriptionBuilder::new(Arc::clone(&publisher), pool())
            .observer(|_: u32| {})
            .unwrap_err();
        assert!(err.is_closed());

        let err = SubscriptionBuilder::new(publisher, pool())
            .single()
            .observer(|_: u32| {})
            .unwrap_err();
        assert!(err.is_closed());
    }
}
