//! Push-based delivery of query results.
//!
//! A compiled query is pull-based; this module bridges it to observers.
//! Publishing recomputes the result once and hands every registered
//! observer its own delivery job on a shared worker pool.

/// Shared worker pool.
pub mod pool;
/// Observer registration, delivery and cancellation.
pub mod subscription;

pub use pool::{ThreadPool, ThreadPoolConfig};
pub use subscription::{
    DataObserver, DataPublisher, ErrorHandler, ObserverHandle, Subscription, SubscriptionBuilder,
    SubscriptionId,
};
