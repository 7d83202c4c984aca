use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::error::{ExecutionError, QueryResult};
use crate::reactive::{DataPublisher, ObserverHandle, SubscriptionId};
use crate::storage::{ChangeListener, EntityBox, ListenerId};

use super::QueryCore;

/// Observers and the box listener, changed together under one lock.
///
/// Invariant: `listener` is `Some` exactly when `observers` is non-empty.
struct State<E> {
    observers: Vec<ObserverHandle<Vec<E>>>,
    listener: Option<ListenerId>,
    closed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes a query's results to its observers.
///
/// While at least one observer is registered the publisher listens for
/// changes to the box and republishes on each one.
pub struct QueryPublisher<B: EntityBox> {
    core: Arc<QueryCore<B>>,
    state: Arc<Mutex<State<B::Entity>>>,
    this: Weak<Self>,
}

impl<B: EntityBox> QueryPublisher<B> {
    pub(crate) fn new(core: Arc<QueryCore<B>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core,
            state: Arc::new(Mutex::new(State {
                observers: Vec::new(),
                listener: None,
                closed: false,
            })),
            this: this.clone(),
        })
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        lock(&self.state).observers.len()
    }

    /// Queues one recomputation; each current observer then gets its own
    /// delivery job.
    pub fn publish(&self) {
        let core = Arc::clone(&self.core);
        let state = Arc::clone(&self.state);
        let queued = self.core.entity_box().thread_pool().execute(move || {
            let targets: Vec<_> = lock(&state)
                .observers
                .iter()
                .filter(|handle| !handle.is_canceled())
                .cloned()
                .collect();
            if targets.is_empty() {
                return;
            }
            match core.find_all() {
                Ok(rows) => {
                    for handle in targets {
                        handle.deliver(rows.clone());
                    }
                }
                Err(e) if e.is_closed() => debug!("query closed during publish"),
                Err(e) => {
                    let e = Arc::new(e);
                    for handle in targets {
                        handle.fail(Arc::clone(&e));
                    }
                }
            }
        });
        if let Err(e) = queued {
            warn!(error = %e, "publish dropped");
        }
    }

    /// Detaches every observer and the change listener. Later subscriptions
    /// are rejected.
    pub(crate) fn shutdown(&self) {
        let drained = {
            let mut state = lock(&self.state);
            state.closed = true;
            let drained: Vec<_> = state.observers.drain(..).collect();
            for handle in &drained {
                handle.cancel();
            }
            self.detach_listener(&mut state);
            drained.len()
        };
        if drained > 0 {
            debug!(observers = drained, "query publisher shut down");
        }
    }

    fn ensure_open(&self, state: &State<B::Entity>) -> QueryResult<()> {
        if state.closed || self.core.is_closed() {
            return Err(ExecutionError::QueryClosed.into());
        }
        Ok(())
    }

    fn attach_listener(&self, state: &mut State<B::Entity>) {
        if state.listener.is_some() {
            return;
        }
        let this = self.this.clone();
        let on_change: ChangeListener = Arc::new(move || {
            if let Some(publisher) = this.upgrade() {
                publisher.publish();
            }
        });
        state.listener = Some(self.core.entity_box().add_change_listener(on_change));
    }

    fn detach_listener(&self, state: &mut State<B::Entity>) {
        if let Some(id) = state.listener.take() {
            self.core.entity_box().remove_change_listener(id);
        }
    }
}

impl<B: EntityBox> DataPublisher<Vec<B::Entity>> for QueryPublisher<B> {
    fn subscribe(&self, handle: ObserverHandle<Vec<B::Entity>>) -> QueryResult<()> {
        let mut state = lock(&self.state);
        self.ensure_open(&state)?;
        state.observers.push(handle);
        self.attach_listener(&mut state);
        Ok(())
    }

    fn publish_single(&self, handle: ObserverHandle<Vec<B::Entity>>) -> QueryResult<()> {
        self.ensure_open(&lock(&self.state))?;
        let core = Arc::clone(&self.core);
        let queued = self
            .core
            .entity_box()
            .thread_pool()
            .execute(move || match core.find_all() {
                Ok(rows) => handle.deliver(rows),
                Err(e) if e.is_closed() => debug!("query closed before initial publish"),
                Err(e) => handle.fail(Arc::new(e)),
            });
        if let Err(e) = queued {
            warn!(error = %e, "initial publish dropped");
        }
        Ok(())
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = lock(&self.state);
        state.observers.retain(|handle| handle.id() != id);
        if state.observers.is_empty() {
            self.detach_listener(&mut state);
        }
    }
}

impl<B: EntityBox> std::fmt::Debug for QueryPublisher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPublisher")
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}
