//! Compiled queries.
//!
//! A [`Query`] owns one compiled native plan. Every execution acquires a
//! cursor from the entity box (read-only for retrieval and aggregation,
//! read-write for removal), delegates to the native engine and releases the
//! cursor again. Engine failures are passed through unchanged.
//!
//! # Lifecycle
//! The native handle is released exactly once, by [`Query::close`] or when
//! the query is dropped. Closing takes the write side of a lock whose read
//! side every operation holds for the duration of its native call, so a
//! close waits for in-flight calls and later calls fail with
//! `ExecutionError::QueryClosed`.

mod builder;
mod lazy;
mod parameter;
mod publisher;

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::engine::{CursorHandle, EngineResult, EntityId, QueryEngine, QueryHandle};
use crate::error::{ExecutionError, QueryError, QueryResult};
use crate::property::Property;
use crate::reactive::{DataPublisher, SubscriptionBuilder};
use crate::storage::EntityBox;

pub use builder::QueryBuilder;
pub use lazy::LazyList;
pub use parameter::{IntoParameter, ParameterRange, ParameterValue, RangeParameter};
pub use publisher::QueryPublisher;

/// State shared between a query and its publisher.
pub(crate) struct QueryCore<B: EntityBox> {
    entity_box: Arc<B>,
    handle: RwLock<Option<QueryHandle>>,
    has_order: bool,
}

impl<B: EntityBox> QueryCore<B> {
    /// Runs a native call that needs no cursor.
    pub(crate) fn with_handle<R>(
        &self,
        f: impl FnOnce(&dyn QueryEngine<B::Entity>, QueryHandle) -> EngineResult<R>,
    ) -> QueryResult<R> {
        let guard = self
            .handle
            .read()
            .map_err(|_| QueryError::internal("poisoned lock: query handle"))?;
        let handle = (*guard).ok_or(ExecutionError::QueryClosed)?;
        Ok(f(self.entity_box.engine(), handle)?)
    }

    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&dyn QueryEngine<B::Entity>, QueryHandle, CursorHandle) -> EngineResult<R>,
    ) -> QueryResult<R> {
        let guard = self
            .handle
            .read()
            .map_err(|_| QueryError::internal("poisoned lock: query handle"))?;
        let handle = (*guard).ok_or(ExecutionError::QueryClosed)?;
        let engine = self.entity_box.engine();
        self.entity_box
            .with_read_cursor(|cursor| Ok(f(engine, handle, cursor)?))
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&dyn QueryEngine<B::Entity>, QueryHandle, CursorHandle) -> EngineResult<R>,
    ) -> QueryResult<R> {
        let guard = self
            .handle
            .read()
            .map_err(|_| QueryError::internal("poisoned lock: query handle"))?;
        let handle = (*guard).ok_or(ExecutionError::QueryClosed)?;
        let engine = self.entity_box.engine();
        self.entity_box
            .with_write_cursor(|cursor| Ok(f(engine, handle, cursor)?))
    }

    pub(crate) fn find_all(&self) -> QueryResult<Vec<B::Entity>> {
        self.read(|engine, query, cursor| engine.find(query, cursor, 0, 0))
    }

    /// Releases the native handle; returns whether this call released it.
    fn close(&self) -> QueryResult<bool> {
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = guard.take() else {
            return Ok(false);
        };
        debug!(%handle, "releasing query");
        self.entity_box.engine().destroy(handle)?;
        Ok(true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.handle
            .read()
            .map_or(true, |guard| guard.is_none())
    }

    pub(crate) fn entity_box(&self) -> &Arc<B> {
        &self.entity_box
    }
}

/// A compiled query over the entities of one box.
pub struct Query<B: EntityBox> {
    core: Arc<QueryCore<B>>,
    publisher: OnceLock<Arc<QueryPublisher<B>>>,
}

impl<B: EntityBox> Query<B> {
    pub(crate) fn new(entity_box: Arc<B>, handle: QueryHandle, has_order: bool) -> Self {
        Self {
            core: Arc::new(QueryCore {
                entity_box,
                handle: RwLock::new(Some(handle)),
                has_order,
            }),
            publisher: OnceLock::new(),
        }
    }

    /// Whether the plan carries explicit sort keys.
    #[must_use]
    pub fn has_order(&self) -> bool {
        self.core.has_order
    }

    /// Whether the native handle was released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Box this query runs against.
    #[must_use]
    pub fn entity_box(&self) -> &Arc<B> {
        self.core.entity_box()
    }

    /// First match in plan order, if any.
    pub fn find_first(&self) -> QueryResult<Option<B::Entity>> {
        self.core.read(|engine, query, cursor| engine.find_first(query, cursor))
    }

    /// The single match, if any.
    ///
    /// # Errors
    ///
    /// `ExecutionError::NonUniqueResult` if more than one row matches.
    pub fn find_unique(&self) -> QueryResult<Option<B::Entity>> {
        let mut rows = self
            .core
            .read(|engine, query, cursor| engine.find_unique(query, cursor))?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            count => Err(ExecutionError::NonUniqueResult { count }.into()),
        }
    }

    /// All matches in plan order.
    pub fn find(&self) -> QueryResult<Vec<B::Entity>> {
        self.core.find_all()
    }

    /// A window of matches; zero `offset`/`limit` mean unbounded.
    pub fn find_range(&self, offset: u64, limit: u64) -> QueryResult<Vec<B::Entity>> {
        self.core
            .read(|engine, query, cursor| engine.find(query, cursor, offset, limit))
    }

    /// Ids of all matches, without materializing entities.
    ///
    /// # Errors
    ///
    /// `ExecutionError::UnsupportedRetrieval` for ordered plans; the engine
    /// is not called in that case.
    pub fn find_ids(&self) -> QueryResult<Vec<EntityId>> {
        if self.core.has_order {
            return Err(ExecutionError::UnsupportedRetrieval {
                reason: "ids are only available for unordered queries".to_string(),
            }
            .into());
        }
        self.core
            .read(|engine, query, cursor| engine.find_ids_unordered(query, cursor))
    }

    /// Matches materialized on access, fetched again on every access.
    pub fn find_lazy(&self) -> QueryResult<LazyList<B>> {
        let ids = self.find_ids()?;
        Ok(LazyList::new(Arc::clone(self.core.entity_box()), ids, false))
    }

    /// Matches materialized on first access and kept.
    pub fn find_lazy_cached(&self) -> QueryResult<LazyList<B>> {
        let ids = self.find_ids()?;
        Ok(LazyList::new(Arc::clone(self.core.entity_box()), ids, true))
    }

    /// Number of matching entities.
    pub fn count(&self) -> QueryResult<u64> {
        self.core.read(|engine, query, cursor| engine.count(query, cursor))
    }

    /// Sum of an integer property over the matches.
    pub fn sum(&self, property: &Property) -> QueryResult<i64> {
        let id = property.id();
        self.core.read(|engine, query, cursor| engine.sum(query, cursor, id))
    }

    /// Sum of a float property.
    pub fn sum_double(&self, property: &Property) -> QueryResult<f64> {
        let id = property.id();
        self.core
            .read(|engine, query, cursor| engine.sum_double(query, cursor, id))
    }

    /// Largest integer value; 0 when nothing matches.
    pub fn max(&self, property: &Property) -> QueryResult<i64> {
        let id = property.id();
        self.core.read(|engine, query, cursor| engine.max(query, cursor, id))
    }

    /// Largest float value; 0.0 when nothing matches.
    pub fn max_double(&self, property: &Property) -> QueryResult<f64> {
        let id = property.id();
        self.core
            .read(|engine, query, cursor| engine.max_double(query, cursor, id))
    }

    /// Smallest integer value; 0 when nothing matches.
    pub fn min(&self, property: &Property) -> QueryResult<i64> {
        let id = property.id();
        self.core.read(|engine, query, cursor| engine.min(query, cursor, id))
    }

    /// Smallest float value; 0.0 when nothing matches.
    pub fn min_double(&self, property: &Property) -> QueryResult<f64> {
        let id = property.id();
        self.core
            .read(|engine, query, cursor| engine.min_double(query, cursor, id))
    }

    /// Mean value; NaN when nothing matches.
    pub fn avg(&self, property: &Property) -> QueryResult<f64> {
        let id = property.id();
        self.core.read(|engine, query, cursor| engine.avg(query, cursor, id))
    }

    /// Deletes every match under a write cursor. Returns the number removed.
    pub fn remove(&self) -> QueryResult<u64> {
        self.core.write(|engine, query, cursor| engine.remove(query, cursor))
    }

    /// Engine description of the compiled plan.
    pub fn describe(&self) -> QueryResult<String> {
        self.core.with_handle(|engine, query| engine.describe(query))
    }

    /// Engine description of the currently bound parameters.
    pub fn describe_parameters(&self) -> QueryResult<String> {
        self.core
            .with_handle(|engine, query| engine.describe_parameters(query))
    }

    /// Builder for an observer of this query's results.
    ///
    /// The observer receives the current results right away (unless
    /// `only_changes()`), then again on every publish. On a closed query
    /// `observer(..)` fails with `ExecutionError::QueryClosed`.
    pub fn subscribe(&self) -> SubscriptionBuilder<Vec<B::Entity>> {
        let publisher: Arc<dyn DataPublisher<Vec<B::Entity>>> = Arc::clone(self.publisher()) as _;
        SubscriptionBuilder::new(publisher, self.core.entity_box().thread_pool().clone())
    }

    /// Recomputes the results and pushes them to every subscriber now.
    pub fn publish(&self) {
        self.publisher().publish();
    }

    /// Releases the native handle and detaches all subscribers.
    ///
    /// Safe to call repeatedly and concurrently; only the first call reaches
    /// the engine.
    ///
    /// # Errors
    ///
    /// Engine failure while destroying the plan. The handle is considered
    /// released either way.
    pub fn close(&self) -> QueryResult<()> {
        // Handle before publisher: a concurrent subscribe is drained or rejected.
        let released = self.core.close();
        if let Some(publisher) = self.publisher.get() {
            publisher.shutdown();
        }
        released.map(|_| ())
    }

    fn publisher(&self) -> &Arc<QueryPublisher<B>> {
        self.publisher
            .get_or_init(|| QueryPublisher::new(Arc::clone(&self.core)))
    }
}

impl<B: EntityBox> Drop for Query<B> {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.get() {
            publisher.shutdown();
        }
        match self.core.close() {
            Ok(true) => {
                if cfg!(debug_assertions) {
                    warn!("query dropped without close(); released by drop");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "failed to release query on drop"),
        }
    }
}

impl<B: EntityBox> std::fmt::Debug for Query<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("has_order", &self.core.has_order)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
