//! Abstract storage collaborator for boxquery.
//!
//! An `EntityBox` is the per-entity-type access point a compiled query runs
//! against. It lends cursors for exactly one call, materializes entities by
//! id, owns the native engine and the shared worker pool, and announces data
//! changes to registered listeners.

use std::fmt;
use std::sync::Arc;

use crate::engine::{CursorHandle, EntityId, QueryEngine};
use crate::error::QueryResult;
use crate::reactive::ThreadPool;

/// Callback invoked after the box's data changed.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Registration token returned by [`EntityBox::add_change_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}

/// Storage trait for one entity type.
///
/// # Cursor scoping
/// `with_read_cursor` and `with_write_cursor` must release the cursor on
/// every exit path, including when `f` fails. Isolation between readers and
/// writers is the implementation's responsibility; the query layer neither
/// starts nor commits transactions.
pub trait EntityBox: Send + Sync + 'static {
    /// Materialized entity type.
    type Entity: Clone + Send + Sync + 'static;

    /// Native engine that executes compiled plans for this box.
    fn engine(&self) -> &dyn QueryEngine<Self::Entity>;

    /// Runs `f` with a read-only cursor.
    fn with_read_cursor<R, F>(&self, f: F) -> QueryResult<R>
    where
        F: FnOnce(CursorHandle) -> QueryResult<R>;

    /// Runs `f` with a read-write cursor.
    fn with_write_cursor<R, F>(&self, f: F) -> QueryResult<R>
    where
        F: FnOnce(CursorHandle) -> QueryResult<R>;

    /// Materializes one entity; `Ok(None)` if it no longer exists.
    fn get(&self, id: EntityId) -> QueryResult<Option<Self::Entity>>;

    /// Process-wide worker pool used for reactive delivery.
    fn thread_pool(&self) -> &ThreadPool;

    /// Registers a listener for data changes of this entity type.
    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Removes a listener. Unknown ids are ignored.
    fn remove_change_listener(&self, id: ListenerId);
}
