//! In-memory storage backend.
//!
//! This module provides a thread-safe in-memory implementation of the
//! storage collaborator and the native engine. It is intended for embedded
//! usage, tests, and as a reference implementation of the engine contract.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::engine::{CursorHandle, EngineError, EngineResult, EntityId, NativeQueryBuilder, QueryEngine, QueryHandle};
use crate::error::{QueryError, QueryResult};
use crate::property::PropertyId;
use crate::reactive::{ThreadPool, ThreadPoolConfig};
use crate::storage::plan::{MemoryQueryBuilder, Plan, PlanTable};
use crate::storage::traits::{ChangeListener, EntityBox, ListenerId};
use crate::time::{bool_to_int, epoch_millis};

fn lock_err(context: &'static str) -> EngineError {
    EngineError::Backend(format!("poisoned lock: {context}"))
}

/// Stored value of one property, as the engine sees it.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Whether no value is stored.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Int(bool_to_int(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for FieldValue {
    fn from(value: DateTime<Tz>) -> Self {
        Self::Int(epoch_millis(&value))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An entity the in-memory engine can store and evaluate.
pub trait Record: Clone + Send + Sync + 'static {
    /// Stored id; the default id means unassigned.
    fn id(&self) -> EntityId;

    /// Called by `put` to assign a fresh id.
    fn set_id(&mut self, id: EntityId);

    /// Current value of `property`; unknown properties read as `Null`.
    fn value(&self, property: PropertyId) -> FieldValue;
}

/// Configuration for [`MemoryBox::new`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBoxConfig {
    /// Worker pool for reactive delivery.
    pub pool: ThreadPoolConfig,
}

/// Cursor accounting, for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Read cursors opened so far.
    pub read_opened: u64,
    /// Write cursors opened so far.
    pub write_opened: u64,
    /// Cursors currently lent out.
    pub open: usize,
}

/// Engine accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Calls made through the `QueryEngine` trait.
    pub native_calls: u64,
    /// Plans built and not yet destroyed.
    pub live_plans: usize,
    /// Plans destroyed so far.
    pub destroyed_plans: u64,
}

#[derive(Debug, Default)]
struct CursorTable {
    next: AtomicU64,
    read_opened: AtomicU64,
    write_opened: AtomicU64,
    // cursor id -> is write cursor
    open: Mutex<BTreeMap<u64, bool>>,
}

impl CursorTable {
    fn open(&self, write: bool) -> CursorGuard<'_> {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        if write {
            self.write_opened.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_opened.fetch_add(1, Ordering::Relaxed);
        }
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, write);
        CursorGuard { table: self, id }
    }

    fn check(&self, cursor: CursorHandle, need_write: bool) -> EngineResult<()> {
        let open = self.open.lock().map_err(|_| lock_err("cursor table"))?;
        match open.get(&cursor.0) {
            None => Err(EngineError::Backend(format!("cursor {} is not open", cursor.0))),
            Some(false) if need_write => Err(EngineError::Backend(format!(
                "cursor {} is read-only",
                cursor.0
            ))),
            Some(_) => Ok(()),
        }
    }

    fn stats(&self) -> CursorStats {
        CursorStats {
            read_opened: self.read_opened.load(Ordering::Relaxed),
            write_opened: self.write_opened.load(Ordering::Relaxed),
            open: self.open.lock().map_or(0, |open| open.len()),
        }
    }
}

/// Closes its cursor on every exit path.
struct CursorGuard<'a> {
    table: &'a CursorTable,
    id: u64,
}

impl CursorGuard<'_> {
    const fn handle(&self) -> CursorHandle {
        CursorHandle(self.id)
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.table
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[derive(Default)]
struct Listeners {
    next: AtomicU64,
    registered: Mutex<BTreeMap<u64, ChangeListener>>,
}

/// State shared by a box and its engine.
struct Shared<T> {
    rows: RwLock<BTreeMap<EntityId, T>>,
    cursors: CursorTable,
    listeners: Listeners,
}

impl<T> Shared<T> {
    /// Runs every listener. Callers must not hold any lock of this module.
    fn notify(&self) {
        let listeners: Vec<ChangeListener> = self
            .listeners
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// In-memory native engine over rows of type `T`.
pub struct MemoryEngine<T> {
    shared: Arc<Shared<T>>,
    plans: Arc<PlanTable>,
    calls: AtomicU64,
}

impl<T: Record> MemoryEngine<T> {
    fn call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Current accounting.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            native_calls: self.calls.load(Ordering::Relaxed),
            live_plans: self.plans.live(),
            destroyed_plans: self.plans.destroyed(),
        }
    }

    fn with_plan<R>(&self, query: QueryHandle, f: impl FnOnce(&Plan) -> EngineResult<R>) -> EngineResult<R> {
        let plan = self.plans.get(query)?;
        let plan = plan.read().map_err(|_| lock_err("plan"))?;
        f(&plan)
    }

    fn with_plan_mut<R>(
        &self,
        query: QueryHandle,
        f: impl FnOnce(&mut Plan) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.call();
        let plan = self.plans.get(query)?;
        let mut plan = plan.write().map_err(|_| lock_err("plan"))?;
        f(&mut plan)
    }

    /// Matching rows in storage order.
    fn scan(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<T>> {
        self.shared.cursors.check(cursor, false)?;
        self.with_plan(query, |plan| {
            let rows = self.shared.rows.read().map_err(|_| lock_err("rows"))?;
            let mut matched = Vec::new();
            for row in rows.values() {
                if plan.matches(row)? {
                    matched.push(row.clone());
                }
            }
            Ok(matched)
        })
    }

    /// Matching rows in plan order.
    fn ordered(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<T>> {
        let mut rows = self.scan(query, cursor)?;
        self.with_plan(query, |plan| {
            plan.sort(&mut rows);
            Ok(())
        })?;
        Ok(rows)
    }

    fn ints(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<Vec<i64>> {
        self.scan(query, cursor)?
            .iter()
            .filter_map(|row| match row.value(property) {
                FieldValue::Null => None,
                FieldValue::Int(v) => Some(Ok(v)),
                other => Some(Err(EngineError::PropertyType {
                    property,
                    operation: format!("integer aggregate over {} values", other.kind()),
                })),
            })
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn floats(
        &self,
        query: QueryHandle,
        cursor: CursorHandle,
        property: PropertyId,
        allow_int: bool,
    ) -> EngineResult<Vec<f64>> {
        self.scan(query, cursor)?
            .iter()
            .filter_map(|row| match row.value(property) {
                FieldValue::Null => None,
                FieldValue::Float(v) => Some(Ok(v)),
                FieldValue::Int(v) if allow_int => Some(Ok(v as f64)),
                other => Some(Err(EngineError::PropertyType {
                    property,
                    operation: format!("floating aggregate over {} values", other.kind()),
                })),
            })
            .collect()
    }
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl<T: Record> QueryEngine<T> for MemoryEngine<T> {
    fn new_builder(&self) -> EngineResult<Box<dyn NativeQueryBuilder>> {
        self.call();
        Ok(Box::new(MemoryQueryBuilder::new(Arc::clone(&self.plans))))
    }

    fn find_first(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Option<T>> {
        self.call();
        Ok(self.ordered(query, cursor)?.into_iter().next())
    }

    fn find_unique(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<T>> {
        self.call();
        self.scan(query, cursor)
    }

    fn find(&self, query: QueryHandle, cursor: CursorHandle, offset: u64, limit: u64) -> EngineResult<Vec<T>> {
        self.call();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = match limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        Ok(self
            .ordered(query, cursor)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    fn find_ids_unordered(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<Vec<EntityId>> {
        self.call();
        Ok(self.scan(query, cursor)?.iter().map(Record::id).collect())
    }

    fn count(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<u64> {
        self.call();
        Ok(to_u64(self.scan(query, cursor)?.len()))
    }

    fn sum(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64> {
        self.call();
        self.ints(query, cursor, property)?
            .into_iter()
            .try_fold(0_i64, i64::checked_add)
            .ok_or(EngineError::Overflow { property })
    }

    fn sum_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64> {
        self.call();
        Ok(self.floats(query, cursor, property, false)?.into_iter().sum())
    }

    fn max(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64> {
        self.call();
        Ok(self.ints(query, cursor, property)?.into_iter().max().unwrap_or(0))
    }

    fn max_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64> {
        self.call();
        Ok(self
            .floats(query, cursor, property, false)?
            .into_iter()
            .reduce(f64::max)
            .unwrap_or(0.0))
    }

    fn min(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<i64> {
        self.call();
        Ok(self.ints(query, cursor, property)?.into_iter().min().unwrap_or(0))
    }

    fn min_double(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64> {
        self.call();
        Ok(self
            .floats(query, cursor, property, false)?
            .into_iter()
            .reduce(f64::min)
            .unwrap_or(0.0))
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg(&self, query: QueryHandle, cursor: CursorHandle, property: PropertyId) -> EngineResult<f64> {
        self.call();
        let values = self.floats(query, cursor, property, true)?;
        if values.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    fn remove(&self, query: QueryHandle, cursor: CursorHandle) -> EngineResult<u64> {
        self.call();
        self.shared.cursors.check(cursor, true)?;
        let removed = self.with_plan(query, |plan| {
            let mut rows = self.shared.rows.write().map_err(|_| lock_err("rows"))?;
            let mut doomed = Vec::new();
            for (id, row) in rows.iter() {
                if plan.matches(row)? {
                    doomed.push(*id);
                }
            }
            for id in &doomed {
                rows.remove(id);
            }
            Ok(doomed.len())
        })?;
        if removed > 0 {
            debug!(removed, "rows removed by query");
            self.shared.notify();
        }
        Ok(to_u64(removed))
    }

    fn set_parameter_text(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: &str,
    ) -> EngineResult<()> {
        self.with_plan_mut(query, |plan| plan.set_text(property, alias, value))
    }

    fn set_parameter_int(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: i64,
    ) -> EngineResult<()> {
        self.with_plan_mut(query, |plan| plan.set_int(property, alias, value))
    }

    fn set_parameter_float(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        value: f64,
    ) -> EngineResult<()> {
        self.with_plan_mut(query, |plan| plan.set_float(property, alias, value))
    }

    fn set_parameters_int(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        low: i64,
        high: i64,
    ) -> EngineResult<()> {
        self.with_plan_mut(query, |plan| plan.set_int_range(property, alias, low, high))
    }

    fn set_parameters_float(
        &self,
        query: QueryHandle,
        property: PropertyId,
        alias: Option<&str>,
        low: f64,
        high: f64,
    ) -> EngineResult<()> {
        self.with_plan_mut(query, |plan| plan.set_float_range(property, alias, low, high))
    }

    fn describe(&self, query: QueryHandle) -> EngineResult<String> {
        self.call();
        self.with_plan(query, |plan| Ok(plan.describe()))
    }

    fn describe_parameters(&self, query: QueryHandle) -> EngineResult<String> {
        self.call();
        self.with_plan(query, |plan| Ok(plan.describe_parameters()))
    }

    fn destroy(&self, query: QueryHandle) -> EngineResult<()> {
        self.call();
        self.plans.remove(query)
    }
}

/// Thread-safe in-memory entity box.
pub struct MemoryBox<T> {
    shared: Arc<Shared<T>>,
    engine: MemoryEngine<T>,
    pool: ThreadPool,
    next_id: AtomicU64,
}

impl<T: Record> MemoryBox<T> {
    /// Creates an empty box with its own worker pool.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the pool cannot start.
    pub fn new(config: MemoryBoxConfig) -> QueryResult<Self> {
        Ok(Self::with_pool(ThreadPool::new(config.pool)?))
    }

    /// Creates an empty box that delivers on an existing pool.
    #[must_use]
    pub fn with_pool(pool: ThreadPool) -> Self {
        let shared = Arc::new(Shared {
            rows: RwLock::new(BTreeMap::new()),
            cursors: CursorTable::default(),
            listeners: Listeners::default(),
        });
        Self {
            engine: MemoryEngine {
                shared: Arc::clone(&shared),
                plans: Arc::new(PlanTable::default()),
                calls: AtomicU64::new(0),
            },
            shared,
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores `record`, assigning an id if it has none. Returns the id.
    pub fn put(&self, record: T) -> QueryResult<EntityId> {
        let id = self.store(std::iter::once(record))?;
        Ok(id.into_iter().next().unwrap_or_default())
    }

    /// Stores several records with a single change notification.
    pub fn put_many(&self, records: impl IntoIterator<Item = T>) -> QueryResult<Vec<EntityId>> {
        self.store(records)
    }

    fn store(&self, records: impl IntoIterator<Item = T>) -> QueryResult<Vec<EntityId>> {
        let ids = {
            let mut rows = self
                .shared
                .rows
                .write()
                .map_err(|_| QueryError::internal("poisoned lock: rows"))?;
            let mut ids = Vec::new();
            for mut record in records {
                let id = if record.id().is_unassigned() {
                    let id = EntityId(self.next_id.fetch_add(1, Ordering::Relaxed));
                    record.set_id(id);
                    id
                } else {
                    let id = record.id();
                    self.next_id.fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
                    id
                };
                rows.insert(id, record);
                ids.push(id);
            }
            ids
        };
        if !ids.is_empty() {
            self.shared.notify();
        }
        Ok(ids)
    }

    /// Removes one entity. Returns whether it existed.
    pub fn remove(&self, id: EntityId) -> QueryResult<bool> {
        let existed = {
            self.shared
                .rows
                .write()
                .map_err(|_| QueryError::internal("poisoned lock: rows"))?
                .remove(&id)
                .is_some()
        };
        if existed {
            self.shared.notify();
        }
        Ok(existed)
    }

    /// Number of stored entities.
    pub fn count_all(&self) -> QueryResult<u64> {
        let rows = self
            .shared
            .rows
            .read()
            .map_err(|_| QueryError::internal("poisoned lock: rows"))?;
        Ok(to_u64(rows.len()))
    }

    /// Concrete engine behind [`EntityBox::engine`].
    #[must_use]
    pub fn memory_engine(&self) -> &MemoryEngine<T> {
        &self.engine
    }

    /// Cursor accounting.
    #[must_use]
    pub fn cursor_stats(&self) -> CursorStats {
        self.shared.cursors.stats()
    }

    /// Engine call counter and plan table counts.
    #[must_use]
    pub fn engine_stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Number of registered change listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Record> EntityBox for MemoryBox<T> {
    type Entity = T;

    fn engine(&self) -> &dyn QueryEngine<T> {
        &self.engine
    }

    fn with_read_cursor<R, F>(&self, f: F) -> QueryResult<R>
    where
        F: FnOnce(CursorHandle) -> QueryResult<R>,
    {
        let cursor = self.shared.cursors.open(false);
        f(cursor.handle())
    }

    fn with_write_cursor<R, F>(&self, f: F) -> QueryResult<R>
    where
        F: FnOnce(CursorHandle) -> QueryResult<R>,
    {
        let cursor = self.shared.cursors.open(true);
        f(cursor.handle())
    }

    fn get(&self, id: EntityId) -> QueryResult<Option<T>> {
        let rows = self
            .shared
            .rows
            .read()
            .map_err(|_| QueryError::internal("poisoned lock: rows"))?;
        Ok(rows.get(&id).cloned())
    }

    fn thread_pool(&self) -> &ThreadPool {
        &self.pool
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = self.shared.listeners.next.fetch_add(1, Ordering::Relaxed);
        self.shared
            .listeners
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        ListenerId(id)
    }

    fn remove_change_listener(&self, id: ListenerId) {
        self.shared
            .listeners
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0);
    }
}

impl<T> std::fmt::Debug for MemoryBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBox")
            .field("pool", &self.pool)
            .field("cursors", &self.shared.cursors.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionSink;
    use crate::property::{Property, PropertyType};
    use crate::query::QueryBuilder;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: EntityId,
        qty: Option<i64>,
        price: f64,
    }

    impl Record for Item {
        fn id(&self) -> EntityId {
            self.id
        }
        fn set_id(&mut self, id: EntityId) {
            self.id = id;
        }
        fn value(&self, property: PropertyId) -> FieldValue {
            match property.0 {
                1 => self.qty.into(),
                2 => self.price.into(),
                _ => FieldValue::Null,
            }
        }
    }

    const QTY: Property = Property::new(1, "qty", PropertyType::Long);
    const PRICE: Property = Property::new(2, "price", PropertyType::Double);

    fn item(qty: Option<i64>, price: f64) -> Item {
        Item {
            id: EntityId::default(),
            qty,
            price,
        }
    }

    fn items() -> Arc<MemoryBox<Item>> {
        let memory = MemoryBox::new(MemoryBoxConfig::default()).unwrap();
        memory
            .put_many(vec![item(Some(2), 1.5), item(Some(5), 2.5), item(None, 4.0)])
            .unwrap();
        Arc::new(memory)
    }

    #[test]
    fn test_put_assigns_sequential_ids() {
        let memory = items();
        assert_eq!(memory.count_all().unwrap(), 3);
        assert_eq!(memory.get(EntityId(2)).unwrap().unwrap().qty, Some(5));
        let id = memory.put(item(Some(9), 0.0)).unwrap();
        assert_eq!(id, EntityId(4));
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let memory = items();
        let query = QueryBuilder::new(Arc::clone(&memory)).unwrap().build().unwrap();
        assert_eq!(query.sum(&QTY).unwrap(), 7);
        assert_eq!(query.max(&QTY).unwrap(), 5);
        assert_eq!(query.min(&QTY).unwrap(), 2);
        assert!((query.avg(&QTY).unwrap() - 3.5).abs() < f64::EPSILON);
        assert!((query.sum_double(&PRICE).unwrap() - 8.0).abs() < f64::EPSILON);
        assert!((query.max_double(&PRICE).unwrap() - 4.0).abs() < f64::EPSILON);
        query.close().unwrap();
    }

    #[test]
    fn test_empty_aggregates() {
        let memory = items();
        let query = QueryBuilder::new(Arc::clone(&memory))
            .unwrap()
            .filter(QTY.greater(100))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(query.sum(&QTY).unwrap(), 0);
        assert_eq!(query.max(&QTY).unwrap(), 0);
        assert!(query.min_double(&PRICE).unwrap().abs() < f64::EPSILON);
        assert!(query.avg(&QTY).unwrap().is_nan());
        query.close().unwrap();
    }

    #[test]
    fn test_sum_overflow_is_reported() {
        let memory = Arc::new(MemoryBox::new(MemoryBoxConfig::default()).unwrap());
        memory
            .put_many(vec![item(Some(i64::MAX), 0.0), item(Some(1), 0.0)])
            .unwrap();
        let query = QueryBuilder::new(Arc::clone(&memory)).unwrap().build().unwrap();
        let err = query.sum(&QTY).unwrap_err();
        assert!(matches!(err, QueryError::Engine(EngineError::Overflow { .. })));
        query.close().unwrap();
    }

    #[test]
    fn test_integer_aggregate_on_float_property_fails() {
        let memory = items();
        let query = QueryBuilder::new(Arc::clone(&memory)).unwrap().build().unwrap();
        let err = query.sum(&PRICE).unwrap_err();
        assert!(matches!(err, QueryError::Engine(EngineError::PropertyType { .. })));
        query.close().unwrap();
    }

    #[test]
    fn test_engine_rejects_closed_or_read_only_cursor() {
        let memory = items();
        let engine = memory.memory_engine();
        let mut builder = engine.new_builder().unwrap();
        builder.not_null(&QTY).unwrap();
        let handle = builder.build().unwrap();

        assert!(engine.count(handle, CursorHandle(999)).is_err());
        let err = memory
            .with_read_cursor(|cursor| Ok(engine.remove(handle, cursor)?))
            .unwrap_err();
        assert!(err.is_engine());
        assert_eq!(memory.count_all().unwrap(), 3);
        assert_eq!(memory.cursor_stats().open, 0);
        engine.destroy(handle).unwrap();
    }

    #[test]
    fn test_listeners_run_after_writes() {
        let memory = items();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = memory.add_change_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        memory.put(item(Some(1), 1.0)).unwrap();
        memory.remove(EntityId(1)).unwrap();
        assert!(!memory.remove(EntityId(1)).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        memory.remove_change_listener(id);
        memory.put(item(Some(1), 1.0)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
