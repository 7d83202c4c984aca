//! # boxquery - Typed queries over an embedded object store
//!
//! boxquery is the query layer of an embedded object database. Callers build
//! typed conditions against entity properties, compile them through an opaque
//! native engine, and execute the compiled query for entities, ids, counts
//! and aggregates. Compiled queries can be re-parameterized without
//! recompiling and can push their results to observers.
//!
//! ## Core Concepts
//!
//! - **Property**: A typed descriptor of one stored field
//! - **Condition**: A predicate on one property, tagged by shape and operation
//! - **Query**: A compiled native plan plus the cursor discipline to run it
//! - **Alias**: A name that tells apart several conditions on the same property
//! - **Subscription**: An observer receiving result snapshots on a worker pool
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use boxquery::{
//!     EntityId, FieldValue, MemoryBox, MemoryBoxConfig, Property, PropertyId, PropertyType,
//!     QueryBuilder, Record,
//! };
//!
//! #[derive(Clone)]
//! struct Person {
//!     id: EntityId,
//!     age: i64,
//! }
//!
//! impl Record for Person {
//!     fn id(&self) -> EntityId {
//!         self.id
//!     }
//!     fn set_id(&mut self, id: EntityId) {
//!         self.id = id;
//!     }
//!     fn value(&self, property: PropertyId) -> FieldValue {
//!         match property.0 {
//!             1 => self.age.into(),
//!             _ => FieldValue::Null,
//!         }
//!     }
//! }
//!
//! const AGE: Property = Property::new(1, "age", PropertyType::Long);
//!
//! # fn main() -> boxquery::QueryResult<()> {
//! let people = Arc::new(MemoryBox::new(MemoryBoxConfig::default())?);
//! people.put(Person { id: EntityId::default(), age: 17 })?;
//! people.put(Person { id: EntityId::default(), age: 42 })?;
//!
//! let adults = QueryBuilder::new(Arc::clone(&people))?
//!     .filter(AGE.greater(17).alias("min_age"))?
//!     .build()?;
//! assert_eq!(adults.count()?, 1);
//!
//! adults.set_aliased_parameter(&AGE, "min_age", 10)?;
//! assert_eq!(adults.count()?, 2);
//! adults.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Typed conditions
pub mod condition;
pub mod error;
pub mod property;
pub mod time;

// Native boundary and storage collaborators
pub mod engine;
pub mod storage;

// Compiled queries and reactive delivery
pub mod query;
pub mod reactive;

// Re-export primary types at crate root for convenience
pub use condition::{
    Combinator, ConditionKind, ConditionSink, MembershipOperand, Operation, PropertyCondition,
    QueryCondition, RangeOperand, ScalarOperand, Shape,
};
pub use engine::{
    CursorHandle, EngineError, EngineResult, EntityId, NativeQueryBuilder, QueryEngine, QueryHandle,
};
pub use error::{ExecutionError, QueryError, QueryResult, ValidationError};
pub use property::{OrderFlags, Property, PropertyId, PropertyType, StringOrder};
pub use query::{
    IntoParameter, LazyList, ParameterRange, ParameterValue, Query, QueryBuilder, QueryPublisher,
    RangeParameter,
};
pub use reactive::{
    DataObserver, DataPublisher, ErrorHandler, ObserverHandle, Subscription, SubscriptionBuilder,
    SubscriptionId, ThreadPool, ThreadPoolConfig,
};
pub use storage::{
    ChangeListener, CursorStats, EngineStats, EntityBox, FieldValue, ListenerId, MemoryBox,
    MemoryBoxConfig, MemoryEngine, Record,
};
