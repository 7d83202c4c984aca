use std::sync::Arc;

use tracing::debug;

use crate::condition::{Combinator, QueryCondition};
use crate::engine::NativeQueryBuilder;
use crate::error::QueryResult;
use crate::property::{OrderFlags, Property};
use crate::storage::EntityBox;

use super::Query;

/// Compiles conditions and sort keys into a [`Query`].
///
/// Successive `filter` calls are AND-combined. A builder without filters
/// compiles to a query that matches every entity.
pub struct QueryBuilder<B: EntityBox> {
    entity_box: Arc<B>,
    native: Box<dyn NativeQueryBuilder>,
    filters: usize,
    has_order: bool,
}

impl<B: EntityBox> QueryBuilder<B> {
    /// Opens a native builder on the box's engine.
    pub fn new(entity_box: Arc<B>) -> QueryResult<Self> {
        let native = entity_box.engine().new_builder()?;
        Ok(Self {
            entity_box,
            native,
            filters: 0,
            has_order: false,
        })
    }

    /// Applies `condition` to the plan.
    ///
    /// # Errors
    ///
    /// Validation errors for a condition whose operation does not fit its
    /// shape; engine errors from the native builder.
    pub fn filter(mut self, condition: impl Into<QueryCondition>) -> QueryResult<Self> {
        let condition: QueryCondition = condition.into();
        condition.apply(&mut *self.native)?;
        if self.filters > 0 {
            self.native.combine(Combinator::And)?;
        }
        self.filters += 1;
        Ok(self)
    }

    /// Adds a sort key. Ordered queries cannot return bare ids.
    pub fn order(mut self, property: &Property, flags: OrderFlags) -> QueryResult<Self> {
        self.native.order(property, flags)?;
        self.has_order = true;
        Ok(self)
    }

    /// Compiles the native plan.
    pub fn build(self) -> QueryResult<Query<B>> {
        let handle = self.native.build()?;
        debug!(%handle, filters = self.filters, ordered = self.has_order, "query compiled");
        Ok(Query::new(self.entity_box, handle, self.has_order))
    }
}

impl<B: EntityBox> std::fmt::Debug for QueryBuilder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("filters", &self.filters)
            .field("has_order", &self.has_order)
            .finish_non_exhaustive()
    }
}
