use std::sync::{Arc, OnceLock};

use crate::engine::EntityId;
use crate::error::{ExecutionError, QueryError, QueryResult};
use crate::storage::EntityBox;

/// Query results held as ids and materialized on access.
///
/// The id list is fixed when the list is created. A cached list keeps each
/// entity after its first load; an uncached one reads through to the box on
/// every access. Ids whose entity was removed since yield `None`.
pub struct LazyList<B: EntityBox> {
    entity_box: Arc<B>,
    ids: Vec<EntityId>,
    cache: Option<Vec<OnceLock<B::Entity>>>,
}

impl<B: EntityBox> LazyList<B> {
    pub(crate) fn new(entity_box: Arc<B>, ids: Vec<EntityId>, cached: bool) -> Self {
        let cache = cached.then(|| ids.iter().map(|_| OnceLock::new()).collect());
        Self {
            entity_box,
            ids,
            cache,
        }
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no entity matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Matching ids in storage order.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Whether loaded entities are kept.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Entity at `index`.
    ///
    /// # Errors
    ///
    /// Invalid argument if `index` is out of bounds; storage errors from the
    /// box.
    pub fn get(&self, index: usize) -> QueryResult<Option<B::Entity>> {
        let id = *self.ids.get(index).ok_or_else(|| {
            QueryError::invalid_argument(
                "index",
                format!("{index} is out of bounds for {} results", self.ids.len()),
            )
        })?;

        let Some(cell) = self.cache.as_ref().and_then(|cache| cache.get(index)) else {
            return self.entity_box.get(id);
        };
        if let Some(entity) = cell.get() {
            return Ok(Some(entity.clone()));
        }
        let entity = self.entity_box.get(id)?;
        if let Some(loaded) = &entity {
            let _ = cell.set(loaded.clone());
        }
        Ok(entity)
    }

    /// Number of entities held in the cache.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |cache| cache.iter().filter(|cell| cell.get().is_some()).count())
    }

    /// Loads every entity not yet cached.
    ///
    /// # Errors
    ///
    /// `ExecutionError::UnsupportedRetrieval` on an uncached list.
    pub fn load_remaining(&self) -> QueryResult<()> {
        if self.cache.is_none() {
            return Err(ExecutionError::UnsupportedRetrieval {
                reason: "load_remaining requires a cached lazy list".to_string(),
            }
            .into());
        }
        for index in 0..self.ids.len() {
            self.get(index)?;
        }
        Ok(())
    }

    /// Loads each entity in id order.
    pub fn iter(&self) -> impl Iterator<Item = QueryResult<Option<B::Entity>>> + '_ {
        (0..self.ids.len()).map(move |index| self.get(index))
    }
}

impl<B: EntityBox> std::fmt::Debug for LazyList<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyList")
            .field("len", &self.ids.len())
            .field("cached", &self.is_cached())
            .field("loaded", &self.loaded_count())
            .finish_non_exhaustive()
    }
}
