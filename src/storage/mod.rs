//! Storage collaborators for boxquery.
//!
//! `traits` defines the contract a compiled query runs against; `memory` is
//! a thread-safe reference backend that implements it.

pub mod memory;
mod plan;
mod traits;

pub use memory::{CursorStats, EngineStats, FieldValue, MemoryBox, MemoryBoxConfig, MemoryEngine, Record};
pub use traits::{ChangeListener, EntityBox, ListenerId};
