// ============================================================================
// entitystore Library
// ============================================================================
//
// Typed persistence for entity records: predicate queries with sorting and
// pagination, transactional saves that only commit pending changes, and an
// optional write-ahead-logged storage engine.
//
// ============================================================================

pub mod context;
pub mod core;
pub mod entity;
pub mod facade;
pub mod query;
pub mod storage;

// Re-export main types for convenience
pub use core::{DataType, EntitySchema, FieldDef, ObjectId, Record, Result, StoreError, Value};
pub use entity::{Persistable, User};
pub use facade::{ContainerState, PersistenceManager, StoreConfig, UpdateOutcome};
pub use query::{CompareOp, FetchRequest, NullOrdering, Page, Predicate, SortKey};
pub use storage::{DurabilityMode, DurableStorage, InMemoryStorage, StorageEngine};
