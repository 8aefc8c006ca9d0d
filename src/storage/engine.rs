use crate::context::Change;
use crate::core::{EntitySchema, ObjectId, Record, Result};
use crate::query::FetchRequest;

/// Storage engine contract the persistence manager is written against.
///
/// An engine owns the records of every registered entity kind. Reads are
/// declarative fetch requests; writes arrive as one batch of changes per
/// commit, which must be applied completely or not at all.
pub trait StorageEngine: Send {
    /// Open the underlying container and load its persistent state.
    fn load(&mut self) -> Result<()>;

    /// Register an entity kind. Registering an identical schema again is a
    /// no-op; a different schema under the same name is a `SchemaMismatch`.
    fn register_entity(&mut self, schema: EntitySchema) -> Result<()>;

    /// Schema registered under `name`, if any.
    fn entity(&self, name: &str) -> Option<&EntitySchema>;

    /// Names of all registered entity kinds.
    fn entity_names(&self) -> Vec<String>;

    /// Execute a fetch: filter, sort, then paginate.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>>;

    /// Reserve the identity of a record about to be inserted.
    fn allocate_id(&mut self, entity: &str) -> Result<ObjectId>;

    /// Durably apply one batch of changes.
    fn commit(&mut self, changes: Vec<Change>) -> Result<()>;
}
