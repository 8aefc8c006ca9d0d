use super::engine::StorageEngine;
use super::table::EntityTable;
use crate::context::Change;
use crate::core::{EntitySchema, ObjectId, Record, Result, StoreError};
use crate::query::FetchRequest;
use log::warn;
use std::collections::HashMap;

/// Volatile engine: every registered kind lives in an [`EntityTable`].
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, EntityTable>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Result<&EntityTable> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::KindNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut EntityTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::KindNotFound(name.to_string()))
    }

    pub fn record_count(&self) -> usize {
        self.tables.values().map(|t| t.row_count()).sum()
    }

    /// Apply a batch; if any change fails, the already applied ones are
    /// undone in reverse order and the error is returned.
    pub fn apply_batch(&mut self, changes: &[Change]) -> Result<()> {
        for (applied, change) in changes.iter().enumerate() {
            let result = self
                .table_mut(change.entity())
                .and_then(|table| table.apply(change));
            if let Err(err) = result {
                self.revert_batch(&changes[..applied]);
                return Err(match err {
                    StoreError::Commit(_) => err,
                    other => StoreError::Commit(other.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Undo a fully applied batch.
    pub fn revert_batch(&mut self, changes: &[Change]) {
        for change in changes.iter().rev() {
            let inverse = change.inverse();
            let result = self
                .table_mut(inverse.entity())
                .and_then(|table| table.apply(&inverse));
            if let Err(err) = result {
                warn!("failed to undo change on {} {}: {}", change.entity(), change.id(), err);
            }
        }
    }

    /// Every table, used for checkpoints.
    pub fn tables(&self) -> &HashMap<String, EntityTable> {
        &self.tables
    }

    /// Forget an entity kind and its records.
    pub fn drop_entity(&mut self, name: &str) -> Option<EntityTable> {
        self.tables.remove(name)
    }

    /// Replace all tables, used for recovery.
    pub fn restore_tables(&mut self, tables: HashMap<String, EntityTable>) {
        self.tables = tables;
    }
}

impl StorageEngine for InMemoryStorage {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn register_entity(&mut self, schema: EntitySchema) -> Result<()> {
        if schema.name().is_empty() {
            return Err(StoreError::KindNotFound(String::new()));
        }
        match self.tables.get(schema.name()) {
            Some(existing) if existing.schema() == &schema => Ok(()),
            Some(existing) => Err(StoreError::SchemaMismatch(format!(
                "Entity '{}' is already registered with fields [{}]",
                schema.name(),
                existing
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| format!("{} {}", f.name, f.data_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
            None => {
                self.tables
                    .insert(schema.name().to_string(), EntityTable::new(schema));
                Ok(())
            }
        }
    }

    fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.tables.get(name).map(|t| t.schema())
    }

    fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>> {
        let table = self.table(&request.entity)?;
        request.validate(table.schema())?;
        request.execute(table.scan())
    }

    fn allocate_id(&mut self, entity: &str) -> Result<ObjectId> {
        Ok(self.table_mut(entity)?.allocate_id())
    }

    fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
        self.apply_batch(&changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, FieldDef, FieldValues, Value};
    use crate::query::{Predicate, SortKey};

    fn schema() -> EntitySchema {
        EntitySchema::new("Item", vec![FieldDef::new("n", DataType::Integer).not_null()])
    }

    fn insert(storage: &mut InMemoryStorage, n: i64) -> Change {
        let id = storage.allocate_id("Item").unwrap();
        let mut values = FieldValues::new();
        values.insert("n".into(), Value::Integer(n));
        Change::Insert {
            entity: "Item".into(),
            id,
            values,
        }
    }

    #[test]
    fn test_register_twice_is_noop_and_conflict_is_rejected() {
        let mut storage = InMemoryStorage::new();
        storage.register_entity(schema()).unwrap();
        storage.register_entity(schema()).unwrap();

        let other = EntitySchema::new("Item", vec![FieldDef::new("n", DataType::Text)]);
        assert!(matches!(
            storage.register_entity(other),
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_fetch_unknown_kind() {
        let storage = InMemoryStorage::new();
        let err = storage.fetch(&FetchRequest::new("Ghost")).unwrap_err();
        assert_eq!(err, StoreError::KindNotFound("Ghost".into()));
    }

    #[test]
    fn test_commit_and_fetch() {
        let mut storage = InMemoryStorage::new();
        storage.register_entity(schema()).unwrap();
        let batch = vec![insert(&mut storage, 3), insert(&mut storage, 1), insert(&mut storage, 2)];
        storage.commit(batch).unwrap();

        let request = FetchRequest::new("Item")
            .with_predicate(Some(Predicate::gt("n", 1)))
            .sorted_by(vec![SortKey::ascending("n")]);
        let found: Vec<i64> = storage
            .fetch(&request)
            .unwrap()
            .iter()
            .map(|r| r.get_i64("n").unwrap())
            .collect();
        assert_eq!(found, vec![2, 3]);
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let mut storage = InMemoryStorage::new();
        storage.register_entity(schema()).unwrap();
        let good = insert(&mut storage, 1);
        let bad = Change::Delete {
            entity: "Item".into(),
            id: ObjectId(99),
            old_values: FieldValues::new(),
        };

        let err = storage.commit(vec![good, bad]).unwrap_err();
        assert!(matches!(err, StoreError::Commit(_)));
        assert_eq!(storage.record_count(), 0);
    }
}
