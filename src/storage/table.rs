use crate::context::Change;
use crate::core::{EntitySchema, FieldValues, ObjectId, Record, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records of one entity kind, kept in ascending `ObjectId` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTable {
    schema: EntitySchema,
    rows: BTreeMap<ObjectId, FieldValues>,
    next_id: u64,
}

impl EntityTable {
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Records in underlying storage order.
    pub fn scan(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows
            .iter()
            .map(|(id, values)| Record::new(*id, values.clone()))
    }

    pub fn get(&self, id: ObjectId) -> Option<&FieldValues> {
        self.rows.get(&id)
    }

    /// Apply one change to this table.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::Insert { id, values, .. } => {
                self.schema.validate(values)?;
                if self.rows.contains_key(id) {
                    return Err(StoreError::Commit(format!(
                        "{} {} already exists",
                        self.schema.name(),
                        id
                    )));
                }
                self.rows.insert(*id, values.clone());
                // replayed inserts must never be handed out again
                self.next_id = self.next_id.max(id.as_u64() + 1);
            }
            Change::Update { id, new_values, .. } => {
                self.schema.validate(new_values)?;
                let row = self.rows.get_mut(id).ok_or_else(|| missing(&self.schema, *id))?;
                *row = new_values.clone();
            }
            Change::Delete { id, .. } => {
                self.rows.remove(id).ok_or_else(|| missing(&self.schema, *id))?;
            }
        }
        Ok(())
    }
}

fn missing(schema: &EntitySchema, id: ObjectId) -> StoreError {
    StoreError::Commit(format!("{} {} does not exist", schema.name(), id))
}
