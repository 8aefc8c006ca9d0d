// ============================================================================
// Context change tracking
// ============================================================================
//
// Each Change is one pending write against a single record. Changes carry
// the previous field values so a storage engine can undo a partially applied
// batch by applying the inverse changes in reverse order.
//
// ============================================================================

use crate::core::{FieldValues, ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// Insert a new record
    Insert {
        entity: String,
        id: ObjectId,
        values: FieldValues,
    },

    /// Replace the field values of an existing record
    Update {
        entity: String,
        id: ObjectId,
        old_values: FieldValues,
        new_values: FieldValues,
    },

    /// Remove an existing record
    Delete {
        entity: String,
        id: ObjectId,
        old_values: FieldValues,
    },
}

impl Change {
    /// Entity kind affected by this change
    pub fn entity(&self) -> &str {
        match self {
            Change::Insert { entity, .. }
            | Change::Update { entity, .. }
            | Change::Delete { entity, .. } => entity,
        }
    }

    /// Record affected by this change
    pub fn id(&self) -> ObjectId {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => *id,
        }
    }

    /// The change that undoes this one
    pub fn inverse(&self) -> Change {
        match self.clone() {
            Change::Insert { entity, id, values } => Change::Delete {
                entity,
                id,
                old_values: values,
            },
            Change::Update {
                entity,
                id,
                old_values,
                new_values,
            } => Change::Update {
                entity,
                id,
                old_values: new_values,
                new_values: old_values,
            },
            Change::Delete {
                entity,
                id,
                old_values,
            } => Change::Insert {
                entity,
                id,
                values: old_values,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn values(n: i64) -> FieldValues {
        let mut values = FieldValues::new();
        values.insert("n".into(), Value::Integer(n));
        values
    }

    #[test]
    fn test_change_accessors() {
        let change = Change::Insert {
            entity: "User".into(),
            id: ObjectId(4),
            values: values(1),
        };
        assert_eq!(change.entity(), "User");
        assert_eq!(change.id(), ObjectId(4));
    }

    #[test]
    fn test_inverse_round_trips() {
        let update = Change::Update {
            entity: "User".into(),
            id: ObjectId(1),
            old_values: values(1),
            new_values: values(2),
        };
        assert_eq!(update.inverse().inverse(), update);

        let insert = Change::Insert {
            entity: "User".into(),
            id: ObjectId(2),
            values: values(3),
        };
        assert!(matches!(insert.inverse(), Change::Delete { .. }));
    }
}
