use super::Persistable;
use crate::core::{DataType, EntitySchema, FieldDef, FieldValues, Record, Result, Value};

/// Chat user row shown by the list screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub last_msg: String,
    /// Epoch seconds of the last change.
    pub update_time: i64,
}

impl Persistable for User {
    const ENTITY_NAME: &'static str = "User";

    fn schema() -> EntitySchema {
        EntitySchema::new(
            Self::ENTITY_NAME,
            vec![
                FieldDef::new("user_id", DataType::Integer).not_null(),
                FieldDef::new("name", DataType::Text),
                FieldDef::new("last_msg", DataType::Text),
                FieldDef::new("update_time", DataType::Integer).not_null(),
            ],
        )
    }

    fn to_values(&self) -> FieldValues {
        let mut values = FieldValues::new();
        values.insert("user_id".into(), Value::Integer(self.user_id));
        values.insert("name".into(), Value::Text(self.name.clone()));
        values.insert("last_msg".into(), Value::Text(self.last_msg.clone()));
        values.insert("update_time".into(), Value::Integer(self.update_time));
        values
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            user_id: record.get_i64("user_id")?,
            name: record.get_text("name")?,
            last_msg: record.get_text("last_msg")?,
            update_time: record.get_i64("update_time")?,
        })
    }
}
