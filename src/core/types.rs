use super::{Result, StoreError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field values of one record, keyed by field name.
pub type FieldValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(StoreError::TypeMismatch(format!(
                    "Field '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(StoreError::TypeMismatch(format!(
                "Field '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// Named schema descriptor for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    name: String,
    fields: Vec<FieldDef>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Look up a field, failing with `FieldNotFound` when it is not declared.
    pub fn require_field(&self, name: &str) -> Result<&FieldDef> {
        self.field(name)
            .ok_or_else(|| StoreError::FieldNotFound(name.to_string(), self.name.clone()))
    }

    /// Check a full set of field values against the schema.
    ///
    /// Missing fields are treated as NULL; undeclared fields are rejected.
    pub fn validate(&self, values: &FieldValues) -> Result<()> {
        for name in values.keys() {
            self.require_field(name)?;
        }
        for field in &self.fields {
            field.validate(values.get(&field.name).unwrap_or(&Value::Null))?;
        }
        Ok(())
    }
}

/// Engine-assigned identity of a stored record.
///
/// Ids grow monotonically per entity kind, so ascending id order is the
/// underlying storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A stored record as returned by a storage engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: ObjectId,
    pub values: FieldValues,
}

impl Record {
    pub fn new(id: ObjectId, values: FieldValues) -> Self {
        Self { id, values }
    }

    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    pub fn get_i64(&self, field: &str) -> Result<i64> {
        match self.get(field) {
            Value::Integer(i) => Ok(*i),
            other => Err(decode_error(field, "INTEGER", other)),
        }
    }

    pub fn get_f64(&self, field: &str) -> Result<f64> {
        self.get(field)
            .as_f64()
            .ok_or_else(|| decode_error(field, "FLOAT", self.get(field)))
    }

    pub fn get_bool(&self, field: &str) -> Result<bool> {
        self.get(field)
            .as_bool()
            .ok_or_else(|| decode_error(field, "BOOLEAN", self.get(field)))
    }

    /// Text field; NULL decodes as an empty string.
    pub fn get_text(&self, field: &str) -> Result<String> {
        match self.get(field) {
            Value::Text(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => Err(decode_error(field, "TEXT", other)),
        }
    }
}

fn decode_error(field: &str, expected: &str, found: &Value) -> StoreError {
    StoreError::Decode(format!(
        "Field '{}' expected {}, found {}",
        field,
        expected,
        found.type_name()
    ))
}
