pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, StoreError};
pub use types::{DataType, EntitySchema, FieldDef, FieldValues, ObjectId, Record};
pub use value::Value;
