//! Typed entity kinds.
//!
//! A [`Persistable`] type is the typed view of one entity kind: it names the
//! kind, declares its schema, and converts to and from stored field values.

pub mod user;

pub use user::User;

use crate::core::{EntitySchema, FieldValues, Record, Result};

/// Contract for every record type the persistence manager can store.
///
/// `ENTITY_NAME` must be stable: it is used both to register the kind with
/// the storage engine and to build fetch requests against it.
/// `Default` provides the blank draft handed to `create` callbacks.
pub trait Persistable: Default + Sized {
    /// Stable entity kind name.
    const ENTITY_NAME: &'static str;

    /// Schema registered for this kind.
    fn schema() -> EntitySchema;

    /// Field values to store.
    fn to_values(&self) -> FieldValues;

    /// Rebuild the typed value from a stored record.
    fn from_record(record: &Record) -> Result<Self>;
}
