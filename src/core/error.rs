use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store failed to load: {0}")]
    StoreLoad(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Entity kind '{0}' not found")]
    KindNotFound(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Field '{0}' not found in entity '{1}'")]
    FieldNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
