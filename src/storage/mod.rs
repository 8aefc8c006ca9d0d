pub mod durable;
pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use durable::DurableStorage;
pub use engine::StorageEngine;
pub use memory::InMemoryStorage;
pub use persistence::{DurabilityMode, WalManager};
pub use table::EntityTable;
