pub mod config;
pub mod manager;
pub mod state;

pub use config::StoreConfig;
pub use manager::PersistenceManager;
pub use state::{ContainerState, UpdateOutcome};
