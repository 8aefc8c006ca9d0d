//! Query building blocks: predicates, sort keys and fetch requests.

pub mod parser;
pub mod pattern;
pub mod predicate;
pub mod request;
pub mod sort;

pub use predicate::{CompareOp, Predicate};
pub use request::{FetchRequest, Page};
pub use sort::{NullOrdering, SortKey};
