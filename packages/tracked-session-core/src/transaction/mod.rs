//! Nested transaction scopes over the change log.

mod index_stack;
mod resource;

pub use index_stack::{LevelTransition, TransactionIndexStack};
pub use resource::TransactionResource;
