//! Trait seams between the lifecycle core and its collaborators.

pub mod chain;
pub mod cipher;
pub mod executor;
pub mod store;
