//! Infrastructure adapters behind the port traits.

pub mod chain;
pub mod cipher;
pub mod executor;
pub mod sqlite;
pub mod sse;
