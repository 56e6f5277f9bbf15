//! tradecast: trade broadcast and confirmation lifecycle service.
//!
//! Generators publish parameterized protocol actions to their paying
//! subscribers; each subscriber individually accepts, rejects, or tweaks a
//! broadcast within its confirmation window. The crate covers the full
//! lifecycle: subscription registry fed by on-chain events, fan-out broadcast
//! creation, the per-subscriber confirmation state machine, background expiry
//! sweeping, and real-time SSE delivery with missed-message recovery.
//!
//! Layout follows ports-and-adapters: `domain` holds the core types, `port`
//! the trait seams, `adapter` the SQLite/WebSocket/SSE/cipher
//! implementations, and `app` the services wired together by
//! [`app::runtime::Runtime`].

pub mod adapter;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use config::Config;
pub use error::{Error, Result};
