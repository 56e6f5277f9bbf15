//! Application services: the lifecycle logic behind the ports.

pub mod broadcast;
pub mod confirmation;
pub mod delivery;
pub mod dispatcher;
pub mod expiry;
pub mod listener;
pub mod registry;
pub mod runtime;
