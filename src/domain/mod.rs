//! Core domain types: subscriptions, strategies, broadcasts, confirmations,
//! delivery records, and the events that tie them together.

pub mod account;
pub mod broadcast;
pub mod confirmation;
pub mod delivery;
pub mod event;
pub mod id;
pub mod strategy;
pub mod subscription;
