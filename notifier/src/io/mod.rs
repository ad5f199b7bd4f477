//! Side effects: the runner platform, persisted state and remote APIs.

pub mod actions;
pub mod clients;
pub mod context;
pub mod github;
pub mod platform;
pub mod sleep;
pub mod slack;
pub mod store;
pub mod workflow;
