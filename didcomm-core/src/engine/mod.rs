//! Protocol execution engine
//!
//! The [`Engine`] routes inbound and outbound messages through the transition
//! table of their protocol, persists every paused transition as a
//! [`action::PendingAction`] and tells its listeners about pending actions and
//! committed transitions.
pub mod action;
pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod instance;
pub mod lock;
pub mod store;
pub mod transition;
pub mod types;

#[cfg(test)]
pub(crate) mod memory;

pub use engine::Engine;
