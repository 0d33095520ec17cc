//! `prople-didcomm-core` drives interruptible DIDComm protocol executions
//!
//! The [`engine`] module owns the generic machinery: listener registration,
//! durable pending actions, continuation and the dispatch loop. The [`protocol`]
//! module contains the Out-of-Band and Introduce transition tables and their
//! client APIs.
pub mod engine;
pub mod protocol;
