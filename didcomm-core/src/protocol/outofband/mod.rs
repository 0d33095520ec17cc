//! Out-of-Band protocol
//!
//! Builds requests and invitations, accepts them without a confirmation step
//! and correlates saved artifacts with the handshake-reuse answering them.
pub mod transition;
pub mod types;
pub mod usecase;
