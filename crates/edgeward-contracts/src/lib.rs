//! # edgeward-contracts
//!
//! Shared types for edgeward: the condition model, policy categories,
//! remote rule wire types, desired-state payloads and the error type.
//!
//! No business logic lives here; compilation and reconciliation live in
//! `edgeward-expr` and `edgeward-core`.

pub mod change;
pub mod condition;
pub mod error;
pub mod payload;
pub mod policy;
pub mod remote;
