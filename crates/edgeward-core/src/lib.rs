//! # edgeward-core
//!
//! Converges tagged rules in shared remote containers towards their
//! desired state.
//!
//! This crate provides:
//! - The two seams (`ZoneRuleApi`, `ChangeJournal`)
//! - The category ordering table consulted when creating rules
//! - The `Reconciler` that wires them together
//! - `InMemoryZoneApi`, a reference platform for tests and dry runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edgeward_core::{Reconciler, traits::{ZoneRuleApi, ChangeJournal}};
//! ```

pub mod memory;
pub mod ordering;
pub mod reconciler;
pub mod traits;

pub use memory::{ApiCall, InMemoryZoneApi};
pub use reconciler::Reconciler;
pub use traits::{ChangeJournal, ZoneRuleApi};
