//! # edgeward-service
//!
//! Per-category policy services on top of the reconciler.
//!
//! Write path, for every subdomain entry of a payload:
//!   1. The payload is validated; nothing is sent if it is invalid
//!   2. [`desired`] builds the desired rules for the host
//!   3. The zone name is resolved to a zone id
//!   4. The `Reconciler` converges each rule and journals the decision
//!
//! Read path: [`PolicyReader`] lists the zone containers and decompiles
//! every tagged rule into a view the policy UI can edit.

pub mod apply;
pub mod desired;
pub mod view;

pub use apply::{DomainReport, PolicyService, TagOutcome};
pub use view::{BotView, CacheSettingsView, CustomView, DdosView, PolicyReader, UnreadableRule, WafView};
