//! # edgeward-expr
//!
//! Translation between the structured condition model and the edge
//! platform's filter-expression language.
//!
//! ## Overview
//!
//! - [`compile`](compile::compile) renders OR-ed condition groups plus a
//!   domain into an expression, one host clause per group.
//! - [`decompile`](decompile::decompile) splits an expression back into
//!   groups and runs the [`matcher`] over every clause. Unrecognized clauses
//!   are returned, never dropped silently.
//! - [`partition`](group::partition) and [`flatten`](group::flatten) convert
//!   between the UI's flat, tagged condition list and groups.
//!
//! ```rust,ignore
//! use edgeward_expr::{compile, decompile, partition};
//!
//! let groups = partition(conditions);
//! let expr = compile(&groups, "api.example.com")?;
//! let back = decompile(&expr)?;
//! assert!(back.is_lossless());
//! ```

pub mod compile;
pub mod decompile;
pub mod group;
pub mod matcher;

pub use compile::{compile, compile_rule, render_condition};
pub use decompile::{decompile, Decompiled, SkippedClause};
pub use group::{flatten, partition};
pub use matcher::match_clause;
