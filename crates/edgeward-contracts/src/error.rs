//! Error types for the edgeward policy pipeline.
//!
//! All fallible operations across the workspace return `EdgewardResult<T>`.
//! Variants carry enough context (zone, container, tag, endpoint) to tell an
//! operator which domain failed and where to retry.

use thiserror::Error;

/// The unified error type for edgeward.
#[derive(Debug, Error)]
pub enum EdgewardError {
    /// The zone rule API returned a non-2xx status or the transport failed.
    ///
    /// `status` is `None` for transport-level failures. `message` is taken
    /// from the provider's `errors[]` envelope when one is present.
    #[error("remote API call {endpoint} failed{}: {message}", fmt_status(.status))]
    RemoteApi {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// A shared rule container could not be found or created.
    #[error("rule container for phase '{phase}' is missing in zone '{zone_id}'")]
    ContainerMissing { zone_id: String, phase: String },

    /// More than one remote rule carries the same tag.
    ///
    /// Fatal: the reconciler refuses to guess which rule owns the identity.
    #[error("tag '{tag}' is carried by {count} rules in container '{container_id}'")]
    DuplicateTag {
        container_id: String,
        tag: String,
        count: usize,
    },

    /// A zone name did not resolve to a zone id.
    #[error("zone '{zone}' not found")]
    ZoneNotFound { zone: String },

    /// The expression is outside the supported OR-of-ANDs grammar.
    #[error("unsupported expression: {reason}")]
    UnsupportedExpression { reason: String },

    /// A condition cannot be rendered into the expression language.
    #[error("invalid condition: {reason}")]
    InvalidCondition { reason: String },

    /// A desired-state payload failed validation.
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    /// The change journal could not append a record.
    #[error("change journal write failed: {reason}")]
    JournalWriteFailed { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}

/// Convenience alias used throughout the edgeward crates.
pub type EdgewardResult<T> = Result<T, EdgewardError>;
