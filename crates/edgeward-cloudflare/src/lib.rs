//! # edgeward-cloudflare
//!
//! `ZoneRuleApi` implementation for the Cloudflare v4 rulesets API.
//!
//! This crate is the only place edgeward talks HTTP. It owns transport,
//! authentication, retries and the response envelope; rule identity and
//! ordering stay in `edgeward-core`.
//!
//! ```rust,ignore
//! use edgeward_cloudflare::{CloudflareClient, CloudflareConfig};
//!
//! let api = CloudflareClient::new(CloudflareConfig::from_env()?)?;
//! let zone_id = api.resolve_zone("example.com").await?;
//! ```

pub mod client;
pub mod config;
pub(crate) mod retry;

pub use client::CloudflareClient;
pub use config::CloudflareConfig;
