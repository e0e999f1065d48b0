//! Async client library producing the Intune non-compliant device report.
//!
//! Lists Windows devices that Intune reports as non-compliant, in grace
//! period, or compliance-managed by Configuration Manager, then enriches
//! each one with its owner's Entra ID profile and the owner's other
//! recently active Windows devices through a per-device `$batch` call.
//!
//! # Modules
//!
//! - [`auth`] — OAuth2 client credentials token provider with expiry tracking.
//! - [`client`] — Authenticated HTTP wrapper for the Graph REST API.
//! - [`config`] — Optional TOML configuration.
//! - [`devices`] — The compliance query and its record type.
//! - [`batch`] — Per-device `$batch` enrichment and sibling filtering.
//! - [`error`] — Typed error hierarchy (`GraphError`).
//! - [`export`] — CSV output.
//! - [`normalize`] — Sentinel/fallback rules producing report rows.
//! - [`paging`] — `@odata.nextLink` pagination.
//! - [`report`] — Sequential fetch → enrich → normalize pipeline.
//!
//! # Quick Start
//!
//! ```ignore
//! use intune_compliance_report::auth::{GRAPH_SCOPE, TokenProvider};
//! use intune_compliance_report::client::GraphClient;
//! use intune_compliance_report::report::{ReportOptions, build_report};
//!
//! let tp = TokenProvider::new("tenant", "client_id", "secret", GRAPH_SCOPE);
//! let client = GraphClient::new(tp)?;
//! let rows = build_report(&client, &ReportOptions::default()).await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod batch;
pub mod client;
pub mod config;
pub mod devices;
pub mod error;
pub mod export;
pub mod normalize;
pub mod paging;
pub mod report;
