//! # LicenseHub Shared Library
//!
//! License lifecycle logic shared by the LicenseHub API server: validating a
//! key against every vendor that may have issued it, and consolidating a
//! user's individual licenses into a team.
//!
//! ## Module Organization
//!
//! - `models`: Database rows and their SQL
//! - `db`: Connection pool and migrations
//! - `store`: The `LicenseStore` seam (Postgres and in-memory implementations)
//! - `validation`: Vendor validators and the validation orchestrator
//! - `registry`: Redemption of validated keys into the caller's pool
//! - `license_pool`: Read model over a user's licenses
//! - `consolidation`: The team consolidation engine
//! - `knowledge`: Resolution of the license that owns per-license data
//! - `sub_licenses`: Seat management for consolidated teams
//! - `auth`: JWT verification for inbound requests

pub mod auth;
pub mod consolidation;
pub mod db;
pub mod knowledge;
pub mod license_pool;
pub mod models;
pub mod registry;
pub mod store;
pub mod sub_licenses;
pub mod validation;

/// Current version of the LicenseHub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
