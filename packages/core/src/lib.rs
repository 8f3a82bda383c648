//! Slugtree Core
//!
//! A hierarchical, multi-language content tree stored in embedded SQLite.
//!
//! # Architecture
//!
//! - **Two addressing schemes**: an internal tree-path built from node ids
//!   (stable under rename), and one user-facing slug path per language
//! - **Integer sibling positions**: spaced inserts with local renumbering
//! - **Content binding**: at most one content record per node and language,
//!   with an `any` wildcard fallback
//! - **libsql**: embedded SQLite-compatible database, one transaction per
//!   mutation
//!
//! # Modules
//!
//! - [`config`] - tree configuration (languages, slug length, spacing)
//! - [`models`] - data structures (Node, PathEntry, Content)
//! - [`behaviors`] - content type registry and workflows
//! - [`operations`] - position allocation
//! - [`services`] - NodeService, ContentService, paste, import/export
//! - [`db`] - database layer with libsql integration

pub mod behaviors;
pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
