//! Database Layer
//!
//! libsql (embedded SQLite) persistence for the content tree:
//!
//! - [`DatabaseService`] - connection setup and schema
//! - [`UnitOfWork`] - one write transaction with savepoints
//! - [`TreeStore`] - nodes and per-language paths
//! - [`ContentStore`] - content records, relations, unique field values
//! - [`DomainEvent`] - change notifications published after commit

mod content_store;
mod database;
mod error;
pub mod events;
mod tree_store;
mod unit_of_work;

pub use content_store::ContentStore;
pub use database::{format_timestamp, parse_timestamp, DatabaseService};
pub use error::DatabaseError;
pub use events::{DomainEvent, PathChange};
pub use tree_store::{Sibling, TreeStore};
pub use unit_of_work::UnitOfWork;
