//! Business Services
//!
//! - `NodeService` - path lookup, add/remove/rename/reposition, paste
//! - `ContentService` - content records and their node bindings
//! - `Exporter` / `Importer` - JSON dump and replay of a subtree
//! - `IndexSink` - feed for an external search index
//!
//! Services coordinate between the database layer and application logic.
//! Every mutation runs in one transaction and publishes a
//! [`DomainEvent`](crate::db::DomainEvent) after commit.

pub mod content_service;
pub mod error;
pub mod impexp;
pub mod indexing;
pub mod node_service;
pub mod paste;
mod queries;

pub use content_service::ContentService;
pub use error::NodeServiceError;
pub use impexp::{
    ExportedContent, ExportedNode, Exporter, ImportSummary, Importer, SiteDocument,
    SITE_DOCUMENT_VERSION,
};
pub use indexing::IndexSink;
pub use node_service::NodeService;
pub use paste::{PasteMode, PasteOutcome};
