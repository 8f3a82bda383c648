//! Data Models
//!
//! - [`Node`] - tree vertex with an internal tree-path and sibling position
//! - [`PathEntry`] - per-language user-facing path of a node
//! - [`Content`] - content record bound to at most one node per language

mod content;
mod node;
mod path;

pub use content::{Content, IndexEntry, NewContent, PUBLISHED_STATE};
pub use node::{
    is_within, join_path, last_segment, normalize_slug, parent_path, replace_prefix, Node,
    Placement, Slugs, timestamp_now, ValidationError, PATH_SEPARATOR, ROOT_PATH,
};
pub use path::PathEntry;
