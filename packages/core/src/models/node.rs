//! Node Data Structures
//!
//! This module defines the `Node` struct, the vertex of the content tree, and
//! the value types used when adding or placing nodes.
//!
//! # Architecture
//!
//! - **Opaque identity**: Nodes are identified by a UUID string, never by path
//! - **Internal tree-path**: `/`-joined ancestor ids, used only for subtree
//!   prefix queries. Root's tree-path is the empty string.
//! - **User-facing paths**: Stored per language in the `paths` table, see
//!   [`PathEntry`](crate::models::PathEntry)
//! - **Language hint**: `preferred_language` travels with a node value between
//!   calls but is never persisted
//!
//! # Examples
//!
//! ```rust
//! use slugtree_core::models::{normalize_slug, Slugs};
//!
//! assert_eq!(normalize_slug("About-Us", 40).unwrap(), "about-us");
//! assert!(normalize_slug("about us", 40).is_err());
//!
//! let slugs: Slugs = "contact".into();
//! assert!(matches!(slugs, Slugs::Single(_)));
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// The tree-path (and user-facing path) of the root node
pub const ROOT_PATH: &str = "";

/// Separator used in both internal tree-paths and user-facing paths
pub const PATH_SEPARATOR: char = '/';

// Allowed slug characters; length is checked separately against the configured maximum
const SLUG_PATTERN: &str = r"^[a-z0-9_-]+$";

/// Validation errors for slugs and slug maps
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No slug or language slug map was provided")]
    MissingSlug,

    #[error("Slug cannot be empty")]
    EmptySlug,

    #[error("Slug '{slug}' is longer than {max} characters")]
    SlugTooLong { slug: String, max: usize },

    #[error("Slug '{0}' contains characters outside [a-z0-9_-]")]
    InvalidCharacters(String),

    #[error("Language '{0}' is not configured")]
    UnknownLanguage(String),
}

/// Lowercase a candidate slug and validate it
///
/// Lowercasing is the only normalization applied. The result must consist
/// of `[a-z0-9_-]` and be between 1 and `max_len` characters long.
pub fn normalize_slug(slug: &str, max_len: usize) -> Result<String, ValidationError> {
    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    let slug_regex = SLUG_REGEX.get_or_init(|| Regex::new(SLUG_PATTERN).unwrap());

    let slug = slug.to_lowercase();
    if slug.is_empty() {
        return Err(ValidationError::EmptySlug);
    }
    if slug.chars().count() > max_len {
        return Err(ValidationError::SlugTooLong {
            slug,
            max: max_len,
        });
    }
    if !slug_regex.is_match(&slug) {
        return Err(ValidationError::InvalidCharacters(slug));
    }
    Ok(slug)
}

/// Current time at storage precision (microseconds)
///
/// Values created with it compare equal after a database round trip.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Join a parent path and a slug: `"" + "a"` is `"/a"`, `"/a" + "b"` is `"/a/b"`
pub fn join_path(parent: &str, segment: &str) -> String {
    format!("{}{}{}", parent, PATH_SEPARATOR, segment)
}

/// Last segment of a path; the root path yields the empty string
pub fn last_segment(path: &str) -> &str {
    path.rsplit_once(PATH_SEPARATOR)
        .map(|(_, last)| last)
        .unwrap_or(path)
}

/// Everything before the last segment; the root path yields the root path
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once(PATH_SEPARATOR)
        .map(|(head, _)| head)
        .unwrap_or(ROOT_PATH)
}

/// True if `path` equals `prefix` or lies strictly below it
///
/// `/aaaa` is not below `/aaa`: the match is anchored on a separator.
pub fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path[prefix.len()..].starts_with(PATH_SEPARATOR))
}

/// Replace `old_prefix` at the start of `path` by `new_prefix`
///
/// Callers must check [`is_within`] first.
pub fn replace_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    format!("{}{}", new_prefix, &path[old_prefix.len()..])
}

/// A vertex in the content tree
///
/// Two node values are equal when they share an id and carry the same
/// preferred language, so the same node seen through "nl" and "en" differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Opaque identifier (UUID v4)
    pub id: String,

    /// Internal `/`-joined ancestor ids, ending with this node's id
    pub tree_path: String,

    /// Sibling order under the parent (ascending)
    pub position: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Transient language hint for path-resolving calls (never persisted)
    #[serde(skip)]
    pub preferred_language: Option<String>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.preferred_language == other.preferred_language
    }
}

impl Eq for Node {}

impl Node {
    /// Create the root node value
    pub fn new_root() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tree_path: ROOT_PATH.to_string(),
            position: 0,
            created_at: timestamp_now(),
            preferred_language: None,
        }
    }

    /// Create a node value placed below `parent`
    pub fn new_child(parent: &Node, position: i64) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            tree_path: join_path(&parent.tree_path, &id),
            id,
            position,
            created_at: timestamp_now(),
            preferred_language: None,
        }
    }

    /// Whether this is the root node
    pub fn is_root(&self) -> bool {
        self.tree_path == ROOT_PATH
    }

    /// Internal tree-path of the parent (root's parent is root)
    pub fn parent_tree_path(&self) -> &str {
        parent_path(&self.tree_path)
    }

    /// Whether `other` lies strictly below this node
    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        self.id != other.id && is_within(&other.tree_path, &self.tree_path)
    }

    /// Whether this node is a direct child of `parent`
    pub fn is_child_of(&self, parent: &Node) -> bool {
        !self.is_root() && self.parent_tree_path() == parent.tree_path
    }

    /// Depth below root (root is 0)
    pub fn depth(&self) -> usize {
        self.tree_path.matches(PATH_SEPARATOR).count()
    }

    /// Same node, seen through `language`
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = Some(language.into());
        self
    }
}

/// Slugs for a node being added: one for every language, or one per language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slugs {
    /// Applied to every configured language
    Single(String),
    /// Language code to slug
    PerLanguage(BTreeMap<String, String>),
}

impl Slugs {
    /// Build a per-language slug map from `(language, slug)` pairs
    pub fn per_language<I, L, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, S)>,
        L: Into<String>,
        S: Into<String>,
    {
        Self::PerLanguage(
            pairs
                .into_iter()
                .map(|(l, s)| (l.into(), s.into()))
                .collect(),
        )
    }

    /// Resolve to a validated slug for each configured language
    ///
    /// Languages missing from a map take the default language's slug, or
    /// the map's first entry when the default language is absent as well.
    pub fn resolve(
        &self,
        languages: &[String],
        default_language: &str,
        max_len: usize,
    ) -> Result<BTreeMap<String, String>, ValidationError> {
        match self {
            Slugs::Single(slug) => {
                let slug = normalize_slug(slug, max_len)?;
                Ok(languages
                    .iter()
                    .map(|l| (l.clone(), slug.clone()))
                    .collect())
            }
            Slugs::PerLanguage(map) => {
                if map.is_empty() {
                    return Err(ValidationError::MissingSlug);
                }
                let mut normalized = BTreeMap::new();
                for (language, slug) in map {
                    if !languages.iter().any(|l| l == language) {
                        return Err(ValidationError::UnknownLanguage(language.clone()));
                    }
                    normalized.insert(language.clone(), normalize_slug(slug, max_len)?);
                }
                let fallback = normalized
                    .get(default_language)
                    .or_else(|| normalized.values().next())
                    .cloned()
                    .ok_or(ValidationError::MissingSlug)?;
                for language in languages {
                    normalized
                        .entry(language.clone())
                        .or_insert_with(|| fallback.clone());
                }
                Ok(normalized)
            }
        }
    }
}

impl From<&str> for Slugs {
    fn from(slug: &str) -> Self {
        Slugs::Single(slug.to_string())
    }
}

impl From<String> for Slugs {
    fn from(slug: String) -> Self {
        Slugs::Single(slug)
    }
}

impl From<BTreeMap<String, String>> for Slugs {
    fn from(map: BTreeMap<String, String>) -> Self {
        Slugs::PerLanguage(map)
    }
}

/// Where a node goes among its siblings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Placement {
    /// After the last sibling
    #[default]
    Append,
    /// Explicit position value
    At(i64),
    /// Directly after the sibling with this id
    After(String),
    /// Directly before the sibling with this id
    Before(String),
}

impl Placement {
    pub fn after(node: &Node) -> Self {
        Placement::After(node.id.clone())
    }

    pub fn before(node: &Node) -> Self {
        Placement::Before(node.id.clone())
    }
}
