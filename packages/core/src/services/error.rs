//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::models::ValidationError;
use crate::operations::AllocationError;
use thiserror::Error;

/// Service operation errors
///
/// Validation (`InvalidPath`), conflicts (`DuplicatePath`, `NodeInUse`,
/// `UniqueViolation`), structural errors (`NodeNotFound`, `PathNotFound`,
/// `CantMoveToOffspring`, `CantRenameRoot`) and content-copy errors, which
/// paste recovers from locally.
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// Slug or slug map rejected
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] ValidationError),

    /// `(language, path)` already taken
    #[error("Duplicate path '{path}' for language '{language}'")]
    DuplicatePath { language: String, path: String },

    /// Node already has content for the language
    #[error("Node {node_id} already has content for language '{language}'")]
    NodeInUse { node_id: String, language: String },

    /// Node not found by id or path
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Node has no path row for the language
    #[error("Node {node_id} has no path for language '{language}'")]
    PathNotFound { node_id: String, language: String },

    /// Paste target is the source or lies below it
    #[error("Can't move {source_path} into its own offspring {target_path}")]
    CantMoveToOffspring {
        source_path: String,
        target_path: String,
    },

    /// The root has no slug to rename
    #[error("Can't rename the root node")]
    CantRenameRoot,

    /// Content type does not allow copying
    #[error("Content of type '{content_type}' can't be copied")]
    ContentCopyNotSupported { content_type: String },

    /// Copy rejected by a uniqueness constraint
    #[error("Content copy failed: {reason}")]
    ContentCopyFailed { reason: String },

    /// Content record not found
    #[error("Content not found: {id}")]
    ContentNotFound { id: String },

    /// Content type not registered
    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    /// State not part of the type's workflow
    #[error("State '{state}' is not valid for content type '{content_type}'")]
    InvalidState { content_type: String, state: String },

    /// Unique field value already taken
    #[error("Value {value} of field '{field}' is already used by another '{content_type}'")]
    UniqueViolation {
        content_type: String,
        field: String,
        value: String,
    },

    /// Placement anchor is not a sibling
    #[error("Invalid placement: {0}")]
    InvalidPlacement(#[from] AllocationError),

    /// Search index collaborator rejected an entry
    #[error("Index sink failed: {0}")]
    IndexSinkFailed(String),

    /// Import document rejected
    #[error("Import failed: {0}")]
    ImportFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),
}

impl NodeServiceError {
    /// Create a duplicate path error
    pub fn duplicate_path(language: impl Into<String>, path: impl Into<String>) -> Self {
        Self::DuplicatePath {
            language: language.into(),
            path: path.into(),
        }
    }

    /// Create a node in use error
    pub fn node_in_use(node_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self::NodeInUse {
            node_id: node_id.into(),
            language: language.into(),
        }
    }

    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create a path not found error
    pub fn path_not_found(node_id: impl Into<String>, language: impl Into<String>) -> Self {
        Self::PathNotFound {
            node_id: node_id.into(),
            language: language.into(),
        }
    }

    /// Create a move-into-offspring error
    pub fn cant_move_to_offspring(
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self::CantMoveToOffspring {
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Create a copy not supported error
    pub fn content_copy_not_supported(content_type: impl Into<String>) -> Self {
        Self::ContentCopyNotSupported {
            content_type: content_type.into(),
        }
    }

    /// Create a copy failed error
    pub fn content_copy_failed(reason: impl Into<String>) -> Self {
        Self::ContentCopyFailed {
            reason: reason.into(),
        }
    }

    /// Create a content not found error
    pub fn content_not_found(id: impl Into<String>) -> Self {
        Self::ContentNotFound { id: id.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(content_type: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            content_type: content_type.into(),
            state: state.into(),
        }
    }

    /// Create a unique violation error
    pub fn unique_violation(
        content_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::UniqueViolation {
            content_type: content_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an import failed error
    pub fn import_failed(msg: impl Into<String>) -> Self {
        Self::ImportFailed(msg.into())
    }

    /// Create a serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, Self::InvalidPath(_))
    }

    pub fn is_duplicate_path(&self) -> bool {
        matches!(self, Self::DuplicatePath { .. })
    }

    pub fn is_node_in_use(&self) -> bool {
        matches!(self, Self::NodeInUse { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::PathNotFound { .. } | Self::ContentNotFound { .. }
        )
    }

    /// Errors paste records per node instead of aborting on
    pub fn is_content_copy_error(&self) -> bool {
        matches!(
            self,
            Self::ContentCopyNotSupported { .. } | Self::ContentCopyFailed { .. }
        )
    }
}
