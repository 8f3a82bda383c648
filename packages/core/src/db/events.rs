//! Domain Events
//!
//! Events emitted by the services after a mutation has committed. Other
//! parts of the system (permission sync, search indexers, caches) subscribe
//! without coupling to the tree implementation.
//!
//! # Architecture
//!
//! Events go out over a tokio broadcast channel, so any number of
//! subscribers receive them asynchronously. Sending with no subscriber is
//! not an error.

use crate::models::Node;
use serde::{Deserialize, Serialize};

/// A user-facing path that changed in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathChange {
    pub language: String,
    pub old_path: String,
    pub new_path: String,
}

/// Domain events emitted by the node and content services
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A node was added
    NodeCreated(Node),

    /// A node and its subtree were removed
    NodeRemoved { id: String, removed: Vec<String> },

    /// A node's slug changed in one or more languages
    NodeRenamed { id: String, changes: Vec<PathChange> },

    /// A node moved under a new parent
    NodeMoved {
        id: String,
        old_parent_id: String,
        new_parent_id: String,
        changes: Vec<PathChange>,
    },

    /// A node changed place among its siblings
    NodeRepositioned { id: String, position: i64 },

    /// A subtree was copied
    NodeCopied { source_id: String, copy_id: String },

    /// Content was bound to a node
    ContentAttached {
        content_id: String,
        node_id: String,
        language: String,
    },

    /// Content was unbound from its node
    ContentDetached { content_id: String, node_id: String },

    /// A content record's workflow state changed (or was first set)
    ContentStateChanged {
        content_id: String,
        old_state: Option<String>,
        new_state: String,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodeCreated(_) => "node:created",
            DomainEvent::NodeRemoved { .. } => "node:removed",
            DomainEvent::NodeRenamed { .. } => "node:renamed",
            DomainEvent::NodeMoved { .. } => "node:moved",
            DomainEvent::NodeRepositioned { .. } => "node:repositioned",
            DomainEvent::NodeCopied { .. } => "node:copied",
            DomainEvent::ContentAttached { .. } => "content:attached",
            DomainEvent::ContentDetached { .. } => "content:detached",
            DomainEvent::ContentStateChanged { .. } => "content:state-changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: the JSON shape subscribers rely on for path changes
    #[test]
    fn test_path_change_serialization_contract() {
        let change = PathChange {
            language: "en".to_string(),
            old_path: "/aaa".to_string(),
            new_path: "/ccc".to_string(),
        };

        let parsed: serde_json::Value = serde_json::to_value(&change).unwrap();
        assert_eq!(parsed.get("language").unwrap(), "en");
        assert_eq!(parsed.get("oldPath").unwrap(), "/aaa");
        assert_eq!(parsed.get("newPath").unwrap(), "/ccc");
        assert!(parsed.get("old_path").is_none());

        let back: PathChange = serde_json::from_value(parsed).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn test_event_types() {
        let event = DomainEvent::ContentStateChanged {
            content_id: "c".to_string(),
            old_state: None,
            new_state: "private".to_string(),
        };
        assert_eq!(event.event_type(), "content:state-changed");
        assert_eq!(
            DomainEvent::NodeRepositioned {
                id: "n".to_string(),
                position: 5
            }
            .event_type(),
            "node:repositioned"
        );
    }
}
