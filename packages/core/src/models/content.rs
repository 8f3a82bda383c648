//! Content Data Structures
//!
//! A content record is created on its own and later attached to a node for
//! one language. Type-specific data lives in the free-form `properties`
//! JSON object; the common fields are columns.

use super::timestamp_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Workflow state every default workflow publishes under
pub const PUBLISHED_STATE: &str = "published";

/// A content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: String,

    /// Attached node (None while detached)
    pub node_id: Option<String>,

    /// Language code, or the `any` wildcard
    pub language: String,

    /// Type discriminator, resolved through the type registry
    pub content_type: String,

    pub title: String,

    /// Workflow state
    pub state: String,

    /// Start of the publication window (open when None)
    pub publication: Option<DateTime<Utc>>,

    /// End of the publication window (open when None)
    pub expire: Option<DateTime<Utc>>,

    /// Whether the item shows up in navigation
    pub navigation: bool,

    pub owner: Option<String>,

    /// Template name used by renderers
    pub template: String,

    /// Type-specific fields
    pub properties: Value,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    /// Related content ids
    pub related: Vec<String>,
}

impl Content {
    pub fn is_attached(&self) -> bool {
        self.node_id.is_some()
    }

    /// Published and inside its publication window at `now`
    ///
    /// The window is inclusive at the start and exclusive at the end.
    pub fn is_public_at(&self, now: DateTime<Utc>) -> bool {
        self.state == PUBLISHED_STATE
            && self.publication.map_or(true, |p| p <= now)
            && self.expire.map_or(true, |e| e > now)
    }

    /// Value of a named field: `title` maps to the column, anything else
    /// to a `properties` entry
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "title" => Some(Value::String(self.title.clone())),
            "template" => Some(Value::String(self.template.clone())),
            _ => self.properties.get(name).cloned(),
        }
    }
}

/// Parameters for creating a content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContent {
    pub content_type: String,
    pub title: String,

    /// None takes the configured default language
    #[serde(default)]
    pub language: Option<String>,

    /// None takes the type's workflow default
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub publication: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
    #[serde(default = "default_navigation")]
    pub navigation: bool,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub template: String,
    #[serde(default = "empty_properties")]
    pub properties: Value,
}

fn default_navigation() -> bool {
    true
}

fn empty_properties() -> Value {
    Value::Object(Default::default())
}

impl NewContent {
    pub fn new(content_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            title: title.into(),
            language: None,
            state: None,
            publication: None,
            expire: None,
            navigation: default_navigation(),
            owner: None,
            template: String::new(),
            properties: empty_properties(),
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn window(
        mut self,
        publication: Option<DateTime<Utc>>,
        expire: Option<DateTime<Utc>>,
    ) -> Self {
        self.publication = publication;
        self.expire = expire;
        self
    }

    pub fn navigation(mut self, navigation: bool) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Materialize into a detached record
    pub(crate) fn into_content(self, language: String, state: String) -> Content {
        let now = timestamp_now();
        Content {
            id: Uuid::new_v4().to_string(),
            node_id: None,
            language,
            content_type: self.content_type,
            title: self.title,
            state,
            publication: self.publication,
            expire: self.expire,
            navigation: self.navigation,
            owner: self.owner,
            template: self.template,
            properties: self.properties,
            created_at: now,
            modified_at: now,
            related: Vec::new(),
        }
    }
}

/// An attached content item as handed to search indexers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub content_id: String,
    pub node_id: String,
    pub language: String,

    /// Path of the node in the content's language (default language for `any`)
    pub path: String,

    pub content_type: String,
    pub title: String,
    pub state: String,
    pub publication: Option<DateTime<Utc>>,
    pub expire: Option<DateTime<Utc>>,
}
