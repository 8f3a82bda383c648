//! Content Type System
//!
//! - [`Workflow`] - the states a content record can be in, and its default
//! - [`ContentType`] - per-type rules: copyability, unique fields, workflow
//! - [`ContentTypeRegistry`] - lookup by type name, built at startup and
//!   shared through an `Arc`
//!
//! The registry is explicit: services receive it at construction, nothing
//! registers itself globally.

use std::collections::BTreeMap;

pub const PRIVATE: &str = "private";
pub const VISIBLE: &str = "visible";
pub const PENDING: &str = "pending";
pub const PUBLISHED: &str = crate::models::PUBLISHED_STATE;
pub const REJECTED: &str = "rejected";

/// Workflow states with display labels, plus the state new content starts in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    states: Vec<(String, String)>,
    default_state: String,
}

impl Default for Workflow {
    /// private / visible / pending / published / rejected, starting private
    fn default() -> Self {
        Self {
            states: [
                (PRIVATE, "Private"),
                (VISIBLE, "Visible"),
                (PENDING, "Pending"),
                (PUBLISHED, "Published"),
                (REJECTED, "Rejected"),
            ]
            .into_iter()
            .map(|(state, label)| (state.to_string(), label.to_string()))
            .collect(),
            default_state: PRIVATE.to_string(),
        }
    }
}

impl Workflow {
    /// Custom workflow; `default_state` must be one of `states`
    pub fn new<I, S, L>(states: I, default_state: impl Into<String>) -> Option<Self>
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        let states: Vec<(String, String)> = states
            .into_iter()
            .map(|(s, l)| (s.into(), l.into()))
            .collect();
        let default_state = default_state.into();
        states
            .iter()
            .any(|(s, _)| *s == default_state)
            .then_some(Self {
                states,
                default_state,
            })
    }

    pub fn default_state(&self) -> &str {
        &self.default_state
    }

    pub fn is_valid(&self, state: &str) -> bool {
        self.states.iter().any(|(s, _)| s == state)
    }

    pub fn label(&self, state: &str) -> Option<&str> {
        self.states
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, label)| label.as_str())
    }

    pub fn is_published(&self, state: &str) -> bool {
        state == PUBLISHED
    }

    /// Published or explicitly visible
    pub fn is_visible(&self, state: &str) -> bool {
        self.is_published(state) || state == VISIBLE
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|(s, _)| s.as_str())
    }
}

/// Rules for one content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub name: String,
    /// Whether copy-paste may duplicate records of this type
    pub copyable: bool,
    /// Fields whose value must be unique among records of this type
    pub unique_fields: Vec<String>,
    pub workflow: Workflow,
}

impl ContentType {
    /// Copyable type with the default workflow and no unique fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            copyable: true,
            unique_fields: Vec::new(),
            workflow: Workflow::default(),
        }
    }

    pub fn copyable(mut self, copyable: bool) -> Self {
        self.copyable = copyable;
        self
    }

    pub fn unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    pub fn workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }
}

/// Content types by name
#[derive(Debug, Clone, Default)]
pub struct ContentTypeRegistry {
    types: BTreeMap<String, ContentType>,
}

impl ContentTypeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `page` and `news` types
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ContentType::new("page"));
        registry.register(ContentType::new("news"));
        registry
    }

    /// Register (or replace) a type
    pub fn register(&mut self, content_type: ContentType) -> &mut Self {
        self.types
            .insert(content_type.name.clone(), content_type);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ContentType> {
        self.types.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_workflow() {
        let workflow = Workflow::default();
        assert_eq!(workflow.default_state(), PRIVATE);
        assert!(workflow.is_valid("pending"));
        assert!(!workflow.is_valid("archived"));
        assert_eq!(workflow.label(PUBLISHED), Some("Published"));
        assert!(workflow.is_visible(VISIBLE));
        assert!(workflow.is_visible(PUBLISHED));
        assert!(!workflow.is_visible(PENDING));
        assert_eq!(workflow.states().count(), 5);
    }

    #[test]
    fn test_custom_workflow_requires_known_default() {
        assert!(Workflow::new([("draft", "Draft"), ("live", "Live")], "draft").is_some());
        assert!(Workflow::new([("draft", "Draft")], "live").is_none());
    }

    #[test]
    fn test_registry() {
        let mut registry = ContentTypeRegistry::with_defaults();
        assert!(registry.get("page").unwrap().copyable);
        assert!(registry.get("unknown").is_none());

        registry.register(
            ContentType::new("category")
                .copyable(false)
                .unique_field("code"),
        );
        let category = registry.get("category").unwrap();
        assert!(!category.copyable);
        assert_eq!(category.unique_fields, vec!["code".to_string()]);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["category", "news", "page"]
        );
    }
}
