use serde::{Deserialize, Serialize};

/// One row of the path table: the user-facing path of a node in a language
///
/// `(language, path)` is unique across the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub node_id: String,
    pub language: String,
    pub path: String,
}

impl PathEntry {
    pub fn new(
        node_id: impl Into<String>,
        language: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            language: language.into(),
            path: path.into(),
        }
    }

    /// Last path segment (empty for root)
    pub fn slug(&self) -> &str {
        super::last_segment(&self.path)
    }
}
