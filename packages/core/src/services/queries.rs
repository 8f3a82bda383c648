//! Node queries joined with content state

use crate::config::ANY_LANGUAGE;
use crate::db::TreeStore;
use crate::models::Node;
use crate::services::error::NodeServiceError;
use crate::services::node_service::NodeService;
use chrono::{DateTime, Utc};

impl NodeService {
    /// Nodes with at least one attached content record, in tree-path order
    pub async fn attached_nodes(&self) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db().connect_with_timeout().await?;
        Ok(TreeStore::new(&conn).attached_nodes().await?)
    }

    /// Nodes with published content whose publication window contains `now`
    pub async fn public_nodes(&self, now: DateTime<Utc>) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db().connect_with_timeout().await?;
        Ok(TreeStore::new(&conn).public_nodes(&now).await?)
    }

    /// Children of `node` to show in navigation, by position
    ///
    /// A child qualifies when its content in `language` (or `any`) is
    /// published and flagged for navigation.
    pub async fn visible_children(
        &self,
        node: &Node,
        language: Option<&str>,
    ) -> Result<Vec<Node>, NodeServiceError> {
        let language = self.language_for(node, language);
        let conn = self.db().connect_with_timeout().await?;
        Ok(TreeStore::new(&conn)
            .visible_children(&node.tree_path, &language, ANY_LANGUAGE)
            .await?
            .into_iter()
            .map(|n| n.with_language(language.clone()))
            .collect())
    }
}
