//! Search index feed
//!
//! Search indexing is external to the tree. [`ContentService::index_entries`]
//! lists every attached record with the node path it is reachable under,
//! and [`ContentService::reindex`] streams that list into an [`IndexSink`].

use crate::config::ANY_LANGUAGE;
use crate::db::{ContentStore, TreeStore};
use crate::models::IndexEntry;
use crate::services::content_service::ContentService;
use crate::services::error::NodeServiceError;
use anyhow::Result;
use async_trait::async_trait;

/// Receiver of index entries (a search engine adapter, a test collector)
///
/// Implementations must be `Send + Sync` so a sink can be shared across
/// tasks.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Drop everything indexed so far
    async fn clear(&self) -> Result<()>;

    /// Add or replace the entry for `entry.content_id`
    async fn index(&self, entry: IndexEntry) -> Result<()>;
}

impl ContentService {
    /// Every attached content record with its node path
    ///
    /// The path is taken in the record's language; `any` records use the
    /// default language. Records whose node has no such path are skipped.
    pub async fn index_entries(&self) -> Result<Vec<IndexEntry>, NodeServiceError> {
        let conn = self.db().connect_with_timeout().await?;
        let contents = ContentStore::new(&conn).attached().await?;
        let tree = TreeStore::new(&conn);

        let mut entries = Vec::with_capacity(contents.len());
        for content in contents {
            let Some(node_id) = content.node_id else {
                continue;
            };
            let language = if content.language == ANY_LANGUAGE {
                self.config().default_language.as_str()
            } else {
                content.language.as_str()
            };
            let Some(path) = tree.path_of(&node_id, language).await? else {
                tracing::debug!(
                    "Skipping content {}: node {} has no '{}' path",
                    content.id,
                    node_id,
                    language
                );
                continue;
            };
            entries.push(IndexEntry {
                content_id: content.id,
                node_id,
                language: content.language,
                path,
                content_type: content.content_type,
                title: content.title,
                state: content.state,
                publication: content.publication,
                expire: content.expire,
            });
        }
        Ok(entries)
    }

    /// Clear `sink` and feed it every entry; returns the number indexed
    pub async fn reindex(&self, sink: &dyn IndexSink) -> Result<usize, NodeServiceError> {
        let entries = self.index_entries().await?;
        let count = entries.len();

        sink.clear()
            .await
            .map_err(|e| NodeServiceError::IndexSinkFailed(e.to_string()))?;
        for entry in entries {
            sink.index(entry)
                .await
                .map_err(|e| NodeServiceError::IndexSinkFailed(e.to_string()))?;
        }

        tracing::info!("Reindexed {} content records", count);
        Ok(count)
    }
}
