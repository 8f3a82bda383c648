//! Subtree export and import
//!
//! A [`SiteDocument`] is a JSON dump of a node, its content in every
//! language and all of its offspring. Importing replays the dump through
//! the regular `add`/`create`/`attach` operations, so every slug and
//! binding rule applies as usual.
//!
//! Relations between records survive the round trip. A relation to a record
//! outside the document is kept only when that record exists in the target
//! database.

use crate::models::{Content, NewContent, Node, Placement, Slugs};
use crate::services::error::NodeServiceError;
use crate::services::node_service::NodeService;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Document format version written by [`Exporter`]
pub const SITE_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDocument {
    pub version: u32,

    /// Path of the exported node in the default language
    pub base: String,

    pub nodes: Vec<ExportedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedNode {
    /// Slug in the default language; empty for the exported node itself
    pub slug: String,

    /// Slug per language
    #[serde(default)]
    pub slugs: BTreeMap<String, String>,

    #[serde(default)]
    pub position: i64,

    #[serde(default)]
    pub contents: Vec<ExportedContent>,

    #[serde(default)]
    pub children: Vec<ExportedNode>,
}

/// A content record as written to a [`SiteDocument`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedContent {
    /// Id in the exporting database; only used to link `related`
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub related: Vec<String>,

    #[serde(flatten)]
    pub content: NewContent,
}

impl SiteDocument {
    pub fn to_json(&self) -> Result<String, NodeServiceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| NodeServiceError::serialization_error(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, NodeServiceError> {
        serde_json::from_str(json).map_err(|e| NodeServiceError::serialization_error(e.to_string()))
    }
}

fn exported_content(content: Content) -> ExportedContent {
    ExportedContent {
        id: content.id,
        related: content.related,
        content: NewContent {
            content_type: content.content_type,
            title: content.title,
            language: Some(content.language),
            state: Some(content.state),
            publication: content.publication,
            expire: content.expire,
            navigation: content.navigation,
            owner: content.owner,
            template: content.template,
            properties: content.properties,
        },
    }
}

/// Builds a [`SiteDocument`] for a subtree
pub struct Exporter<'a> {
    service: &'a NodeService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a NodeService) -> Self {
        Self { service }
    }

    pub async fn export(&self, node: &Node) -> Result<SiteDocument, NodeServiceError> {
        let default_language = &self.service.config().default_language;
        let base = self.service.path_of(node, Some(default_language)).await?;

        let mut top = self.exported(node).await?;
        top.slug = String::new();
        top.slugs.clear();

        // Offspring come parents first, so every parent is already indexed
        let offspring = self.service.offspring(node).await?;
        let mut exported: BTreeMap<String, ExportedNode> = BTreeMap::new();
        let mut order: Vec<(String, String)> = Vec::with_capacity(offspring.len());
        for child in &offspring {
            exported.insert(child.tree_path.clone(), self.exported(child).await?);
            order.push((child.tree_path.clone(), child.parent_tree_path().to_string()));
        }

        // Fold children into their parents, deepest first
        for (tree_path, parent_tree_path) in order.into_iter().rev() {
            let Some(child) = exported.remove(&tree_path) else {
                continue;
            };
            match exported.get_mut(&parent_tree_path) {
                Some(parent) => parent.children.insert(0, child),
                None => top.children.insert(0, child),
            }
        }

        tracing::info!("Exported {} ({} nodes)", base, offspring.len() + 1);
        Ok(SiteDocument {
            version: SITE_DOCUMENT_VERSION,
            base,
            nodes: vec![top],
        })
    }

    async fn exported(&self, node: &Node) -> Result<ExportedNode, NodeServiceError> {
        let default_language = &self.service.config().default_language;
        let slugs: BTreeMap<String, String> = self
            .service
            .paths_of(node)
            .await?
            .iter()
            .map(|entry| (entry.language.clone(), entry.slug().to_string()))
            .collect();
        let contents = self
            .service
            .content()
            .contents_of(node)
            .await?
            .into_iter()
            .map(exported_content)
            .collect();

        Ok(ExportedNode {
            slug: slugs.get(default_language).cloned().unwrap_or_default(),
            slugs,
            position: node.position,
            contents,
            children: Vec::new(),
        })
    }
}

/// Counts of what an import created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub nodes: usize,
    pub contents: usize,
}

/// Replays a [`SiteDocument`] below a target node
pub struct Importer<'a> {
    service: &'a NodeService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a NodeService) -> Self {
        Self { service }
    }

    /// Import `document` below `target`
    ///
    /// An entry with an empty slug is `target` itself: its content is
    /// attached to `target` and its children are created below it.
    pub async fn import(
        &self,
        target: &Node,
        document: &SiteDocument,
    ) -> Result<ImportSummary, NodeServiceError> {
        if document.version != SITE_DOCUMENT_VERSION {
            return Err(NodeServiceError::import_failed(format!(
                "unsupported document version {} (expected {})",
                document.version, SITE_DOCUMENT_VERSION
            )));
        }

        let mut summary = ImportSummary::default();
        // Exported id -> created record, and the relations still to restore
        let mut created: HashMap<&str, String> = HashMap::new();
        let mut relations: Vec<(Content, &[String])> = Vec::new();
        let mut pending: Vec<(Node, &ExportedNode)> = document
            .nodes
            .iter()
            .rev()
            .map(|entry| (target.clone(), entry))
            .collect();

        while let Some((parent, entry)) = pending.pop() {
            let node = if entry.slug.is_empty() && entry.slugs.values().all(|s| s.is_empty()) {
                parent
            } else {
                let slugs = if entry.slugs.is_empty() {
                    Slugs::from(entry.slug.as_str())
                } else {
                    Slugs::from(entry.slugs.clone())
                };
                summary.nodes += 1;
                self.service
                    .add(&parent, slugs, Placement::At(entry.position))
                    .await?
            };

            for exported in &entry.contents {
                let mut content = self
                    .service
                    .content()
                    .create(exported.content.clone())
                    .await?;
                self.service
                    .content()
                    .attach(&node, &mut content, None, false)
                    .await?;
                summary.contents += 1;
                if !exported.id.is_empty() {
                    created.insert(exported.id.as_str(), content.id.clone());
                }
                if !exported.related.is_empty() {
                    relations.push((content, exported.related.as_slice()));
                }
            }

            for child in entry.children.iter().rev() {
                pending.push((node.clone(), child));
            }
        }

        for (mut content, related) in relations {
            for id in related {
                let id = created.get(id.as_str()).map_or(id.as_str(), String::as_str);
                match self.service.content().get(id).await? {
                    Some(other) => self.service.content().relate(&mut content, &other).await?,
                    None => tracing::debug!("Dropping relation of {} to unknown {}", content.id, id),
                }
            }
        }

        tracing::info!(
            "Imported {} nodes and {} content records from {}",
            summary.nodes,
            summary.contents,
            document.base
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::{ContentTypeRegistry, PUBLISHED};
    use crate::config::TreeConfig;
    use crate::db::DatabaseService;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_service() -> (NodeService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let service = NodeService::new(
            db,
            Arc::new(TreeConfig::with_languages(["en", "nl"])),
            Arc::new(ContentTypeRegistry::with_defaults()),
        )
        .unwrap();
        (service, temp_dir)
    }

    async fn attach(service: &NodeService, node: &Node, new: NewContent) {
        let mut content = service.content().create(new).await.unwrap();
        service
            .content()
            .attach(node, &mut content, None, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let (service, _temp) = create_test_service().await;
        let root = service.root(None).await.unwrap();
        let site = service.add(&root, "site", Placement::Append).await.unwrap();
        let about = service
            .add(&site, Slugs::per_language([("en", "about"), ("nl", "over")]), Placement::At(5))
            .await
            .unwrap();
        service.add(&about, "team", Placement::Append).await.unwrap();
        attach(&service, &site, NewContent::new("page", "Site").state(PUBLISHED)).await;
        attach(
            &service,
            &about,
            NewContent::new("page", "Over").language("nl").properties(json!({"body": "x"})),
        )
        .await;

        let document = Exporter::new(&service).export(&site).await.unwrap();
        assert_eq!(document.base, "/site");
        assert_eq!(document.nodes.len(), 1);
        assert_eq!(document.nodes[0].slug, "");
        assert_eq!(document.nodes[0].children[0].slug, "about");
        assert_eq!(document.nodes[0].children[0].children[0].slug, "team");

        let json = document.to_json().unwrap();
        let parsed = SiteDocument::from_json(&json).unwrap();
        assert_eq!(parsed, document);

        let target = service.add(&root, "mirror", Placement::Append).await.unwrap();
        let summary = Importer::new(&service).import(&target, &parsed).await.unwrap();
        assert_eq!(summary, ImportSummary { nodes: 2, contents: 2 });

        let mirrored = service.resolve("/site/over", Some("nl")).await.unwrap();
        assert_eq!(mirrored.id, about.id);
        let about_copy = service.resolve("/mirror/over", Some("nl")).await.unwrap();
        assert_eq!(about_copy.position, 5);
        assert!(service.find("/mirror/about/team", None).await.unwrap().is_some());

        let content = service
            .content()
            .resolve(&about_copy, Some("nl"), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.properties, json!({"body": "x"}));
        let top = service.content().resolve(&target, None, false).await.unwrap().unwrap();
        assert_eq!(top.state, PUBLISHED);
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_version() {
        let (service, _temp) = create_test_service().await;
        let root = service.root(None).await.unwrap();
        let document = SiteDocument {
            version: 2,
            base: String::new(),
            nodes: Vec::new(),
        };

        let err = Importer::new(&service).import(&root, &document).await.unwrap_err();
        assert!(matches!(err, NodeServiceError::ImportFailed(_)));
        assert!(SiteDocument::from_json("{").is_err());
    }

    #[tokio::test]
    async fn test_import_restores_relations() {
        let (service, _temp) = create_test_service().await;
        let root = service.root(None).await.unwrap();
        let site = service.add(&root, "site", Placement::Append).await.unwrap();
        let news = service.add(&site, "news", Placement::Append).await.unwrap();
        let outside = service.add(&root, "outside", Placement::Append).await.unwrap();

        let mut index = service.content().create(NewContent::new("page", "Index")).await.unwrap();
        service.content().attach(&site, &mut index, None, false).await.unwrap();
        let mut item = service.content().create(NewContent::new("page", "Item")).await.unwrap();
        service.content().attach(&news, &mut item, None, false).await.unwrap();
        let mut far = service.content().create(NewContent::new("page", "Far")).await.unwrap();
        service.content().attach(&outside, &mut far, None, false).await.unwrap();
        service.content().relate(&mut index, &item).await.unwrap();
        service.content().relate(&mut index, &far).await.unwrap();

        let document = Exporter::new(&service).export(&site).await.unwrap();
        assert_eq!(document.nodes[0].contents[0].related.len(), 2);
        let parsed = SiteDocument::from_json(&document.to_json().unwrap()).unwrap();

        let target = service.add(&root, "mirror", Placement::Append).await.unwrap();
        Importer::new(&service).import(&target, &parsed).await.unwrap();

        let index_copy = service.content().resolve(&target, None, false).await.unwrap().unwrap();
        let news_copy = service.resolve("/mirror/news", None).await.unwrap();
        let item_copy = service
            .content()
            .resolve(&news_copy, None, false)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(item_copy.id, item.id);

        // inside the document: points at the imported record
        // outside it: still points at the existing record
        let mut related = index_copy.related.clone();
        related.sort();
        let mut expected = vec![item_copy.id.clone(), far.id.clone()];
        expected.sort();
        assert_eq!(related, expected);
    }
}
