//! Node Service - Tree Operations
//!
//! This module provides the business logic for the content tree:
//!
//! - Lookup by user-facing path per language (`resolve`, `find`, `path_of`)
//! - Lifecycle (`add`, `remove`, `rename`)
//! - Sibling order (`children`, `reposition`)
//! - Subtree paste (move / copy), see [`paste`](crate::services::PasteMode)
//!
//! # Paths and languages
//!
//! Every node has one path row per configured language. Path lookups never
//! fall back to another language; only content lookups fall back to `any`.
//! Calls that take `Option<&str>` for the language use, in order: the
//! argument, the node's `preferred_language`, the configured default.
//!
//! # Transactions
//!
//! Every mutation runs in one [`UnitOfWork`](crate::db::UnitOfWork) and
//! publishes its [`DomainEvent`] only after commit.

use crate::behaviors::ContentTypeRegistry;
use crate::config::TreeConfig;
use crate::db::{DatabaseError, DatabaseService, DomainEvent, PathChange, TreeStore};
use crate::models::{
    join_path, normalize_slug, parent_path, Node, PathEntry, Placement, Slugs, ValidationError,
    PATH_SEPARATOR, ROOT_PATH,
};
use crate::operations::PositionAllocator;
use crate::services::content_service::{ContentService, DOMAIN_EVENT_CHANNEL_CAPACITY};
use crate::services::error::NodeServiceError;
use libsql::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Map a path-table write failure: a unique-index clash is `DuplicatePath`
pub(crate) fn path_write_error(err: DatabaseError, language: &str, path: &str) -> NodeServiceError {
    if err.is_constraint_violation() {
        NodeServiceError::duplicate_path(language, path)
    } else {
        err.into()
    }
}

/// Core service for tree lookups and mutations
///
/// # Examples
///
/// ```no_run
/// use slugtree_core::behaviors::ContentTypeRegistry;
/// use slugtree_core::config::TreeConfig;
/// use slugtree_core::db::DatabaseService;
/// use slugtree_core::models::Placement;
/// use slugtree_core::services::NodeService;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/site.db")).await?);
///     let service = NodeService::new(
///         db,
///         Arc::new(TreeConfig::with_languages(["en", "nl"])),
///         Arc::new(ContentTypeRegistry::with_defaults()),
///     )?;
///
///     let root = service.root(None).await?;
///     let about = service.add(&root, "about", Placement::Append).await?;
///     assert_eq!(service.path_of(&about, Some("nl")).await?, "/about");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct NodeService {
    db: Arc<DatabaseService>,
    config: Arc<TreeConfig>,
    allocator: PositionAllocator,
    content: ContentService,

    /// Broadcast channel for domain events, shared with the content service
    event_tx: broadcast::Sender<DomainEvent>,
}

impl NodeService {
    /// Create a new NodeService
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        db: Arc<DatabaseService>,
        config: Arc<TreeConfig>,
        registry: Arc<ContentTypeRegistry>,
    ) -> Result<Self, NodeServiceError> {
        config
            .validate()
            .map_err(|e| NodeServiceError::Config(crate::config::ConfigError::Invalid(e)))?;

        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        let content =
            ContentService::with_events(db.clone(), config.clone(), registry, event_tx.clone());

        Ok(Self {
            allocator: PositionAllocator::new(config.position_interval),
            db,
            config,
            content,
            event_tx,
        })
    }

    /// Content service sharing this service's database and event bus
    pub fn content(&self) -> &ContentService {
        &self.content
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    /// Subscribe to node and content events
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a domain event to all subscribers (no subscriber is fine)
    pub(crate) fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    /// Language for a call on `node`: argument, node hint, configured default
    pub(crate) fn language_for(&self, node: &Node, language: Option<&str>) -> String {
        language
            .or(node.preferred_language.as_deref())
            .unwrap_or(&self.config.default_language)
            .to_string()
    }

    fn require_language(&self, language: &str) -> Result<(), NodeServiceError> {
        if self.config.has_language(language) {
            Ok(())
        } else {
            Err(ValidationError::UnknownLanguage(language.to_string()).into())
        }
    }

    /// Re-read `node` inside the current transaction
    pub(crate) async fn fresh(
        store: &TreeStore<'_>,
        node: &Node,
    ) -> Result<Node, NodeServiceError> {
        store
            .get_node(&node.id)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(&node.id))
    }

    //
    // LOOKUP
    //

    /// The root node, created on first use
    ///
    /// Also adds root path rows for languages configured after the root
    /// was created.
    pub async fn root(&self, language: Option<&str>) -> Result<Node, NodeServiceError> {
        let language = language.unwrap_or(&self.config.default_language).to_string();

        let conn = self.db.connect_with_timeout().await?;
        let store = TreeStore::new(&conn);
        if let Some(root) = store.get_by_tree_path(ROOT_PATH).await? {
            if store.paths_of(&root.id).await?.len() >= self.config.languages.len() {
                return Ok(root.with_language(language));
            }
        }
        drop(store);

        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = TreeStore::new(uow.conn());
            let (root, created) = match store.get_by_tree_path(ROOT_PATH).await? {
                Some(root) => (root, false),
                None => {
                    let root = Node::new_root();
                    store.insert_node(&root).await?;
                    (root, true)
                }
            };
            for lang in &self.config.languages {
                if store.path_of(&root.id, lang).await?.is_none() {
                    store
                        .insert_path(&PathEntry::new(&root.id, lang, ROOT_PATH))
                        .await?;
                }
            }
            Ok((root, created))
        }
        .await;
        let (root, created) = uow.finish(result).await?;

        if created {
            tracing::info!("Created root node {}", root.id);
            self.emit_event(DomainEvent::NodeCreated(root.clone()));
        }
        Ok(root.with_language(language))
    }

    /// Node at `path` in `language` (default language if None)
    ///
    /// `""` (and `"/"`) is the root, created on demand.
    pub async fn resolve(&self, path: &str, language: Option<&str>) -> Result<Node, NodeServiceError> {
        self.find(path, language)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(path))
    }

    /// Non-failing variant of [`resolve`](Self::resolve)
    pub async fn find(
        &self,
        path: &str,
        language: Option<&str>,
    ) -> Result<Option<Node>, NodeServiceError> {
        let language = language.unwrap_or(&self.config.default_language);
        let path = path.strip_suffix(PATH_SEPARATOR).unwrap_or(path);
        if path == ROOT_PATH {
            return Ok(Some(self.root(Some(language)).await?));
        }

        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::new(&conn)
            .node_at(language, path)
            .await?
            .map(|n| n.with_language(language)))
    }

    /// Node by id
    pub async fn get(&self, id: &str) -> Result<Option<Node>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::new(&conn).get_node(id).await?)
    }

    /// User-facing path of `node` in a language; no fallback
    pub async fn path_of(&self, node: &Node, language: Option<&str>) -> Result<String, NodeServiceError> {
        let language = self.language_for(node, language);
        let conn = self.db.connect_with_timeout().await?;
        TreeStore::new(&conn)
            .path_of(&node.id, &language)
            .await?
            .ok_or_else(|| NodeServiceError::path_not_found(&node.id, language))
    }

    /// Every path row of `node`
    pub async fn paths_of(&self, node: &Node) -> Result<Vec<PathEntry>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::new(&conn).paths_of(&node.id).await?)
    }

    /// Last path segment of `node` in a language (empty for root)
    pub async fn slug_of(&self, node: &Node, language: Option<&str>) -> Result<String, NodeServiceError> {
        let path = self.path_of(node, language).await?;
        Ok(crate::models::last_segment(&path).to_string())
    }

    /// Parent of `node`; root is its own parent
    pub async fn parent(&self, node: &Node) -> Result<Node, NodeServiceError> {
        if node.is_root() {
            return Ok(node.clone());
        }
        let conn = self.db.connect_with_timeout().await?;
        let parent = TreeStore::new(&conn)
            .get_by_tree_path(node.parent_tree_path())
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(node.parent_tree_path()))?;
        Ok(match &node.preferred_language {
            Some(language) => parent.with_language(language.clone()),
            None => parent,
        })
    }

    /// Direct child of `node` with `slug` in a language
    pub async fn child(
        &self,
        node: &Node,
        slug: &str,
        language: Option<&str>,
    ) -> Result<Option<Node>, NodeServiceError> {
        let language = self.language_for(node, language);
        let conn = self.db.connect_with_timeout().await?;
        Self::child_in(&TreeStore::new(&conn), node, slug, &language).await
    }

    async fn child_in(
        store: &TreeStore<'_>,
        node: &Node,
        slug: &str,
        language: &str,
    ) -> Result<Option<Node>, NodeServiceError> {
        let slug = slug.to_lowercase();
        if slug.is_empty() || slug.contains(PATH_SEPARATOR) {
            return Ok(None);
        }
        let Some(base) = store.path_of(&node.id, language).await? else {
            return Ok(None);
        };
        Ok(store
            .node_at(language, &join_path(&base, &slug))
            .await?
            .map(|n| n.with_language(language)))
    }

    /// Direct children in position order, carrying the requested language
    pub async fn children(
        &self,
        node: &Node,
        language: Option<&str>,
    ) -> Result<Vec<Node>, NodeServiceError> {
        let language = self.language_for(node, language);
        let conn = self.db.connect_with_timeout().await?;
        Ok(TreeStore::new(&conn)
            .children(&node.tree_path)
            .await?
            .into_iter()
            .map(|n| n.with_language(language.clone()))
            .collect())
    }

    /// All descendants, parents before children
    pub async fn offspring(&self, node: &Node) -> Result<Vec<Node>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let offspring = TreeStore::new(&conn).offspring(&node.tree_path).await?;
        Ok(match &node.preferred_language {
            Some(language) => offspring
                .into_iter()
                .map(|n| n.with_language(language.clone()))
                .collect(),
            None => offspring,
        })
    }

    //
    // MUTATION
    //

    /// Add a child below `parent`
    ///
    /// A single slug applies to every configured language; a language map
    /// may name a subset, the rest take the default language's slug. Any
    /// clash with an existing path fails with `DuplicatePath` and writes
    /// nothing.
    pub async fn add(
        &self,
        parent: &Node,
        slugs: impl Into<Slugs>,
        placement: Placement,
    ) -> Result<Node, NodeServiceError> {
        let slugs = slugs.into().resolve(
            &self.config.languages,
            &self.config.default_language,
            self.config.max_slug_length,
        )?;

        let uow = self.db.begin().await?;
        let result = self.add_in(uow.conn(), parent, &slugs, &placement).await;
        let node = uow.finish(result).await?;

        tracing::info!(
            "Added node {} under {} at position {}",
            node.id,
            parent.id,
            node.position
        );
        self.emit_event(DomainEvent::NodeCreated(node.clone()));
        Ok(node.with_language(self.language_for(parent, None)))
    }

    pub(crate) async fn add_in(
        &self,
        conn: &Connection,
        parent: &Node,
        slugs: &BTreeMap<String, String>,
        placement: &Placement,
    ) -> Result<Node, NodeServiceError> {
        let store = TreeStore::new(conn);
        let parent = Self::fresh(&store, parent).await?;

        let mut entries = Vec::with_capacity(slugs.len());
        for (language, slug) in slugs {
            let base = store
                .path_of(&parent.id, language)
                .await?
                .ok_or_else(|| NodeServiceError::path_not_found(&parent.id, language))?;
            let path = join_path(&base, slug);
            if store.path_exists(language, &path).await? {
                return Err(NodeServiceError::duplicate_path(language, path));
            }
            entries.push((language, path));
        }

        let siblings = store.siblings(&parent.tree_path).await?;
        let allocation = self.allocator.allocate(&siblings, placement)?;
        if !allocation.renumbered.is_empty() {
            tracing::debug!(
                "Renumbering {} siblings under {}",
                allocation.renumbered.len(),
                parent.id
            );
            store.set_positions(&allocation.renumbered).await?;
        }

        let node = Node::new_child(&parent, allocation.position);
        store.insert_node(&node).await?;
        for (language, path) in entries {
            store
                .insert_path(&PathEntry::new(&node.id, language, &path))
                .await
                .map_err(|e| path_write_error(e, language, &path))?;
        }
        Ok(node)
    }

    /// Remove the child of `parent` named `slug`, with its whole subtree
    ///
    /// Path rows are deleted and content is detached, not deleted.
    pub async fn remove(
        &self,
        parent: &Node,
        slug: &str,
        language: Option<&str>,
    ) -> Result<(), NodeServiceError> {
        let language = self.language_for(parent, language);

        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = TreeStore::new(uow.conn());
            let child = Self::child_in(&store, parent, slug, &language)
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(slug))?;
            let removed = store.delete_subtree(&child.tree_path).await?;
            Ok((child, removed))
        }
        .await;
        let (child, removed) = uow.finish(result).await?;

        tracing::info!(
            "Removed node {} ({} nodes in subtree)",
            child.id,
            removed.len()
        );
        self.emit_event(DomainEvent::NodeRemoved {
            id: child.id,
            removed,
        });
        Ok(())
    }

    /// Change the slug of `node` in one language, or in all when None
    ///
    /// Every new path is checked before anything is written, so a clash
    /// leaves the path table untouched. Descendant paths follow.
    pub async fn rename(
        &self,
        node: &Node,
        slug: &str,
        language: Option<&str>,
    ) -> Result<Node, NodeServiceError> {
        if node.is_root() {
            return Err(NodeServiceError::CantRenameRoot);
        }
        let slug = normalize_slug(slug, self.config.max_slug_length)?;
        let languages: Vec<String> = match language {
            Some(language) => {
                self.require_language(language)?;
                vec![language.to_string()]
            }
            None => self.config.languages.clone(),
        };

        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = TreeStore::new(uow.conn());
            let node = Self::fresh(&store, node).await?;

            let mut changes = Vec::new();
            for language in &languages {
                let old_path = store
                    .path_of(&node.id, language)
                    .await?
                    .ok_or_else(|| NodeServiceError::path_not_found(&node.id, language))?;
                let new_path = join_path(parent_path(&old_path), &slug);
                if new_path == old_path {
                    continue;
                }
                if store.path_exists(language, &new_path).await? {
                    return Err(NodeServiceError::duplicate_path(language, new_path));
                }
                changes.push(PathChange {
                    language: language.clone(),
                    old_path,
                    new_path,
                });
            }

            for change in &changes {
                store
                    .rewrite_paths(&change.language, &change.old_path, &change.new_path)
                    .await
                    .map_err(|e| path_write_error(e, &change.language, &change.new_path))?;
            }
            Ok((node, changes))
        }
        .await;
        let (renamed, changes) = uow.finish(result).await?;

        for change in &changes {
            tracing::info!(
                "Renamed {} -> {} ({})",
                change.old_path,
                change.new_path,
                change.language
            );
        }
        if !changes.is_empty() {
            self.emit_event(DomainEvent::NodeRenamed {
                id: renamed.id.clone(),
                changes,
            });
        }
        Ok(renamed.with_language(self.language_for(node, language)))
    }

    /// Move `child` to a new place among the other children of `parent`
    pub async fn reposition(
        &self,
        parent: &Node,
        child: &Node,
        placement: Placement,
    ) -> Result<Node, NodeServiceError> {
        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = TreeStore::new(uow.conn());
            let parent = Self::fresh(&store, parent).await?;
            let mut child = Self::fresh(&store, child).await?;
            if !child.is_child_of(&parent) {
                return Err(NodeServiceError::node_not_found(format!(
                    "{} is not a child of {}",
                    child.id, parent.id
                )));
            }

            let siblings: Vec<_> = store
                .siblings(&parent.tree_path)
                .await?
                .into_iter()
                .filter(|s| s.id != child.id)
                .collect();
            let allocation = self.allocator.allocate(&siblings, &placement)?;
            store.set_positions(&allocation.renumbered).await?;
            store.set_position(&child.id, allocation.position).await?;
            child.position = allocation.position;
            Ok(child)
        }
        .await;
        let moved = uow.finish(result).await?;

        tracing::debug!("Repositioned node {} to {}", moved.id, moved.position);
        self.emit_event(DomainEvent::NodeRepositioned {
            id: moved.id.clone(),
            position: moved.position,
        });
        Ok(match &child.preferred_language {
            Some(language) => moved.with_language(language.clone()),
            None => moved,
        })
    }
}
