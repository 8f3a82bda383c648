//! Content Service - binding content records to nodes
//!
//! Content is created detached, then attached to a node for one language.
//! A node holds at most one record per language; lookups can fall back to
//! the `any` wildcard language.
//!
//! Unique fields declared by a content type are enforced through the
//! `content_unique_values` table. Plain create/save reports a clash as
//! `UniqueViolation`; copy reports it as `ContentCopyFailed`, which paste
//! recovers from per branch.

use crate::behaviors::{ContentType, ContentTypeRegistry};
use crate::config::{TreeConfig, ANY_LANGUAGE};
use crate::db::{ContentStore, DatabaseError, DatabaseService, DomainEvent, TreeStore};
use crate::models::{timestamp_now, Content, NewContent, Node, ValidationError};
use crate::services::error::NodeServiceError;
use libsql::Connection;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast channel capacity for domain events
pub(crate) const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Text stored for a unique field value; null and missing values are not recorded
fn unique_value(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[derive(Clone)]
pub struct ContentService {
    db: Arc<DatabaseService>,
    config: Arc<TreeConfig>,
    registry: Arc<ContentTypeRegistry>,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl ContentService {
    pub fn new(
        db: Arc<DatabaseService>,
        config: Arc<TreeConfig>,
        registry: Arc<ContentTypeRegistry>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self::with_events(db, config, registry, event_tx)
    }

    /// Service publishing on an existing event channel
    pub(crate) fn with_events(
        db: Arc<DatabaseService>,
        config: Arc<TreeConfig>,
        registry: Arc<ContentTypeRegistry>,
        event_tx: broadcast::Sender<DomainEvent>,
    ) -> Self {
        Self {
            db,
            config,
            registry,
            event_tx,
        }
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    fn content_type(&self, name: &str) -> Result<&ContentType, NodeServiceError> {
        self.registry
            .get(name)
            .ok_or_else(|| NodeServiceError::UnknownContentType(name.to_string()))
    }

    fn check_language(&self, language: &str) -> Result<(), NodeServiceError> {
        if language == ANY_LANGUAGE || self.config.has_language(language) {
            Ok(())
        } else {
            Err(ValidationError::UnknownLanguage(language.to_string()).into())
        }
    }

    fn check_state(&self, content_type: &ContentType, state: &str) -> Result<(), NodeServiceError> {
        if content_type.workflow.is_valid(state) {
            Ok(())
        } else {
            Err(NodeServiceError::invalid_state(&content_type.name, state))
        }
    }

    /// Claim every unique field value of `content`; the caller maps clashes
    async fn claim_unique_fields(
        store: &ContentStore<'_>,
        content_type: &ContentType,
        content: &Content,
    ) -> Result<(), (String, String, DatabaseError)> {
        for field in &content_type.unique_fields {
            match unique_value(content.field(field)) {
                Some(value) => store
                    .claim_unique(&content.id, &content_type.name, field, &value)
                    .await
                    .map_err(|e| (field.clone(), value.clone(), e))?,
                None => store
                    .release_unique(&content.id, field)
                    .await
                    .map_err(|e| (field.clone(), String::new(), e))?,
            }
        }
        Ok(())
    }

    fn unique_error(
        content_type: &str,
        (field, value, err): (String, String, DatabaseError),
    ) -> NodeServiceError {
        if err.is_constraint_violation() {
            NodeServiceError::unique_violation(content_type, field, value)
        } else {
            err.into()
        }
    }

    /// Create a detached content record
    ///
    /// Language defaults to the configured default language, state to the
    /// type's workflow default.
    pub async fn create(&self, new: NewContent) -> Result<Content, NodeServiceError> {
        let content_type = self.content_type(&new.content_type)?;
        let language = new
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        self.check_language(&language)?;
        let state = new
            .state
            .clone()
            .unwrap_or_else(|| content_type.workflow.default_state().to_string());
        self.check_state(content_type, &state)?;

        let content = new.into_content(language, state);

        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = ContentStore::new(uow.conn());
            store.insert(&content).await?;
            Self::claim_unique_fields(&store, content_type, &content)
                .await
                .map_err(|e| Self::unique_error(&content_type.name, e))
        }
        .await;
        uow.finish(result).await?;

        tracing::debug!("Created {} content {}", content.content_type, content.id);
        self.emit_event(DomainEvent::ContentStateChanged {
            content_id: content.id.clone(),
            old_state: None,
            new_state: content.state.clone(),
        });
        Ok(content)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Content>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(ContentStore::new(&conn).get(id).await?)
    }

    async fn require(&self, id: &str) -> Result<Content, NodeServiceError> {
        self.get(id)
            .await?
            .ok_or_else(|| NodeServiceError::content_not_found(id))
    }

    /// Persist every field of `content`, optionally stamping `modified_at`
    pub async fn save(
        &self,
        content: &mut Content,
        touch_modified: bool,
    ) -> Result<(), NodeServiceError> {
        let content_type = self.content_type(&content.content_type)?;
        self.check_language(&content.language)?;
        self.check_state(content_type, &content.state)?;
        if touch_modified {
            content.modified_at = timestamp_now();
        }

        let uow = self.db.begin().await?;
        let result = self.save_in(uow.conn(), content_type, content).await;
        uow.finish(result).await
    }

    async fn save_in(
        &self,
        conn: &Connection,
        content_type: &ContentType,
        content: &Content,
    ) -> Result<(), NodeServiceError> {
        let store = ContentStore::new(conn);
        if store.get(&content.id).await?.is_none() {
            return Err(NodeServiceError::content_not_found(&content.id));
        }
        store.update(content).await.map_err(|e| {
            if e.is_constraint_violation() {
                NodeServiceError::node_in_use(
                    content.node_id.clone().unwrap_or_default(),
                    &content.language,
                )
            } else {
                e.into()
            }
        })?;
        Self::claim_unique_fields(&store, content_type, content)
            .await
            .map_err(|e| Self::unique_error(&content_type.name, e))
    }

    /// Attach `content` to `node` for `language` (the content's own language if None)
    ///
    /// An occupied slot is `NodeInUse` unless `replace` is set, in which case
    /// the previous record is detached and returned. `modified_at` is left alone.
    pub async fn attach(
        &self,
        node: &Node,
        content: &mut Content,
        language: Option<&str>,
        replace: bool,
    ) -> Result<Option<Content>, NodeServiceError> {
        let language = language.unwrap_or(&content.language).to_string();
        self.check_language(&language)?;

        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let tree = TreeStore::new(uow.conn());
            let store = ContentStore::new(uow.conn());

            if tree.get_node(&node.id).await?.is_none() {
                return Err(NodeServiceError::node_not_found(&node.id));
            }
            let mut stored = store
                .get(&content.id)
                .await?
                .ok_or_else(|| NodeServiceError::content_not_found(&content.id))?;

            let mut previous = None;
            if let Some(mut existing) = store.for_node_language(&node.id, &language).await? {
                if existing.id != content.id {
                    if !replace {
                        return Err(NodeServiceError::node_in_use(&node.id, &language));
                    }
                    existing.node_id = None;
                    store.update(&existing).await?;
                    previous = Some(existing);
                }
            }

            stored.node_id = Some(node.id.clone());
            stored.language = language.clone();
            store.update(&stored).await.map_err(|e| {
                if e.is_constraint_violation() {
                    NodeServiceError::node_in_use(&node.id, &language)
                } else {
                    e.into()
                }
            })?;
            Ok((stored, previous))
        }
        .await;
        let (stored, previous) = uow.finish(result).await?;
        *content = stored;

        if let Some(previous) = &previous {
            self.emit_event(DomainEvent::ContentDetached {
                content_id: previous.id.clone(),
                node_id: node.id.clone(),
            });
        }
        self.emit_event(DomainEvent::ContentAttached {
            content_id: content.id.clone(),
            node_id: node.id.clone(),
            language: language.clone(),
        });
        self.emit_event(DomainEvent::ContentStateChanged {
            content_id: content.id.clone(),
            old_state: Some(content.state.clone()),
            new_state: content.state.clone(),
        });
        tracing::debug!("Attached content {} to node {} ({})", content.id, node.id, language);
        Ok(previous)
    }

    /// Clear the node binding of `content`
    pub async fn detach(&self, content: &mut Content) -> Result<(), NodeServiceError> {
        let mut stored = self.require(&content.id).await?;
        let Some(node_id) = stored.node_id.take() else {
            content.node_id = None;
            return Ok(());
        };

        let uow = self.db.begin().await?;
        let result = ContentStore::new(uow.conn())
            .update(&stored)
            .await
            .map_err(NodeServiceError::from);
        uow.finish(result).await?;
        *content = stored;

        self.emit_event(DomainEvent::ContentDetached {
            content_id: content.id.clone(),
            node_id,
        });
        Ok(())
    }

    /// Content of `node` for `language` (node's preferred or default language
    /// if None), falling back to `any` when `fallback` is set
    pub async fn resolve(
        &self,
        node: &Node,
        language: Option<&str>,
        fallback: bool,
    ) -> Result<Option<Content>, NodeServiceError> {
        let language = language
            .or(node.preferred_language.as_deref())
            .unwrap_or(&self.config.default_language);

        let conn = self.db.connect_with_timeout().await?;
        let store = ContentStore::new(&conn);
        if let Some(content) = store.for_node_language(&node.id, language).await? {
            return Ok(Some(content));
        }
        if fallback && language != ANY_LANGUAGE {
            return Ok(store.for_node_language(&node.id, ANY_LANGUAGE).await?);
        }
        Ok(None)
    }

    /// All records attached to `node`, ordered by language
    pub async fn contents_of(&self, node: &Node) -> Result<Vec<Content>, NodeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(ContentStore::new(&conn).for_node(&node.id).await?)
    }

    /// Copy `content` onto `target` (same language, same related records);
    /// a copy without a target stays detached
    pub async fn copy(
        &self,
        content: &Content,
        target: Option<&Node>,
    ) -> Result<Content, NodeServiceError> {
        let uow = self.db.begin().await?;
        let target_id = target.map(|node| node.id.as_str());
        let result = self.copy_in(uow.conn(), content, target_id).await;
        let copy = uow.finish(result).await?;
        self.emit_copied(&copy);
        Ok(copy)
    }

    /// Events for a committed copy: the binding (if any), then its first state
    pub(crate) fn emit_copied(&self, copy: &Content) {
        if let Some(node_id) = &copy.node_id {
            self.emit_event(DomainEvent::ContentAttached {
                content_id: copy.id.clone(),
                node_id: node_id.clone(),
                language: copy.language.clone(),
            });
        }
        self.emit_event(DomainEvent::ContentStateChanged {
            content_id: copy.id.clone(),
            old_state: None,
            new_state: copy.state.clone(),
        });
    }

    pub(crate) async fn copy_in(
        &self,
        conn: &Connection,
        content: &Content,
        target_node_id: Option<&str>,
    ) -> Result<Content, NodeServiceError> {
        let content_type = self.content_type(&content.content_type)?;
        if !content_type.copyable {
            return Err(NodeServiceError::content_copy_not_supported(
                &content.content_type,
            ));
        }

        let now = timestamp_now();
        let copy = Content {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: target_node_id.map(str::to_string),
            created_at: now,
            modified_at: now,
            ..content.clone()
        };

        let store = ContentStore::new(conn);
        store.insert(&copy).await.map_err(|e| {
            if e.is_constraint_violation() {
                NodeServiceError::content_copy_failed(format!(
                    "target already has content for language '{}'",
                    copy.language
                ))
            } else {
                e.into()
            }
        })?;
        Self::claim_unique_fields(&store, content_type, &copy)
            .await
            .map_err(|(field, value, e)| {
                if e.is_constraint_violation() {
                    NodeServiceError::content_copy_failed(format!(
                        "value {} of unique field '{}' is already in use",
                        value, field
                    ))
                } else {
                    e.into()
                }
            })?;
        for related in &content.related {
            store.add_relation(&copy.id, related).await?;
        }
        Ok(copy)
    }

    /// Copy every record attached to `source_node_id` onto `target_node_id`
    pub(crate) async fn copy_all_in(
        &self,
        conn: &Connection,
        source_node_id: &str,
        target_node_id: &str,
    ) -> Result<Vec<Content>, NodeServiceError> {
        let originals = ContentStore::new(conn).for_node(source_node_id).await?;
        let mut copies = Vec::with_capacity(originals.len());
        for original in &originals {
            copies.push(self.copy_in(conn, original, Some(target_node_id)).await?);
        }
        Ok(copies)
    }

    /// Move `content` to `state`, validated against its type's workflow
    pub async fn set_state(
        &self,
        content: &mut Content,
        state: &str,
    ) -> Result<(), NodeServiceError> {
        let content_type = self.content_type(&content.content_type)?;
        self.check_state(content_type, state)?;

        let old_state = std::mem::replace(&mut content.state, state.to_string());
        if let Err(e) = self.save(content, true).await {
            content.state = old_state;
            return Err(e);
        }

        tracing::info!(
            "Content {} moved from '{}' to '{}'",
            content.id,
            old_state,
            content.state
        );
        self.emit_event(DomainEvent::ContentStateChanged {
            content_id: content.id.clone(),
            old_state: Some(old_state),
            new_state: content.state.clone(),
        });
        Ok(())
    }

    /// Record `other` as related to `content`
    pub async fn relate(
        &self,
        content: &mut Content,
        other: &Content,
    ) -> Result<(), NodeServiceError> {
        let uow = self.db.begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = ContentStore::new(uow.conn());
            for id in [&content.id, &other.id] {
                if store.get(id).await?.is_none() {
                    return Err(NodeServiceError::content_not_found(id.as_str()));
                }
            }
            store.add_relation(&content.id, &other.id).await?;
            Ok(store.relations(&content.id).await?)
        }
        .await;
        content.related = uow.finish(result).await?;
        Ok(())
    }

    pub(crate) fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) fn db(&self) -> &DatabaseService {
        &self.db
    }
}
