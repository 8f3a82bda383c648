//! Subtree paste: move (cut/paste) and copy (copy/paste)
//!
//! Both modes run in one transaction. Copy takes a savepoint per created
//! node, so a content-copy failure discards only the failing branch.

use crate::db::{DomainEvent, PathChange, TreeStore, UnitOfWork};
use crate::models::{
    is_within, join_path, normalize_slug, Content, Node, PathEntry, ROOT_PATH,
};
use crate::services::error::NodeServiceError;
use crate::services::node_service::{path_write_error, NodeService};
use libsql::Connection;
use std::collections::HashMap;

/// Slug given to a copy of the root node
const ROOT_COPY_SLUG: &str = "root";

/// What [`NodeService::paste`] does with the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteMode {
    Move,
    Copy,
}

/// Result of a paste
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteOutcome {
    /// The moved node or the root of the copy (None if the copy root failed)
    pub node: Option<Node>,

    /// Source paths (default language) that were pasted
    pub succeeded: Vec<String>,

    /// Source paths (default language) that failed, with the reason
    pub failed: Vec<(String, String)>,
}

/// Slug for a moved node: `slug`, then `slug_0`, `slug_1`, ...
fn moved_slug(slug: &str, attempt: usize, max_len: usize) -> String {
    match attempt {
        0 => slug.to_string(),
        n => {
            let suffix = format!("_{}", n - 1);
            format!("{}{}", shorten(slug, max_len, &suffix), suffix)
        }
    }
}

/// Slug for a copy: `slug`, then `copy_1_of_slug`, `copy_2_of_slug`, ...
fn copied_slug(slug: &str, attempt: usize, max_len: usize) -> String {
    match attempt {
        0 => slug.to_string(),
        n => {
            let prefix = format!("copy_{}_of_", n);
            format!("{}{}", prefix, shorten(slug, max_len, &prefix))
        }
    }
}

/// `slug` cut so that it fits next to `decoration` within `max_len`
fn shorten(slug: &str, max_len: usize, decoration: &str) -> String {
    let keep = max_len.saturating_sub(decoration.chars().count()).max(1);
    slug.chars().take(keep).collect()
}

/// First free path below `base` for `slug` in `language`
async fn free_path(
    store: &TreeStore<'_>,
    language: &str,
    base: &str,
    slug: &str,
    max_len: usize,
    candidate: fn(&str, usize, usize) -> String,
) -> Result<String, NodeServiceError> {
    let mut attempt = 0;
    loop {
        // Rejects decorations that cannot fit at all
        let next = normalize_slug(&candidate(slug, attempt, max_len), max_len)?;
        let path = join_path(base, &next);
        if !store.path_exists(language, &path).await? {
            return Ok(path);
        }
        attempt += 1;
    }
}

impl NodeService {
    /// Paste `source` below `target`
    ///
    /// Move keeps the node and rewrites its paths, suffixing the slug on a
    /// clash. Copy builds a new subtree whose root slug becomes
    /// `copy_<n>_of_<slug>` on a clash; content that cannot be copied is
    /// reported per node in [`PasteOutcome::failed`].
    pub async fn paste(
        &self,
        target: &Node,
        source: &Node,
        mode: PasteMode,
    ) -> Result<PasteOutcome, NodeServiceError> {
        match mode {
            PasteMode::Move => self.paste_move(target, source).await,
            PasteMode::Copy => self.paste_copy(target, source).await,
        }
    }

    /// Label for a source node in the outcome lists
    async fn label(&self, store: &TreeStore<'_>, node: &Node) -> Result<String, NodeServiceError> {
        Ok(store
            .path_of(&node.id, &self.config().default_language)
            .await?
            .unwrap_or_else(|| node.tree_path.clone()))
    }

    async fn paste_move(
        &self,
        target: &Node,
        source: &Node,
    ) -> Result<PasteOutcome, NodeServiceError> {
        let uow = self.db().begin().await?;
        let result: Result<_, NodeServiceError> = async {
            let store = TreeStore::new(uow.conn());
            let target = Self::fresh(&store, target).await?;
            let source = Self::fresh(&store, source).await?;
            let label = self.label(&store, &source).await?;

            if source.id == target.id || is_within(&target.tree_path, &source.tree_path) {
                let target_label = self.label(&store, &target).await?;
                return Err(NodeServiceError::cant_move_to_offspring(label, target_label));
            }

            if source.parent_tree_path() == target.tree_path {
                tracing::debug!("Node {} already under {}, nothing to move", source.id, target.id);
                return Ok((source, None, label));
            }

            let old_parent = store
                .get_by_tree_path(source.parent_tree_path())
                .await?
                .ok_or_else(|| NodeServiceError::node_not_found(source.parent_tree_path()))?;

            // Path rows first: the slug is read from the rows as they are now
            let mut changes = Vec::new();
            for entry in store.paths_of(&source.id).await? {
                let base = store
                    .path_of(&target.id, &entry.language)
                    .await?
                    .ok_or_else(|| NodeServiceError::path_not_found(&target.id, &entry.language))?;
                let new_path = free_path(
                    &store,
                    &entry.language,
                    &base,
                    entry.slug(),
                    self.config().max_slug_length,
                    moved_slug,
                )
                .await?;
                store
                    .rewrite_paths(&entry.language, &entry.path, &new_path)
                    .await
                    .map_err(|e| path_write_error(e, &entry.language, &new_path))?;
                changes.push(PathChange {
                    language: entry.language,
                    old_path: entry.path,
                    new_path,
                });
            }

            let position = self
                .allocator()
                .append(&store.siblings(&target.tree_path).await?)?;
            let new_tree_path = join_path(&target.tree_path, &source.id);
            store
                .rewrite_tree_paths(&source.tree_path, &new_tree_path)
                .await?;
            store.set_position(&source.id, position).await?;

            let moved = Self::fresh(&store, &source).await?;
            Ok((moved, Some((old_parent.id, target.id, changes)), label))
        }
        .await;
        let (moved, change, label) = uow.finish(result).await?;

        if let Some((old_parent_id, new_parent_id, changes)) = change {
            for change in &changes {
                tracing::info!(
                    "Moved {} -> {} ({})",
                    change.old_path,
                    change.new_path,
                    change.language
                );
            }
            self.emit_event(DomainEvent::NodeMoved {
                id: moved.id.clone(),
                old_parent_id,
                new_parent_id,
                changes,
            });
        }

        let moved = match &source.preferred_language {
            Some(language) => moved.with_language(language.clone()),
            None => moved,
        };
        Ok(PasteOutcome {
            node: Some(moved),
            succeeded: vec![label],
            failed: Vec::new(),
        })
    }

    async fn paste_copy(
        &self,
        target: &Node,
        source: &Node,
    ) -> Result<PasteOutcome, NodeServiceError> {
        let uow = self.db().begin().await?;
        let result = self.copy_tree(&uow, target, source).await;
        let (outcome, copied) = uow.finish(result).await?;

        for (path, reason) in &outcome.failed {
            tracing::warn!("Could not copy {}: {}", path, reason);
        }
        if let Some(copy) = &outcome.node {
            tracing::info!(
                "Copied node {} to {} ({} nodes, {} failed)",
                source.id,
                copy.id,
                outcome.succeeded.len(),
                outcome.failed.len()
            );
            for content in &copied {
                self.content().emit_copied(content);
            }
            self.emit_event(DomainEvent::NodeCopied {
                source_id: source.id.clone(),
                copy_id: copy.id.clone(),
            });
        }
        Ok(outcome)
    }

    /// Create the copy of `source` (and its snapshot of offspring) below
    /// `target`; returns the outcome and the content records that were copied
    async fn copy_tree(
        &self,
        uow: &UnitOfWork,
        target: &Node,
        source: &Node,
    ) -> Result<(PasteOutcome, Vec<Content>), NodeServiceError> {
        let conn = uow.conn();
        let store = TreeStore::new(conn);
        let target = Self::fresh(&store, target).await?;
        let source = Self::fresh(&store, source).await?;
        let offspring = store.offspring(&source.tree_path).await?;

        let mut outcome = PasteOutcome::default();
        let mut copied = Vec::new();

        // Copy root
        let mut paths = Vec::new();
        for entry in store.paths_of(&source.id).await? {
            let base = store
                .path_of(&target.id, &entry.language)
                .await?
                .ok_or_else(|| NodeServiceError::path_not_found(&target.id, &entry.language))?;
            let slug = match entry.slug() {
                ROOT_PATH => ROOT_COPY_SLUG,
                slug => slug,
            };
            let path = free_path(
                &store,
                &entry.language,
                &base,
                slug,
                self.config().max_slug_length,
                copied_slug,
            )
            .await?;
            paths.push((entry.language, path));
        }

        let label = self.label(&store, &source).await?;
        let position = self
            .allocator()
            .append(&store.siblings(&target.tree_path).await?)?;
        let savepoint = uow.savepoint().await?;
        let copy = match self
            .copy_node(conn, &target, position, &paths, &source)
            .await
        {
            Ok((copy, contents)) => {
                uow.release(&savepoint).await?;
                copied.extend(contents);
                copy
            }
            Err(e) if e.is_content_copy_error() => {
                uow.rollback_to(&savepoint).await?;
                outcome.failed.push((label, e.to_string()));
                return Ok((outcome, copied));
            }
            Err(e) => return Err(e),
        };
        outcome.succeeded.push(label);

        // Source tree-path -> (copy, copy's path per language)
        let mut copies: HashMap<String, (Node, HashMap<String, String>)> = HashMap::new();
        copies.insert(source.tree_path.clone(), (copy.clone(), paths.into_iter().collect()));

        for node in &offspring {
            let Some((parent_copy, parent_paths)) = copies.get(node.parent_tree_path()) else {
                continue;
            };

            let mut paths = Vec::new();
            for entry in store.paths_of(&node.id).await? {
                if let Some(base) = parent_paths.get(&entry.language) {
                    paths.push((entry.language.clone(), join_path(base, entry.slug())));
                }
            }

            let label = self.label(&store, node).await?;
            let savepoint = uow.savepoint().await?;
            match self
                .copy_node(conn, parent_copy, node.position, &paths, node)
                .await
            {
                Ok((child, contents)) => {
                    uow.release(&savepoint).await?;
                    copied.extend(contents);
                    copies.insert(node.tree_path.clone(), (child, paths.into_iter().collect()));
                    outcome.succeeded.push(label);
                }
                Err(e) if e.is_content_copy_error() => {
                    uow.rollback_to(&savepoint).await?;
                    outcome.failed.push((label, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        outcome.node = Some(match &source.preferred_language {
            Some(language) => copy.with_language(language.clone()),
            None => copy,
        });
        Ok((outcome, copied))
    }

    /// One node of a copy: node row, path rows, content
    async fn copy_node(
        &self,
        conn: &Connection,
        parent: &Node,
        position: i64,
        paths: &[(String, String)],
        source: &Node,
    ) -> Result<(Node, Vec<Content>), NodeServiceError> {
        let store = TreeStore::new(conn);
        let node = Node::new_child(parent, position);
        store.insert_node(&node).await?;
        for (language, path) in paths {
            store
                .insert_path(&PathEntry::new(&node.id, language, path))
                .await
                .map_err(|e| path_write_error(e, language, path))?;
        }

        let contents = self
            .content()
            .copy_all_in(conn, &source.id, &node.id)
            .await?;
        Ok((node, contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::{ContentType, ContentTypeRegistry};
    use crate::config::TreeConfig;
    use crate::db::DatabaseService;
    use crate::models::{NewContent, Placement, Slugs};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_service(languages: &[&str]) -> (NodeService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let mut registry = ContentTypeRegistry::with_defaults();
        registry.register(ContentType::new("fixed").copyable(false));
        registry.register(ContentType::new("coded").unique_field("code"));
        let service = NodeService::new(
            db,
            Arc::new(TreeConfig::with_languages(languages.iter().copied())),
            Arc::new(registry),
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

    #[test]
    fn test_slug_candidates() {
        assert_eq!(moved_slug("a", 0, 40), "a");
        assert_eq!(moved_slug("a", 1, 40), "a_0");
        assert_eq!(moved_slug("a", 3, 40), "a_2");
        assert_eq!(copied_slug("a", 0, 40), "a");
        assert_eq!(copied_slug("a", 1, 40), "copy_1_of_a");
        assert_eq!(copied_slug("a", 2, 40), "copy_2_of_a");
    }

    #[test]
    fn test_slug_candidates_fit_max_length() {
        let long = "x".repeat(40);
        let moved = moved_slug(&long, 1, 40);
        assert_eq!(moved.len(), 40);
        assert!(moved.ends_with("_0"));

        let copied = copied_slug(&long, 12, 40);
        assert_eq!(copied.len(), 40);
        assert!(copied.starts_with("copy_12_of_x"));
    }

    #[tokio::test]
    async fn test_copy_of_long_slug_stays_valid() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let long = "x".repeat(service.config().max_slug_length);
        let node = service.add(&root, long.as_str(), Placement::Append).await.unwrap();

        let copy = service
            .paste(&root, &node, PasteMode::Copy)
            .await
            .unwrap()
            .node
            .unwrap();
        let slug = service.slug_of(&copy, None).await.unwrap();
        assert_eq!(slug.len(), service.config().max_slug_length);
        assert!(slug.starts_with("copy_1_of_"));

        // the generated slug is accepted wherever a user slug is
        let renamed = service.rename(&copy, &slug, None).await.unwrap();
        assert_eq!(service.slug_of(&renamed, None).await.unwrap(), slug);
    }

    #[tokio::test]
    async fn test_move_rewrites_paths() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let b = service.add(&root, "b", Placement::Append).await.unwrap();
        let sub = service.add(&a, "sub", Placement::Append).await.unwrap();

        let outcome = service.paste(&b, &a, PasteMode::Move).await.unwrap();

        let moved = outcome.node.unwrap();
        assert_eq!(moved.id, a.id);
        assert_eq!(outcome.succeeded, vec!["/a"]);
        assert!(outcome.failed.is_empty());
        assert_eq!(service.path_of(&a, None).await.unwrap(), "/b/a");
        assert_eq!(service.path_of(&sub, None).await.unwrap(), "/b/a/sub");
        assert!(moved.is_child_of(&b));
        assert_eq!(service.parent(&sub).await.unwrap().id, a.id);
        assert_eq!(service.children(&root, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_move_suffixes_on_collision() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let b = service.add(&root, "b", Placement::Append).await.unwrap();
        service.add(&b, "x", Placement::Append).await.unwrap();
        service.add(&b, "x_0", Placement::Append).await.unwrap();
        let x = service.add(&a, "x", Placement::Append).await.unwrap();

        service.paste(&b, &x, PasteMode::Move).await.unwrap();
        assert_eq!(service.path_of(&x, None).await.unwrap(), "/b/x_1");
    }

    #[tokio::test]
    async fn test_move_into_offspring_fails() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let sub = service.add(&a, "sub", Placement::Append).await.unwrap();

        for (target, source) in [(&a, &a), (&sub, &a), (&a, &root)] {
            assert!(matches!(
                service.paste(target, source, PasteMode::Move).await,
                Err(NodeServiceError::CantMoveToOffspring { .. })
            ));
        }
        assert_eq!(service.path_of(&sub, None).await.unwrap(), "/a/sub");
    }

    #[tokio::test]
    async fn test_move_to_same_parent_is_noop() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let mut rx = service.subscribe_to_events();

        let outcome = service.paste(&root, &a, PasteMode::Move).await.unwrap();
        assert_eq!(outcome.node.unwrap().position, a.position);
        assert_eq!(outcome.succeeded, vec!["/a"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_copy_subtree() {
        let (service, _temp) = create_test_service(&["en", "nl"]).await;
        let root = service.root(None).await.unwrap();
        let a = service
            .add(&root, Slugs::per_language([("en", "a"), ("nl", "aa")]), Placement::Append)
            .await
            .unwrap();
        let sub = service.add(&a, "sub", Placement::At(7)).await.unwrap();
        attach(&service, &sub, NewContent::new("page", "Sub")).await;

        let outcome = service.paste(&root, &a, PasteMode::Copy).await.unwrap();

        let copy = outcome.node.unwrap();
        assert_ne!(copy.id, a.id);
        assert_eq!(outcome.succeeded, vec!["/a", "/a/sub"]);
        assert_eq!(service.path_of(&copy, Some("en")).await.unwrap(), "/copy_1_of_a");
        assert_eq!(
            service.path_of(&copy, Some("nl")).await.unwrap(),
            "/copy_1_of_aa"
        );

        let sub_copy = service.resolve("/copy_1_of_a/sub", None).await.unwrap();
        assert_eq!(sub_copy.position, 7);
        assert_eq!(
            service.resolve("/copy_1_of_aa/sub", Some("nl")).await.unwrap().id,
            sub_copy.id
        );
        let content = service.content().resolve(&sub_copy, None, false).await.unwrap();
        assert_eq!(content.unwrap().title, "Sub");

        // the source is untouched
        assert_eq!(service.path_of(&sub, None).await.unwrap(), "/a/sub");
        assert_eq!(service.content().contents_of(&sub).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_copy_root_and_repeat() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let target = service.add(&root, "target", Placement::Append).await.unwrap();

        let first = service.paste(&target, &root, PasteMode::Copy).await.unwrap();
        assert_eq!(
            service.path_of(&first.node.unwrap(), None).await.unwrap(),
            "/target/root"
        );

        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let first = service.paste(&root, &a, PasteMode::Copy).await.unwrap();
        let second = service.paste(&root, &a, PasteMode::Copy).await.unwrap();
        assert_eq!(service.path_of(&first.node.unwrap(), None).await.unwrap(), "/copy_1_of_a");
        assert_eq!(service.path_of(&second.node.unwrap(), None).await.unwrap(), "/copy_2_of_a");
    }

    #[tokio::test]
    async fn test_copy_root_failure_discards_copy() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        service.add(&a, "sub", Placement::Append).await.unwrap();
        attach(&service, &a, NewContent::new("fixed", "Fixed")).await;

        let outcome = service.paste(&root, &a, PasteMode::Copy).await.unwrap();

        assert!(outcome.node.is_none());
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "/a");
        assert!(service.find("/copy_1_of_a", None).await.unwrap().is_none());
        assert_eq!(service.children(&root, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_copy_branch_failure_skips_branch() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        let bad = service.add(&a, "bad", Placement::Append).await.unwrap();
        service.add(&bad, "below", Placement::Append).await.unwrap();
        let good = service.add(&a, "good", Placement::Append).await.unwrap();
        attach(
            &service,
            &bad,
            NewContent::new("coded", "Coded").properties(json!({"code": 1})),
        )
        .await;
        attach(&service, &good, NewContent::new("page", "Good")).await;

        let outcome = service.paste(&root, &a, PasteMode::Copy).await.unwrap();

        assert!(outcome.node.is_some());
        assert_eq!(outcome.succeeded, vec!["/a", "/a/good"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "/a/bad");
        assert!(service.find("/copy_1_of_a/bad", None).await.unwrap().is_none());
        assert!(service.find("/copy_1_of_a/bad/below", None).await.unwrap().is_none());
        assert!(service.find("/copy_1_of_a/good", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_copy_events() {
        let (service, _temp) = create_test_service(&["en"]).await;
        let root = service.root(None).await.unwrap();
        let a = service.add(&root, "a", Placement::Append).await.unwrap();
        attach(&service, &a, NewContent::new("page", "A")).await;
        let mut rx = service.subscribe_to_events();

        let outcome = service.paste(&root, &a, PasteMode::Copy).await.unwrap();

        let copy = outcome.node.clone().unwrap();
        let copied = service.content().contents_of(&copy).await.unwrap();
        assert_eq!(copied.len(), 1);

        match rx.try_recv().unwrap() {
            DomainEvent::ContentAttached {
                content_id,
                node_id,
                ..
            } => {
                assert_eq!(content_id, copied[0].id);
                assert_eq!(node_id, copy.id);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            DomainEvent::ContentStateChanged {
                content_id,
                old_state,
                new_state,
            } => {
                assert_eq!(content_id, copied[0].id);
                assert_eq!(old_state, None);
                assert_eq!(new_state, copied[0].state);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            DomainEvent::NodeCopied { source_id, copy_id } => {
                assert_eq!(source_id, a.id);
                assert_eq!(copy_id, copy.id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
