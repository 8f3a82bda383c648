//! Tree invariants that must hold after any successful (or failed) mutation

#[cfg(test)]
mod tree_invariant_tests {
    use anyhow::Result;
    use slugtree_core::behaviors::ContentTypeRegistry;
    use slugtree_core::config::TreeConfig;
    use slugtree_core::db::DatabaseService;
    use slugtree_core::models::{NewContent, Node, PathEntry, Placement, Slugs};
    use slugtree_core::services::{NodeService, PasteMode};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_service(languages: &[&str]) -> Result<(NodeService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = Arc::new(DatabaseService::new(temp_dir.path().join("site.db")).await?);
        let service = NodeService::new(
            db,
            Arc::new(TreeConfig::with_languages(languages.iter().copied())),
            Arc::new(ContentTypeRegistry::with_defaults()),
        )?;
        Ok((service, temp_dir))
    }

    /// Every path row in the tree, sorted
    async fn path_table(service: &NodeService) -> Result<Vec<PathEntry>> {
        let root = service.root(None).await?;
        let mut rows = service.paths_of(&root).await?;
        for node in service.offspring(&root).await? {
            rows.extend(service.paths_of(&node).await?);
        }
        rows.sort_by(|a, b| (&a.language, &a.path).cmp(&(&b.language, &b.path)));
        Ok(rows)
    }

    /// Build /a/{x,y}, /b/{x}, /ab
    async fn build_site(service: &NodeService) -> Result<(Node, Node, Node)> {
        let root = service.root(None).await?;
        let a = service.add(&root, "a", Placement::Append).await?;
        service.add(&a, "x", Placement::Append).await?;
        service.add(&a, "y", Placement::Append).await?;
        let b = service.add(&root, "b", Placement::Append).await?;
        service.add(&b, "x", Placement::Append).await?;
        service.add(&root, "ab", Placement::Append).await?;
        Ok((root, a, b))
    }

    #[tokio::test]
    async fn test_add_resolve_round_trip() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en", "nl"]).await?;
        let root = service.root(None).await?;
        let mut parent = root.clone();

        for slug in ["one", "two", "three-3", "four_4"] {
            let node = service.add(&parent, slug, Placement::Append).await?;
            for language in ["en", "nl"] {
                let path = format!("{}/{}", service.path_of(&parent, Some(language)).await?, slug);
                assert_eq!(service.resolve(&path, Some(language)).await?.id, node.id);
            }
            parent = node;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_path_uniqueness_after_mutations() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en", "nl"]).await?;
        let (root, a, b) = build_site(&service).await?;

        service.paste(&b, &a, PasteMode::Copy).await?;
        service.paste(&b, &a, PasteMode::Copy).await?;
        let ab = service.resolve("/ab", None).await?;
        service.paste(&b, &ab, PasteMode::Move).await?;
        let _ = service.rename(&a, "b", None).await;
        service.rename(&a, "c", Some("nl")).await?;
        let bx = service.resolve("/b/x", None).await?;
        service.paste(&root, &bx, PasteMode::Move).await?;

        let rows = path_table(&service).await?;
        let unique: HashSet<(String, String)> = rows
            .iter()
            .map(|r| (r.language.clone(), r.path.clone()))
            .collect();
        assert_eq!(unique.len(), rows.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_children_strictly_ordered_after_inserts() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en"]).await?;
        let root = service.root(None).await?;

        let first = service.add(&root, "first", Placement::Append).await?;
        let mut anchor = first.clone();
        // Repeated inserts right after the same node exhaust the gap
        for i in 0..10 {
            let node = service
                .add(&root, format!("n{}", i), Placement::after(&first))
                .await?;
            let children = service.children(&root, None).await?;
            let index = children.iter().position(|c| c.id == node.id).unwrap();
            assert_eq!(children[index - 1].id, first.id);
            anchor = node;
        }
        let before = service
            .add(&root, "before", Placement::before(&anchor))
            .await?;

        let children = service.children(&root, None).await?;
        for pair in children.windows(2) {
            assert!(pair[0].position < pair[1].position);
        }
        let index = children.iter().position(|c| c.id == before.id).unwrap();
        assert_eq!(children[index + 1].id, anchor.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_path_table_unchanged() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en", "nl"]).await?;
        let (_root, a, _b) = build_site(&service).await?;

        let before = path_table(&service).await?;
        assert!(service.rename(&a, "b", None).await.is_err());
        assert!(service.rename(&a, "ab", Some("nl")).await.is_err());
        assert_eq!(path_table(&service).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_never_creates_cycle() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en"]).await?;
        let (root, a, b) = build_site(&service).await?;
        let ax = service.resolve("/a/x", None).await?;

        assert!(service.paste(&ax, &a, PasteMode::Move).await.is_err());
        assert!(service.paste(&a, &root, PasteMode::Move).await.is_err());
        service.paste(&b, &a, PasteMode::Move).await?;
        let bax = service.resolve("/b/a/x", None).await?;
        assert!(service.paste(&bax, &b, PasteMode::Move).await.is_err());

        for node in service.offspring(&root).await? {
            let mut ancestor = service.parent(&node).await?;
            while !ancestor.is_root() {
                assert_ne!(ancestor.id, node.id);
                ancestor = service.parent(&ancestor).await?;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_never_mutates_source() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en", "nl"]).await?;
        let (root, a, _b) = build_site(&service).await?;
        let x = service.resolve("/a/x", None).await?;
        let mut content = service.content().create(NewContent::new("page", "X")).await?;
        service.content().attach(&x, &mut content, None, false).await?;

        let source_nodes = service.offspring(&a).await?;
        let source_paths = path_table(&service).await?;
        let source_content = service.content().contents_of(&x).await?;

        service.paste(&root, &a, PasteMode::Copy).await?;
        // Copying into its own subtree works from a snapshot: a, x and y again
        service.paste(&x, &a, PasteMode::Copy).await?;

        assert_eq!(
            service.offspring(&a).await?.len(),
            source_nodes.len() * 2 + 1
        );
        let after = path_table(&service).await?;
        for row in &source_paths {
            assert!(after.contains(row), "{:?} was changed", row);
        }
        assert_eq!(service.content().contents_of(&x).await?, source_content);
        Ok(())
    }

    #[tokio::test]
    async fn test_one_content_per_node_language() -> Result<()> {
        let (service, _temp_dir) = create_test_service(&["en", "nl"]).await?;
        let root = service.root(None).await?;
        let node = service
            .add(&root, Slugs::per_language([("en", "home"), ("nl", "thuis")]), Placement::Append)
            .await?;

        let mut en = service.content().create(NewContent::new("page", "Home")).await?;
        let mut nl = service.content().create(NewContent::new("page", "Thuis").language("nl")).await?;
        let mut second = service.content().create(NewContent::new("page", "Other")).await?;
        service.content().attach(&node, &mut en, None, false).await?;
        service.content().attach(&node, &mut nl, None, false).await?;

        assert!(service
            .content()
            .attach(&node, &mut second, None, false)
            .await
            .unwrap_err()
            .is_node_in_use());
        let replaced = service.content().attach(&node, &mut second, None, true).await?;
        assert_eq!(replaced.map(|c| c.id), Some(en.id.clone()));

        let contents = service.content().contents_of(&node).await?;
        let languages: HashSet<String> = contents.iter().map(|c| c.language.clone()).collect();
        assert_eq!(contents.len(), 2);
        assert_eq!(languages.len(), 2);
        Ok(())
    }
}
