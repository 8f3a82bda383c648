//! Command implementations

use anyhow::{anyhow, Context, Result};
use slugtree_core::models::{Node, Placement, Slugs};
use slugtree_core::services::{Exporter, Importer, NodeService, PasteMode, SiteDocument};
use std::path::Path;

use crate::cli::AddArgs;

/// `slug` or `en=about,nl=over`
pub fn parse_slugs(raw: &str) -> Result<Slugs> {
    if !raw.contains('=') {
        return Ok(Slugs::from(raw));
    }
    let mut pairs = Vec::new();
    for part in raw.split(',') {
        let (language, slug) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("expected language=slug, got '{}'", part))?;
        pairs.push((language.trim().to_string(), slug.trim().to_string()));
    }
    Ok(Slugs::per_language(pairs))
}

pub async fn init(service: &NodeService) -> Result<()> {
    let root = service.root(None).await?;
    println!("Initialized tree (root {})", root.id);
    Ok(())
}

async fn sibling(
    service: &NodeService,
    parent: &Node,
    slug: &str,
    language: Option<&str>,
) -> Result<Node> {
    service
        .child(parent, slug, language)
        .await?
        .ok_or_else(|| anyhow!("no sibling '{}' under that parent", slug))
}

pub async fn add(service: &NodeService, language: Option<&str>, args: &AddArgs) -> Result<()> {
    let parent = service.resolve(&args.parent, language).await?;
    let placement = if let Some(slug) = &args.after {
        Placement::after(&sibling(service, &parent, slug, language).await?)
    } else if let Some(slug) = &args.before {
        Placement::before(&sibling(service, &parent, slug, language).await?)
    } else if let Some(position) = args.position {
        Placement::At(position)
    } else {
        Placement::Append
    };

    let node = service
        .add(&parent, parse_slugs(&args.slug)?, placement)
        .await?;
    println!(
        "Added {} (position {})",
        service.path_of(&node, language).await?,
        node.position
    );
    Ok(())
}

pub async fn tree(service: &NodeService, language: Option<&str>, path: &str) -> Result<()> {
    let top = service.resolve(path, language).await?;
    let base_depth = top.depth();

    let mut pending: Vec<Node> = vec![top];
    while let Some(node) = pending.pop() {
        let indent = "  ".repeat(node.depth() - base_depth);
        let slug = service.slug_of(&node, None).await?;
        let label = if node.is_root() { "/".to_string() } else { slug };
        let content = service.content().resolve(&node, None, true).await?;
        match content {
            Some(content) => println!(
                "{}{} [{}] {} ({})",
                indent, label, node.position, content.title, content.state
            ),
            None => println!("{}{} [{}]", indent, label, node.position),
        }

        let children = service.children(&node, None).await?;
        pending.extend(children.into_iter().rev());
    }
    Ok(())
}

pub async fn rename(
    service: &NodeService,
    language: Option<&str>,
    path: &str,
    slug: &str,
    all_languages: bool,
) -> Result<()> {
    let node = service.resolve(path, language).await?;
    let target_language = if all_languages {
        None
    } else {
        Some(
            language
                .unwrap_or(&service.config().default_language)
                .to_string(),
        )
    };
    let renamed = service
        .rename(&node, slug, target_language.as_deref())
        .await?;
    println!("Renamed to {}", service.path_of(&renamed, language).await?);
    Ok(())
}

pub async fn paste(
    service: &NodeService,
    language: Option<&str>,
    source: &str,
    target: &str,
    copy: bool,
) -> Result<()> {
    let source = service.resolve(source, language).await?;
    let target = service.resolve(target, language).await?;
    let mode = if copy { PasteMode::Copy } else { PasteMode::Move };

    let outcome = service.paste(&target, &source, mode).await?;
    for path in &outcome.succeeded {
        println!("ok      {}", path);
    }
    for (path, reason) in &outcome.failed {
        println!("failed  {}: {}", path, reason);
    }
    if let Some(node) = &outcome.node {
        println!("Pasted at {}", service.path_of(node, language).await?);
    }
    Ok(())
}

pub async fn export(
    service: &NodeService,
    language: Option<&str>,
    path: &str,
    file: &Path,
) -> Result<()> {
    let node = service.resolve(path, language).await?;
    let document = Exporter::new(service).export(&node).await?;
    tokio::fs::write(file, document.to_json()?)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))?;
    println!("Exported {} to {}", document.base, file.display());
    Ok(())
}

pub async fn import(
    service: &NodeService,
    language: Option<&str>,
    path: &str,
    file: &Path,
) -> Result<()> {
    let node = service.resolve(path, language).await?;
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document = SiteDocument::from_json(&raw)?;
    let summary = Importer::new(service).import(&node, &document).await?;
    println!(
        "Imported {} nodes and {} content records",
        summary.nodes, summary.contents
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_single_slug() {
        assert_eq!(parse_slugs("about").unwrap(), Slugs::from("about"));
    }

    #[test]
    fn test_parse_language_map() {
        let expected: BTreeMap<String, String> = [("en", "about"), ("nl", "over")]
            .into_iter()
            .map(|(l, s)| (l.to_string(), s.to_string()))
            .collect();
        assert_eq!(parse_slugs("en=about, nl=over").unwrap(), Slugs::from(expected));
        assert!(parse_slugs("en=about,nl").is_err());
    }
}
