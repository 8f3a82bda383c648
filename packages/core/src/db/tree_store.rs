//! Node and path table access
//!
//! [`TreeStore`] wraps a borrowed connection, normally the one of an open
//! [`UnitOfWork`](crate::db::UnitOfWork), so that every statement of an
//! operation lands in the same transaction.
//!
//! Subtree matching is anchored on the separator:
//! `substr(col, 1, length(prefix) + 1) = prefix || '/'`. A plain
//! `LIKE prefix || '%'` would also match `/aaaa` for `/aaa` and treats `_`
//! in slugs as a wildcard.

use crate::db::database::{format_timestamp, parse_timestamp};
use crate::db::error::DatabaseError;
use crate::models::{Node, PathEntry};
use chrono::{DateTime, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Row};

const NODE_COLUMNS: &str = "n.id, n.tree_path, n.position, n.created_at";

// ?1 is the subtree root's tree-path
const STRICTLY_BELOW: &str = "substr(n.tree_path, 1, length(?1) + 1) = ?1 || '/'";

// ?1 is the parent's tree-path; child ids never contain '/'
const DIRECT_CHILD: &str = "substr(n.tree_path, 1, length(?1) + 1) = ?1 || '/'
    AND instr(substr(n.tree_path, length(?1) + 2), '/') = 0";

/// A sibling as seen by the position allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub id: String,
    pub position: i64,
}

impl From<&Node> for Sibling {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            position: node.position,
        }
    }
}

pub struct TreeStore<'a> {
    conn: &'a Connection,
}

impl<'a> TreeStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let created_at: String = row.get(3)?;
        Ok(Node {
            id: row.get(0)?,
            tree_path: row.get(1)?,
            position: row.get(2)?,
            created_at: parse_timestamp(&created_at)?,
            preferred_language: None,
        })
    }

    async fn fetch_nodes(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Vec<Node>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::statement("node query", e))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn fetch_node(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Option<Node>, DatabaseError> {
        Ok(self.fetch_nodes(sql, params).await?.into_iter().next())
    }

    //
    // NODES
    //

    pub async fn insert_node(&self, node: &Node) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO nodes (id, tree_path, position, created_at) VALUES (?, ?, ?, ?)",
                (
                    node.id.as_str(),
                    node.tree_path.as_str(),
                    node.position,
                    format_timestamp(&node.created_at),
                ),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to insert node", e))?;
        Ok(())
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(
            &format!("SELECT {} FROM nodes n WHERE n.id = ?", NODE_COLUMNS),
            [id],
        )
        .await
    }

    pub async fn get_by_tree_path(&self, tree_path: &str) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(
            &format!("SELECT {} FROM nodes n WHERE n.tree_path = ?", NODE_COLUMNS),
            [tree_path],
        )
        .await
    }

    /// Direct children ordered by position, ties by insertion order
    pub async fn children(&self, tree_path: &str) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(
            &format!(
                "SELECT {} FROM nodes n WHERE {} ORDER BY n.position, n.rowid",
                NODE_COLUMNS, DIRECT_CHILD
            ),
            [tree_path],
        )
        .await
    }

    /// All descendants, parents before children
    pub async fn offspring(&self, tree_path: &str) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(
            &format!(
                "SELECT {} FROM nodes n WHERE {} ORDER BY n.tree_path",
                NODE_COLUMNS, STRICTLY_BELOW
            ),
            [tree_path],
        )
        .await
    }

    pub async fn siblings(&self, parent_tree_path: &str) -> Result<Vec<Sibling>, DatabaseError> {
        Ok(self
            .children(parent_tree_path)
            .await?
            .iter()
            .map(Sibling::from)
            .collect())
    }

    pub async fn set_position(&self, id: &str, position: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE nodes SET position = ? WHERE id = ?",
                (position, id),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to update position", e))?;
        Ok(())
    }

    pub async fn set_positions(&self, positions: &[(String, i64)]) -> Result<(), DatabaseError> {
        for (id, position) in positions {
            self.set_position(id, *position).await?;
        }
        Ok(())
    }

    /// Replace the tree-path prefix of a node and its whole subtree
    pub async fn rewrite_tree_paths(
        &self,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, DatabaseError> {
        self.conn
            .execute(
                "UPDATE nodes SET tree_path = ?2 || substr(tree_path, length(?1) + 1)
                 WHERE tree_path = ?1 OR substr(tree_path, 1, length(?1) + 1) = ?1 || '/'",
                (old_prefix, new_prefix),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to rewrite tree paths", e))
    }

    /// Delete a node and its subtree: path rows, content binding, nodes
    ///
    /// Returns the ids of the removed nodes.
    pub async fn delete_subtree(&self, tree_path: &str) -> Result<Vec<String>, DatabaseError> {
        let mut removed: Vec<String> = self
            .get_by_tree_path(tree_path)
            .await?
            .map(|n| n.id)
            .into_iter()
            .collect();
        removed.extend(self.offspring(tree_path).await?.into_iter().map(|n| n.id));

        for id in &removed {
            self.conn
                .execute("DELETE FROM paths WHERE node_id = ?", [id.as_str()])
                .await
                .map_err(|e| DatabaseError::statement("Failed to delete paths", e))?;
            self.conn
                .execute(
                    "UPDATE content SET node_id = NULL WHERE node_id = ?",
                    [id.as_str()],
                )
                .await
                .map_err(|e| DatabaseError::statement("Failed to detach content", e))?;
            self.conn
                .execute("DELETE FROM nodes WHERE id = ?", [id.as_str()])
                .await
                .map_err(|e| DatabaseError::statement("Failed to delete node", e))?;
        }
        Ok(removed)
    }

    pub async fn count_nodes(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM nodes", ())
            .await
            .map_err(|e| DatabaseError::statement("count nodes", e))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    //
    // PATHS
    //

    /// Insert a path row; an occupied `(language, path)` is a constraint violation
    pub async fn insert_path(&self, entry: &PathEntry) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO paths (node_id, language, path) VALUES (?, ?, ?)",
                (
                    entry.node_id.as_str(),
                    entry.language.as_str(),
                    entry.path.as_str(),
                ),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to insert path", e))?;
        Ok(())
    }

    /// Node owning `path` in `language`
    pub async fn node_at(&self, language: &str, path: &str) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(
            &format!(
                "SELECT {} FROM nodes n JOIN paths p ON p.node_id = n.id
                 WHERE p.language = ? AND p.path = ?",
                NODE_COLUMNS
            ),
            (language, path),
        )
        .await
    }

    pub async fn path_exists(&self, language: &str, path: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM paths WHERE language = ? AND path = ?",
                (language, path),
            )
            .await
            .map_err(|e| DatabaseError::statement("path lookup", e))?;
        Ok(rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
            .is_some())
    }

    pub async fn path_of(
        &self,
        node_id: &str,
        language: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT path FROM paths WHERE node_id = ? AND language = ?",
                (node_id, language),
            )
            .await
            .map_err(|e| DatabaseError::statement("path lookup", e))?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// All path rows of a node, ordered by language
    pub async fn paths_of(&self, node_id: &str) -> Result<Vec<PathEntry>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT node_id, language, path FROM paths WHERE node_id = ? ORDER BY language",
                [node_id],
            )
            .await
            .map_err(|e| DatabaseError::statement("paths lookup", e))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            entries.push(PathEntry {
                node_id: row.get(0)?,
                language: row.get(1)?,
                path: row.get(2)?,
            });
        }
        Ok(entries)
    }

    /// Replace `old_prefix` by `new_prefix` for one language, on the row
    /// equal to the prefix and on every row below it
    pub async fn rewrite_paths(
        &self,
        language: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64, DatabaseError> {
        self.conn
            .execute(
                "UPDATE paths SET path = ?3 || substr(path, length(?2) + 1)
                 WHERE language = ?1
                   AND (path = ?2 OR substr(path, 1, length(?2) + 1) = ?2 || '/')",
                (language, old_prefix, new_prefix),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to rewrite paths", e))
    }

    //
    // NODE QUERIES (joined with content)
    //

    /// Nodes with at least one attached content record
    pub async fn attached_nodes(&self) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(
            &format!(
                "SELECT {} FROM nodes n
                 WHERE EXISTS (SELECT 1 FROM content c WHERE c.node_id = n.id)
                 ORDER BY n.tree_path",
                NODE_COLUMNS
            ),
            (),
        )
        .await
    }

    /// Nodes with published content inside its publication window at `now`
    pub async fn public_nodes(&self, now: &DateTime<Utc>) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(
            &format!(
                "SELECT {} FROM nodes n
                 WHERE EXISTS (
                    SELECT 1 FROM content c
                    WHERE c.node_id = n.id AND c.state = 'published'
                      AND (c.publication IS NULL OR c.publication <= ?1)
                      AND (c.expire IS NULL OR c.expire > ?1))
                 ORDER BY n.tree_path",
                NODE_COLUMNS
            ),
            [format_timestamp(now)],
        )
        .await
    }

    /// Children whose content in `language` (or `any`) is published and
    /// flagged for navigation
    pub async fn visible_children(
        &self,
        tree_path: &str,
        language: &str,
        wildcard: &str,
    ) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(
            &format!(
                "SELECT {} FROM nodes n
                 WHERE {}
                   AND EXISTS (
                    SELECT 1 FROM content c
                    WHERE c.node_id = n.id AND c.state = 'published' AND c.navigation = 1
                      AND c.language IN (?2, ?3))
                 ORDER BY n.position, n.rowid",
                NODE_COLUMNS, DIRECT_CHILD
            ),
            (tree_path, language, wildcard),
        )
        .await
    }
}
