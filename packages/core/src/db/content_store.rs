//! Content table access
//!
//! Like [`TreeStore`](crate::db::TreeStore), borrows the connection of the
//! surrounding operation.

use crate::db::database::{format_timestamp, parse_timestamp};
use crate::db::error::DatabaseError;
use crate::models::Content;
use libsql::params::{IntoParams, Params};
use libsql::{Connection, Row, Value};

const CONTENT_COLUMNS: &str = "id, node_id, language, content_type, title, state, publication, \
     expire, navigation, owner, template, properties, created_at, modified_at";

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

pub struct ContentStore<'a> {
    conn: &'a Connection,
}

impl<'a> ContentStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_content(row: &Row) -> Result<Content, DatabaseError> {
        let publication: Option<String> = row.get(6)?;
        let expire: Option<String> = row.get(7)?;
        let navigation: i64 = row.get(8)?;
        let properties: String = row.get(11)?;
        let created_at: String = row.get(12)?;
        let modified_at: String = row.get(13)?;

        Ok(Content {
            id: row.get(0)?,
            node_id: row.get(1)?,
            language: row.get(2)?,
            content_type: row.get(3)?,
            title: row.get(4)?,
            state: row.get(5)?,
            publication: publication.as_deref().map(parse_timestamp).transpose()?,
            expire: expire.as_deref().map(parse_timestamp).transpose()?,
            navigation: navigation != 0,
            owner: row.get(9)?,
            template: row.get(10)?,
            properties: serde_json::from_str(&properties).map_err(|e| {
                DatabaseError::corrupt_row(format!("Invalid properties JSON: {}", e))
            })?,
            created_at: parse_timestamp(&created_at)?,
            modified_at: parse_timestamp(&modified_at)?,
            related: Vec::new(),
        })
    }

    async fn fetch(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<Vec<Content>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::statement("content query", e))?;

        let mut contents = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            contents.push(Self::row_to_content(&row)?);
        }
        for content in &mut contents {
            content.related = self.relations(&content.id).await?;
        }
        Ok(contents)
    }

    fn row_params(content: &Content) -> Result<Vec<Value>, DatabaseError> {
        let properties = serde_json::to_string(&content.properties)
            .map_err(|e| DatabaseError::sql_execution(format!("Invalid properties: {}", e)))?;
        Ok(vec![
            Value::Text(content.id.clone()),
            opt_text(content.node_id.clone()),
            Value::Text(content.language.clone()),
            Value::Text(content.content_type.clone()),
            Value::Text(content.title.clone()),
            Value::Text(content.state.clone()),
            opt_text(content.publication.as_ref().map(format_timestamp)),
            opt_text(content.expire.as_ref().map(format_timestamp)),
            Value::Integer(i64::from(content.navigation)),
            opt_text(content.owner.clone()),
            Value::Text(content.template.clone()),
            Value::Text(properties),
            Value::Text(format_timestamp(&content.created_at)),
            Value::Text(format_timestamp(&content.modified_at)),
        ])
    }

    /// Insert a record; an occupied `(node, language)` is a constraint violation
    pub async fn insert(&self, content: &Content) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO content ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    CONTENT_COLUMNS
                ),
                Params::Positional(Self::row_params(content)?),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to insert content", e))?;
        Ok(())
    }

    /// Overwrite every column of an existing record
    pub async fn update(&self, content: &Content) -> Result<(), DatabaseError> {
        let mut params = Self::row_params(content)?;
        // id moves from the first column to the WHERE clause
        let id = params.remove(0);
        params.push(id);

        self.conn
            .execute(
                "UPDATE content SET node_id = ?, language = ?, content_type = ?, title = ?,
                    state = ?, publication = ?, expire = ?, navigation = ?, owner = ?,
                    template = ?, properties = ?, created_at = ?, modified_at = ?
                 WHERE id = ?",
                Params::Positional(params),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to update content", e))?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Content>, DatabaseError> {
        Ok(self
            .fetch(
                &format!("SELECT {} FROM content WHERE id = ?", CONTENT_COLUMNS),
                [id],
            )
            .await?
            .into_iter()
            .next())
    }

    /// Record attached to `node_id` for exactly `language`
    pub async fn for_node_language(
        &self,
        node_id: &str,
        language: &str,
    ) -> Result<Option<Content>, DatabaseError> {
        Ok(self
            .fetch(
                &format!(
                    "SELECT {} FROM content WHERE node_id = ? AND language = ?",
                    CONTENT_COLUMNS
                ),
                (node_id, language),
            )
            .await?
            .into_iter()
            .next())
    }

    /// All records attached to `node_id`, ordered by language
    pub async fn for_node(&self, node_id: &str) -> Result<Vec<Content>, DatabaseError> {
        self.fetch(
            &format!(
                "SELECT {} FROM content WHERE node_id = ? ORDER BY language",
                CONTENT_COLUMNS
            ),
            [node_id],
        )
        .await
    }

    /// Every attached record, ordered by node then language
    pub async fn attached(&self) -> Result<Vec<Content>, DatabaseError> {
        self.fetch(
            &format!(
                "SELECT {} FROM content WHERE node_id IS NOT NULL ORDER BY node_id, language",
                CONTENT_COLUMNS
            ),
            (),
        )
        .await
    }

    //
    // RELATIONS
    //

    pub async fn relations(&self, content_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT related_id FROM content_relations WHERE content_id = ? ORDER BY related_id",
                [content_id],
            )
            .await
            .map_err(|e| DatabaseError::statement("relations query", e))?;

        let mut related = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            related.push(row.get(0)?);
        }
        Ok(related)
    }

    pub async fn add_relation(
        &self,
        content_id: &str,
        related_id: &str,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO content_relations (content_id, related_id) VALUES (?, ?)",
                (content_id, related_id),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to relate content", e))?;
        Ok(())
    }

    //
    // UNIQUE FIELD VALUES
    //

    /// Claim `value` for `(content_type, field)`; taken values are a constraint violation
    pub async fn claim_unique(
        &self,
        content_id: &str,
        content_type: &str,
        field: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO content_unique_values (content_id, content_type, field, value)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (content_id, field)
                 DO UPDATE SET content_type = excluded.content_type, value = excluded.value",
                (content_id, content_type, field, value),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to claim unique value", e))?;
        Ok(())
    }

    pub async fn release_unique(&self, content_id: &str, field: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "DELETE FROM content_unique_values WHERE content_id = ? AND field = ?",
                (content_id, field),
            )
            .await
            .map_err(|e| DatabaseError::statement("Failed to release unique value", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseService, TreeStore};
    use crate::models::{NewContent, Node};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (DatabaseService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn page(title: &str, language: &str) -> Content {
        NewContent::new("page", title)
            .properties(json!({"body": "hello"}))
            .into_content(language.to_string(), "private".to_string())
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let (db, _temp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let store = ContentStore::new(&conn);

        let mut content = page("Hello", "en");
        store.insert(&content).await.unwrap();

        let loaded = store.get(&content.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Hello");
        assert_eq!(loaded.properties, json!({"body": "hello"}));
        assert!(loaded.navigation);
        assert_eq!(loaded.node_id, None);

        content.title = "Changed".to_string();
        content.owner = Some("alice".to_string());
        store.update(&content).await.unwrap();
        let loaded = store.get(&content.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Changed");
        assert_eq!(loaded.owner.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_one_record_per_node_language() {
        let (db, _temp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let tree = TreeStore::new(&conn);
        let store = ContentStore::new(&conn);

        let root = Node::new_root();
        tree.insert_node(&root).await.unwrap();

        let mut en = page("en", "en");
        en.node_id = Some(root.id.clone());
        store.insert(&en).await.unwrap();

        let mut nl = page("nl", "nl");
        nl.node_id = Some(root.id.clone());
        store.insert(&nl).await.unwrap();

        let mut second_en = page("en again", "en");
        second_en.node_id = Some(root.id.clone());
        assert!(store
            .insert(&second_en)
            .await
            .unwrap_err()
            .is_constraint_violation());

        assert_eq!(store.for_node(&root.id).await.unwrap().len(), 2);
        assert_eq!(
            store
                .for_node_language(&root.id, "nl")
                .await
                .unwrap()
                .map(|c| c.id),
            Some(nl.id)
        );
    }

    #[tokio::test]
    async fn test_relations_and_unique_values() {
        let (db, _temp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();
        let store = ContentStore::new(&conn);

        let a = page("a", "en");
        let b = page("b", "en");
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        store.add_relation(&a.id, &b.id).await.unwrap();
        store.add_relation(&a.id, &b.id).await.unwrap();
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().related, vec![b.id.clone()]);

        store.claim_unique(&a.id, "page", "code", "x").await.unwrap();
        // re-claiming for the same record updates in place
        store.claim_unique(&a.id, "page", "code", "x").await.unwrap();
        assert!(store
            .claim_unique(&b.id, "page", "code", "x")
            .await
            .unwrap_err()
            .is_constraint_violation());
        // other types do not collide
        store.claim_unique(&b.id, "news", "code", "x").await.unwrap();

        store.release_unique(&a.id, "code").await.unwrap();
        store.claim_unique(&b.id, "page", "code", "x").await.unwrap();
    }
}
