//! Write transactions
//!
//! A [`UnitOfWork`] owns one connection for the duration of a
//! `BEGIN IMMEDIATE` transaction. Savepoints let a caller roll back one
//! step (a branch of a copy) without abandoning the whole transaction.
//!
//! Dropping an unfinished unit closes its connection, which makes SQLite
//! roll the transaction back.

use crate::db::error::DatabaseError;
use libsql::Connection;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct UnitOfWork {
    conn: Connection,
    savepoints: AtomicU32,
}

impl UnitOfWork {
    pub(crate) async fn begin(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("BEGIN: {}", e)))?;
        Ok(Self {
            conn,
            savepoints: AtomicU32::new(0),
        })
    }

    /// Connection the transaction runs on
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub async fn commit(self) -> Result<(), DatabaseError> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _ = self.conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::transaction_failed(format!("COMMIT: {}", e)));
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("ROLLBACK: {}", e)))?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result through
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!("Rollback after failed operation failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Open a savepoint and return its name
    pub async fn savepoint(&self) -> Result<String, DatabaseError> {
        let name = format!("sp_{}", self.savepoints.fetch_add(1, Ordering::Relaxed) + 1);
        self.conn
            .execute(&format!("SAVEPOINT {}", name), ())
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("SAVEPOINT {}: {}", name, e)))?;
        Ok(name)
    }

    /// Keep everything done since the savepoint
    pub async fn release(&self, name: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(&format!("RELEASE {}", name), ())
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("RELEASE {}: {}", name, e)))?;
        Ok(())
    }

    /// Undo everything done since the savepoint and discard it
    pub async fn rollback_to(&self, name: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute(&format!("ROLLBACK TO {}", name), ())
            .await
            .map_err(|e| {
                DatabaseError::transaction_failed(format!("ROLLBACK TO {}: {}", name, e))
            })?;
        self.release(name).await
    }
}

#[cfg(test)]
mod tests {
    use crate::db::DatabaseService;
    use tempfile::TempDir;

    async fn count_nodes(db: &DatabaseService) -> i64 {
        let conn = db.connect_with_timeout().await.unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM nodes", ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    async fn insert(conn: &libsql::Connection, id: &str) {
        conn.execute(
            "INSERT INTO nodes (id, tree_path, position, created_at) VALUES (?, ?, 0, 'x')",
            (id, format!("/{}", id)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let uow = db.begin().await.unwrap();
        insert(uow.conn(), "a").await;
        uow.rollback().await.unwrap();
        assert_eq!(count_nodes(&db).await, 0);

        let uow = db.begin().await.unwrap();
        insert(uow.conn(), "a").await;
        uow.commit().await.unwrap();
        assert_eq!(count_nodes(&db).await, 1);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let uow = db.begin().await.unwrap();
        insert(uow.conn(), "a").await;
        let result: Result<(), crate::db::DatabaseError> =
            Err(crate::db::DatabaseError::sql_execution("boom"));
        assert!(uow.finish(result).await.is_err());
        assert_eq!(count_nodes(&db).await, 0);
    }

    #[tokio::test]
    async fn test_savepoint_rolls_back_only_branch() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let uow = db.begin().await.unwrap();
        insert(uow.conn(), "kept").await;

        let sp = uow.savepoint().await.unwrap();
        insert(uow.conn(), "discarded").await;
        uow.rollback_to(&sp).await.unwrap();

        let sp = uow.savepoint().await.unwrap();
        insert(uow.conn(), "released").await;
        uow.release(&sp).await.unwrap();

        uow.commit().await.unwrap();
        assert_eq!(count_nodes(&db).await, 2);
    }
}
