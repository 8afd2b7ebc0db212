use crate::error::PersistenceError;
use crate::models::*;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create storage directory: {0}")]
    StorageCreation(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(String),
    #[error("Failed to serialize document content: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error> for DatabaseError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        DatabaseError::Sqlite(err.to_string())
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::Sqlite(err.to_string())
    }
}

/// Relational store for imported documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts the document and returns the identifier assigned by the store.
    async fn create_document(&self, document: &NewDocument) -> Result<i64, PersistenceError>;
}

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        filename TEXT NOT NULL,
        bucket TEXT NOT NULL,
        doc_type TEXT NOT NULL DEFAULT 'file',
        source TEXT,
        external_link TEXT,
        created_at DATETIME NOT NULL
    );
    CREATE INDEX IF NOT EXISTS documents_bucket ON documents (bucket);";

pub struct Database {
    connection: tokio_rusqlite::Connection,
}

impl Database {
    pub async fn new(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let connection = tokio_rusqlite::Connection::open(path).await?;
        let db = Database { connection };
        db._init_database().await?;
        tracing::info!(path = %path.display(), "Document database ready");
        Ok(db)
    }

    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        let connection = tokio_rusqlite::Connection::open_in_memory().await?;
        let db = Database { connection };
        db._init_database().await?;
        Ok(db)
    }

    async fn _init_database(&self) -> Result<(), DatabaseError> {
        self.connection
            .call(|conn| {
                conn.execute_batch(CREATE_TABLES)
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await?;
        Ok(())
    }

    pub async fn insert_document(&self, document: &NewDocument) -> Result<i64, DatabaseError> {
        let query = "
            INSERT INTO documents (content, filename, bucket, doc_type, source, external_link, created_at)
            VALUES (?, ?, ?, 'jira', ?, ?, ?)
        ";
        let content = serde_json::to_string(&document.content)?;
        let filename = document.filename.clone();
        let bucket = document.bucket.clone();
        let source = document.content.source.clone();
        let external_link = document.external_link.clone();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let id = self
            .connection
            .call(move |conn| {
                conn.execute(
                    query,
                    (
                        content.as_str(),
                        filename.as_str(),
                        bucket.as_str(),
                        source.as_str(),
                        external_link.as_deref(),
                        timestamp.as_str(),
                    ),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn create_document(&self, document: &NewDocument) -> Result<i64, PersistenceError> {
        let id = self.insert_document(document).await?;
        tracing::debug!(
            document_id = id,
            issue_key = %document.content.issue_key,
            "Inserted document row"
        );
        Ok(id)
    }
}
