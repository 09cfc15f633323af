// src/store.rs
//! Persistence seam: posts, their scores, and the "already notified" ledger.
//! The SQLite implementation is the authority for cross-run dedup — the
//! `source_link` uniqueness constraint rejects duplicates even if two
//! pipeline instances ever race (the in-process checks are shortcuts only).
//!
//! The ledger lives here as a `notified(source_link PRIMARY KEY)` table
//! rather than an append-only file: the check stays a SELECT, the append
//! becomes a single conditional insert.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

use crate::crawl::types::PostRecord;
use crate::score::types::{ScoredResult, Status};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Expected, non-fatal outcome: the natural key already exists.
    #[error("duplicate source link: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    async fn exists(&self, source_link: &str) -> Result<bool, StoreError>;
    /// Insert a post; `StoreError::Duplicate` if the source link is known.
    async fn insert_post(&self, record: &PostRecord) -> Result<i64, StoreError>;
    async fn insert_scores(&self, post_id: i64, results: &[ScoredResult])
        -> Result<(), StoreError>;
    /// Ledger check: has this link already triggered a notification?
    async fn already_notified(&self, source_link: &str) -> Result<bool, StoreError>;
    /// Ledger append: conditional insert. `false` means another write beat us
    /// to it — treat as a duplicate outcome, not an error.
    async fn mark_notified(&self, source_link: &str) -> Result<bool, StoreError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &str) -> Result<Self, StoreError> {
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))?.create_if_missing(true);
        Self::with_options(opts).await
    }

    /// In-memory store for tests.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn with_options(opts: SqliteConnectOptions) -> Result<Self, StoreError> {
        // Single connection: the pipeline is single-writer and SQLite
        // serializes writes anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_link TEXT NOT NULL UNIQUE,
                query TEXT,
                author_name TEXT,
                profile_url TEXT,
                published_at TEXT NOT NULL,
                text TEXT,
                hashtags TEXT,
                reaction_count INTEGER,
                comment_count INTEGER,
                inserted_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'NOW'))
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                match_percentage TEXT,
                experience_gap TEXT,
                contact_email TEXT,
                company_name TEXT,
                should_apply INTEGER NOT NULL DEFAULT 0,
                subject TEXT,
                body TEXT,
                model_name TEXT,
                status TEXT NOT NULL,
                full_result TEXT,
                inserted_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'NOW'))
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notified (
                source_link TEXT PRIMARY KEY,
                notified_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'NOW'))
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl PostStore for SqliteStore {
    async fn exists(&self, source_link: &str) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE source_link = ?1")
                .bind(source_link)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn insert_post(&self, record: &PostRecord) -> Result<i64, StoreError> {
        let hashtags = serde_json::to_string(&record.hashtags)?;
        let res = sqlx::query(
            r#"
            INSERT INTO posts
                (source_link, query, author_name, profile_url, published_at,
                 text, hashtags, reaction_count, comment_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.source_link)
        .bind(&record.query)
        .bind(&record.author_name)
        .bind(&record.profile_url)
        .bind(record.published_at.to_rfc3339())
        .bind(&record.text)
        .bind(hashtags)
        .bind(record.reaction_count)
        .bind(record.comment_count)
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) => {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return Err(StoreError::Duplicate(record.source_link.clone()));
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn insert_scores(
        &self,
        post_id: i64,
        results: &[ScoredResult],
    ) -> Result<(), StoreError> {
        for result in results {
            let status = match result.status {
                Status::Ok => "ok",
                Status::Failed => "failed",
            };
            sqlx::query(
                r#"
                INSERT INTO post_scores
                    (post_id, match_percentage, experience_gap, contact_email,
                     company_name, should_apply, subject, body, model_name,
                     status, full_result)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(post_id)
            .bind(result.match_percentage.to_string())
            .bind(result.experience_gap.to_string())
            .bind(serde_json::to_string(&result.contact_email)?)
            .bind(&result.company_name)
            .bind(result.should_apply)
            .bind(result.message_content.as_ref().map(|m| m.subject.clone()))
            .bind(result.message_content.as_ref().map(|m| m.body.clone()))
            .bind(&result.model_name)
            .bind(status)
            .bind(serde_json::to_string(result)?)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn already_notified(&self, source_link: &str) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notified WHERE source_link = ?1")
                .bind(source_link)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn mark_notified(&self, source_link: &str) -> Result<bool, StoreError> {
        let done = sqlx::query("INSERT OR IGNORE INTO notified (source_link) VALUES (?1)")
            .bind(source_link)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() == 1)
    }
}
