//! Fixtures for the integration tests: a bootstrapped in-memory database
//! with small helpers for inserting users, content, grants and comments.

use anyhow::Result;
use auth_adapters::Argon2Digest;
use domains::{ContentType, SqlExecutor};
use services::{AuthService, ContentTreeResolver, SearchEngine, SessionStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use storage_adapters::schema::bootstrap;
use storage_adapters::SqliteExecutor;

/// `user_relations.type` for group membership.
pub const GROUP_MEMBER: i64 = 1;

pub struct TestDb {
    executor: SqliteExecutor,
}

impl TestDb {
    pub async fn new() -> Result<Self> {
        let executor = SqliteExecutor::in_memory().await?;
        bootstrap(executor.pool()).await?;
        Ok(Self { executor })
    }

    pub fn pool(&self) -> &SqlitePool {
        self.executor.pool()
    }

    pub fn executor(&self) -> Arc<dyn SqlExecutor> {
        Arc::new(self.executor.clone())
    }

    pub fn tree(&self) -> ContentTreeResolver {
        ContentTreeResolver::new(self.executor())
    }

    pub fn search(&self) -> SearchEngine {
        SearchEngine::new(self.executor(), self.tree())
    }

    /// Auth over a cheap Argon2 configuration and a fresh session store.
    pub fn auth(&self, login_expiry: Duration, max_sessions: usize) -> Result<AuthService> {
        Ok(AuthService::new(
            self.executor(),
            Arc::new(cheap_digest()?),
            Arc::new(SessionStore::new(login_expiry, max_sessions)),
        ))
    }

    pub async fn user(&self, id: i64, username: &str) -> Result<()> {
        sqlx::query("INSERT INTO users (id, username) VALUES (?, ?)")
            .bind(id)
            .bind(username)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn user_with_password(&self, id: i64, username: &str, password: &str) -> Result<()> {
        let (digest, salt) = cheap_digest()?.new_credentials(password)?;
        sqlx::query("INSERT INTO users (id, username, password, salt) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(username)
            .bind(digest)
            .bind(salt)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// A page node; hash is `p<id>` and name `page <id>`.
    pub async fn page(&self, id: i64, parent_id: i64) -> Result<()> {
        self.content(id, parent_id, ContentType::Page, &format!("page {id}"), 1)
            .await
    }

    pub async fn content(
        &self,
        id: i64,
        parent_id: i64,
        content_type: ContentType,
        name: &str,
        author: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO content (id, name, hash, text, parentId, contentType, createUserId) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(hash(id))
        .bind(format!("body of {id}"))
        .bind(parent_id)
        .bind(content_type.as_i64())
        .bind(author)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Read grant; user 0 means everyone.
    pub async fn grant(&self, content_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO content_permissions (contentId, userId, read) VALUES (?, ?, 1)")
            .bind(content_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn join_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO user_relations (userId, relatedId, type) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(group_id)
            .bind(GROUP_MEMBER)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn comment(&self, content_id: i64, author: i64, text: &str, created: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO messages (contentId, createUserId, text, createDate) VALUES (?, ?, ?, ?)",
        )
        .bind(content_id)
        .bind(author)
        .bind(text)
        .bind(created)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn exec(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(self.pool()).await?;
        Ok(())
    }
}

pub fn hash(id: i64) -> String {
    format!("p{id}")
}

fn cheap_digest() -> Result<Argon2Digest> {
    Ok(Argon2Digest::with_params(64, 1, 1)?)
}
