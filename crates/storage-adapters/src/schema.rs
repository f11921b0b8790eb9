//! Schema bootstrap for the tables Canopy reads.
//!
//! Production deployments point at an existing content database; this is
//! for the seeder and for tests running against an empty in-memory database.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const TABLES: &[(&str, &str)] = &[
    (
        "content",
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            hash TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL DEFAULT '',
            parentId INTEGER NOT NULL DEFAULT 0,
            contentType INTEGER NOT NULL DEFAULT 1,
            createDate TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            createUserId INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "content_permissions",
        r#"
        CREATE TABLE IF NOT EXISTS content_permissions (
            contentId INTEGER NOT NULL,
            userId INTEGER NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (contentId, userId)
        )
        "#,
    ),
    (
        "content_keywords",
        r#"
        CREATE TABLE IF NOT EXISTS content_keywords (
            contentId INTEGER NOT NULL,
            value TEXT NOT NULL
        )
        "#,
    ),
    (
        "content_values",
        r#"
        CREATE TABLE IF NOT EXISTS content_values (
            contentId INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL DEFAULT ''
        )
        "#,
    ),
    (
        "messages",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY,
            contentId INTEGER NOT NULL,
            createDate TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            text TEXT NOT NULL DEFAULT '',
            createUserId INTEGER NOT NULL DEFAULT 0,
            module TEXT,
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            avatar TEXT NOT NULL DEFAULT '',
            createDate TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            super INTEGER NOT NULL DEFAULT 0,
            password TEXT NOT NULL DEFAULT '',
            salt TEXT NOT NULL DEFAULT '',
            deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "user_relations",
        r#"
        CREATE TABLE IF NOT EXISTS user_relations (
            userId INTEGER NOT NULL,
            relatedId INTEGER NOT NULL,
            type INTEGER NOT NULL
        )
        "#,
    ),
    (
        "idx_content_parent",
        "CREATE INDEX IF NOT EXISTS idx_content_parent ON content (parentId)",
    ),
    (
        "idx_messages_content",
        "CREATE INDEX IF NOT EXISTS idx_messages_content ON messages (contentId)",
    ),
];

/// Creates any missing table or index. Safe to run repeatedly.
pub async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    for (name, ddl) in TABLES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {name}"))?;
    }
    Ok(())
}
