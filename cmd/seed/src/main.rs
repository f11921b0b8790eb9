//! Creates the schema in the configured database and fills it with a small
//! demo tree: a public home page with children, one page only the admin can
//! read, a file node and a couple of comments. Safe to run repeatedly.
//!
//! The admin password comes from `CANOPY_SEED_PASSWORD` (default `canopy`).

use anyhow::{Context, Result};
use auth_adapters::Argon2Digest;
use configs::Settings;
use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use storage_adapters::schema::bootstrap;
use storage_adapters::SqliteExecutor;
use tracing::info;

const USERS: &[(i64, &str, bool)] = &[(1, "admin", true), (2, "alice", false)];

// id, name, hash, parentId, contentType, createUserId, text
const CONTENT: &[(i64, &str, &str, i64, i64, i64, &str)] = &[
    (1, "Home", "home", 0, 1, 1, "Welcome to the demo site."),
    (2, "Guides", "guides", 1, 1, 1, "How-tos live under here."),
    (3, "Getting started", "getting-started", 2, 1, 2, "Step one: read this."),
    (4, "Admin notes", "admin-notes", 1, 1, 1, "Only the admin can see this."),
    (5, "logo", "logo", 1, 3, 1, ""),
];

// contentId, userId (0 = everyone)
const READ_GRANTS: &[(i64, i64)] = &[(1, 0), (2, 0), (3, 0), (5, 0), (4, 1)];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let settings = Settings::load()?;
    let db = SqliteExecutor::connect(settings.database_url.expose_secret(), 1)
        .await
        .context("Failed to open database (for a new file use a url like sqlite:data/content.db?mode=rwc)")?;
    let pool = db.pool();

    bootstrap(pool).await?;
    info!("schema ready");

    let password = std::env::var("CANOPY_SEED_PASSWORD").unwrap_or_else(|_| "canopy".into());
    seed_users(pool, &password).await?;
    seed_content(pool).await?;

    info!("seed complete");
    Ok(())
}

async fn seed_users(pool: &SqlitePool, password: &str) -> Result<()> {
    let digest = Argon2Digest::default();
    for &(id, username, is_super) in USERS {
        let (hash, salt) = digest.new_credentials(password)?;
        sqlx::query(
            "INSERT OR IGNORE INTO users (id, username, super, password, salt) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(username)
        .bind(is_super)
        .bind(hash)
        .bind(salt)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert user {username}"))?;
    }
    info!(count = USERS.len(), "users seeded");
    Ok(())
}

async fn seed_content(pool: &SqlitePool) -> Result<()> {
    for &(id, name, hash, parent_id, content_type, user_id, text) in CONTENT {
        sqlx::query(
            "INSERT OR IGNORE INTO content (id, name, hash, parentId, contentType, createUserId, text) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(hash)
        .bind(parent_id)
        .bind(content_type)
        .bind(user_id)
        .bind(text)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert content {hash}"))?;
    }

    for &(content_id, user_id) in READ_GRANTS {
        sqlx::query("INSERT OR IGNORE INTO content_permissions (contentId, userId, read) VALUES (?, ?, 1)")
            .bind(content_id)
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    // Tables without a natural key are only filled once
    let seeded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(pool)
        .await?;
    if seeded == 0 {
        sqlx::query("INSERT INTO content_values (contentId, key, value) VALUES (1, 'tagline', 'A tiny demo')")
            .execute(pool)
            .await?;
        sqlx::query("INSERT INTO content_keywords (contentId, value) VALUES (3, 'howto')")
            .execute(pool)
            .await?;
        for (user_id, text) in [(2, "First!"), (1, "Welcome aboard.")] {
            sqlx::query("INSERT INTO messages (contentId, text, createUserId) VALUES (1, ?, ?)")
                .bind(text)
                .bind(user_id)
                .execute(pool)
                .await?;
        }
    }

    info!(count = CONTENT.len(), "content seeded");
    Ok(())
}
