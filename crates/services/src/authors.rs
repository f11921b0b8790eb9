//! Batch author lookup shared by the page, comment and search paths.

use domains::query::{unique_params, user_columns};
use domains::{FromSqlRow, Query, Result, SqlExecutor, User, UserMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AuthorResolver {
    db: Arc<dyn SqlExecutor>,
}

impl AuthorResolver {
    pub fn new(db: Arc<dyn SqlExecutor>) -> Self {
        Self { db }
    }

    /// Loads every user in `ids` with one query. Duplicates are collapsed
    /// first; an empty set skips the database entirely.
    pub async fn resolve<I>(&self, ids: I) -> Result<UserMap>
    where
        I: IntoIterator<Item = i64>,
    {
        let ids = unique_params(ids);
        if ids.is_empty() {
            return Ok(UserMap::new());
        }
        debug!(count = ids.len(), "resolving authors");

        let mut q = Query::select(&user_columns(""), "users");
        q.push_sql(" AND id IN (");
        q.add_parameterized_list(ids);
        q.push_sql(")");
        q.finalize();

        self.db
            .fetch_all(&q)
            .await?
            .iter()
            .map(|row| User::from_row(row).map(|user| (user.id, Arc::new(user))))
            .collect()
    }
}
