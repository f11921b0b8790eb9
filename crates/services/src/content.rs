//! # ContentTreeResolver
//!
//! Builds a page view: the node, its navigable children and the breadcrumb
//! chain up to the virtual root. Every row passes through the viewable filter,
//! so nothing returned here needs further permission checks.

use crate::authors::AuthorResolver;
use domains::query::content_columns;
use domains::{
    Content, ContentType, DomainError, FromSqlRow, PageView, Query, Result, SqlExecutor,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Ancestor hops before the breadcrumb walk gives up. The tree is acyclic by
/// construction elsewhere; this only bounds corrupt data.
pub const MAX_BREADCRUMB_DEPTH: usize = 64;

#[derive(Clone)]
pub struct ContentTreeResolver {
    db: Arc<dyn SqlExecutor>,
    authors: AuthorResolver,
}

impl ContentTreeResolver {
    pub fn new(db: Arc<dyn SqlExecutor>) -> Self {
        Self {
            authors: AuthorResolver::new(Arc::clone(&db)),
            db,
        }
    }

    pub fn authors(&self) -> &AuthorResolver {
        &self.authors
    }

    /// Loads the page for `hash`, or the virtual root for an empty hash.
    #[instrument(skip(self))]
    pub async fn load_page(&self, hash: &str, viewer: i64) -> Result<PageView> {
        let mut node = if hash.is_empty() {
            Content::root()
        } else {
            self.find_by_hash(hash, viewer, true).await?
        };

        let children = self.children(node.id, viewer).await?;
        let breadcrumbs = self.breadcrumbs(&node, viewer).await?;

        let mut comment_count = None;
        if !node.is_root() {
            let users = self.authors.resolve([node.create_user_id]).await?;
            if !node.attach_author(&users) {
                warn!(page = %node.name, id = node.id, "couldn't find author for page");
            }
            node.values = self.values(node.id).await?;
            comment_count = Some(self.comment_count(node.id).await?);
        }

        Ok(PageView {
            node,
            children,
            breadcrumbs,
            comment_count,
        })
    }

    /// The viewable node with this hash. Missing and forbidden both come back
    /// as `NotFound`.
    pub async fn find_by_hash(&self, hash: &str, viewer: i64, all_fields: bool) -> Result<Content> {
        let mut q = Query::select(&content_columns("c", all_fields), "content c");
        q.push_sql(" AND c.hash = ?");
        q.add_param(hash);
        q.and_viewable("c.id", viewer);
        q.finalize();

        match self.db.fetch_optional(&q).await? {
            Some(row) => Content::from_row(&row),
            None => Err(DomainError::NotFound(format!("no content with hash {hash}"))),
        }
    }

    async fn find_by_id(&self, id: i64, viewer: i64) -> Result<Option<Content>> {
        let mut q = Query::select(&content_columns("c", false), "content c");
        q.push_sql(" AND c.id = ?");
        q.add_param(id);
        q.and_viewable("c.id", viewer);
        q.finalize();

        self.db
            .fetch_optional(&q)
            .await?
            .map(|row| Content::from_row(&row))
            .transpose()
    }

    /// Viewable, non-file children ordered by name.
    async fn children(&self, parent_id: i64, viewer: i64) -> Result<Vec<Content>> {
        let mut q = Query::select(&content_columns("c", false), "content c");
        q.push_sql(" AND c.parentId = ? AND c.contentType <> ?");
        q.add_params([parent_id, ContentType::File.as_i64()]);
        q.and_viewable("c.id", viewer);
        q.order_by("c.name");
        q.finalize();

        self.db
            .fetch_all(&q)
            .await?
            .iter()
            .map(Content::from_row)
            .collect()
    }

    /// Root first, `node` last. Each ancestor is a separate viewable lookup;
    /// the walk stops quietly at the first one that is missing or hidden.
    pub async fn breadcrumbs(&self, node: &Content, viewer: i64) -> Result<Vec<Content>> {
        let mut chain = VecDeque::new();
        if !node.is_root() {
            let mut crumb = node.clone();
            crumb.text.clear();
            chain.push_front(crumb);
        }

        let mut parent_id = node.parent_id;
        let mut hops = 0;
        while parent_id != 0 {
            if hops == MAX_BREADCRUMB_DEPTH {
                warn!(id = node.id, "breadcrumb walk hit depth bound, truncating");
                break;
            }
            hops += 1;

            match self.find_by_id(parent_id, viewer).await? {
                Some(parent) => {
                    parent_id = parent.parent_id;
                    chain.push_front(parent);
                }
                None => {
                    debug!(parent_id, "ancestor not viewable, stopping breadcrumbs");
                    break;
                }
            }
        }

        chain.push_front(Content::root());
        Ok(chain.into())
    }

    async fn values(&self, content_id: i64) -> Result<BTreeMap<String, String>> {
        let mut q = Query::select("v.key,v.value", "content_values v");
        q.push_sql(" AND v.contentId = ?");
        q.add_param(content_id);
        q.finalize();

        self.db
            .fetch_all(&q)
            .await?
            .iter()
            .map(|row| -> Result<(String, String)> { Ok((row.text("key")?, row.text("value")?)) })
            .collect()
    }

    async fn comment_count(&self, content_id: i64) -> Result<i64> {
        let mut q = Query::select("COUNT(*)", "messages");
        q.push_sql(" AND contentId = ?");
        q.add_param(content_id);
        q.and_comment_viewable("");
        q.finalize();

        self.db.fetch_scalar(&q).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockSqlExecutor, SqlRow, SqlValue};

    fn content_row(id: i64, parent_id: i64, name: &str) -> SqlRow {
        SqlRow::new()
            .with("id", id)
            .with("name", name)
            .with("hash", format!("hash{id}"))
            .with("text", "")
            .with("parentId", parent_id)
            .with("contentType", 1i64)
            .with("createDate", "2024-01-01")
            .with("createUserId", 1i64)
            .with("private", false)
    }

    fn first_param(q: &Query) -> i64 {
        match q.params().first() {
            Some(SqlValue::Integer(id)) => *id,
            _ => -1,
        }
    }

    #[tokio::test]
    async fn test_root_page_on_empty_store() {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_all().times(1).returning(|_| Ok(vec![]));
        db.expect_fetch_optional().never();
        db.expect_fetch_scalar().never();

        let view = ContentTreeResolver::new(Arc::new(db))
            .load_page("", 0)
            .await
            .unwrap();

        assert_eq!(view.node.id, 0);
        assert_eq!(view.node.name, "Root");
        assert!(view.children.is_empty());
        assert_eq!(view.breadcrumbs.len(), 1);
        assert_eq!(view.breadcrumbs[0].name, "Root");
        assert_eq!(view.comment_count, None);
    }

    #[tokio::test]
    async fn test_unknown_hash_is_not_found() {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional().returning(|_| Ok(None));

        let err = ContentTreeResolver::new(Arc::new(db))
            .load_page("missing", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_breadcrumbs_stop_at_hidden_ancestor() {
        // 4 -> 3 -> 2 (hidden) -> 1 -> root
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional().returning(|q| {
            Ok(match first_param(q) {
                3 => Some(content_row(3, 2, "three")),
                1 => Some(content_row(1, 0, "one")),
                _ => None,
            })
        });

        let resolver = ContentTreeResolver::new(Arc::new(db));
        let node = Content::from_row(&content_row(4, 3, "four")).unwrap();
        let crumbs = resolver.breadcrumbs(&node, 0).await.unwrap();

        let names: Vec<_> = crumbs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Root", "three", "four"]);
    }

    #[tokio::test]
    async fn test_breadcrumb_cycle_is_bounded() {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional()
            .times(MAX_BREADCRUMB_DEPTH)
            .returning(|_| Ok(Some(content_row(7, 7, "loop"))));

        let resolver = ContentTreeResolver::new(Arc::new(db));
        let node = Content::from_row(&content_row(7, 7, "loop")).unwrap();
        let crumbs = resolver.breadcrumbs(&node, 0).await.unwrap();

        assert_eq!(crumbs.len(), MAX_BREADCRUMB_DEPTH + 2);
    }

    #[tokio::test]
    async fn test_page_with_orphaned_author() {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional()
            .returning(|_| Ok(Some(content_row(5, 0, "five"))));
        // children, authors (none found), values
        db.expect_fetch_all().times(3).returning(|_| Ok(vec![]));
        db.expect_fetch_scalar().times(1).returning(|_| Ok(3));

        let view = ContentTreeResolver::new(Arc::new(db))
            .load_page("hash5", 0)
            .await
            .unwrap();

        assert_eq!(view.node.id, 5);
        assert!(view.node.author().is_none());
        assert_eq!(view.comment_count, Some(3));
        assert_eq!(view.breadcrumbs.len(), 2);
    }
}
