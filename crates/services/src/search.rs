//! # SearchEngine
//!
//! Counted, paginated listings of content and comments. Each listing runs
//! twice through the same query function: once as `COUNT(*)`, once for the
//! page. Only the select list and ORDER/LIMIT/OFFSET differ, so the total
//! always agrees with the pages.

use crate::content::ContentTreeResolver;
use domains::query::{comment_columns, content_columns, unique_params};
use domains::{
    Comment, CommentFilter, CommentsView, Content, DomainError, FromSqlRow, PageRequest, Paged,
    Query, Result, SearchFilter, SqlExecutor,
};
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Clone)]
pub struct SearchEngine {
    db: Arc<dyn SqlExecutor>,
    tree: ContentTreeResolver,
}

impl SearchEngine {
    pub fn new(db: Arc<dyn SqlExecutor>, tree: ContentTreeResolver) -> Self {
        Self { db, tree }
    }

    /// Content matching `filter` that the viewer may read, newest first.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        filter: &SearchFilter,
        viewer: i64,
        page: PageRequest,
    ) -> Result<Paged<Content>> {
        let total = self
            .db
            .fetch_scalar(&content_query(filter, "COUNT(*)", viewer))
            .await?;

        let mut q = content_query(filter, &content_columns("c", false), viewer);
        q.order_by("c.id DESC");
        q.limit(page.per_page.into());
        q.skip(page.skip());
        q.finalize();

        let mut results = self
            .db
            .fetch_all(&q)
            .await?
            .iter()
            .map(Content::from_row)
            .collect::<Result<Vec<_>>>()?;

        let users = self
            .tree
            .authors()
            .resolve(results.iter().map(|c| c.create_user_id))
            .await?;
        for content in &mut results {
            if !content.attach_author(&users) {
                warn!(page = %content.name, id = content.id, "couldn't find author for page");
            }
        }

        Ok(Paged::new(results, total, page))
    }

    /// One page of comments on the node with `hash`.
    #[instrument(skip(self))]
    pub async fn load_comments(
        &self,
        hash: &str,
        viewer: i64,
        filter: &CommentFilter,
        page: PageRequest,
    ) -> Result<CommentsView> {
        if hash.is_empty() {
            return Err(DomainError::BadRequest(
                "must specify a page hash to view comments".to_string(),
            ));
        }
        // Looked up first so a hidden page yields NotFound, not an empty list
        let mut node = self.tree.find_by_hash(hash, viewer, false).await?;

        let total = self
            .db
            .fetch_scalar(&comment_query(filter, "COUNT(*)", node.id, viewer))
            .await?;

        let mut q = comment_query(filter, &comment_columns("m"), node.id, viewer);
        q.order_by(if filter.oldest { "m.id" } else { "m.id DESC" });
        q.limit(page.per_page.into());
        q.skip(page.skip());
        q.finalize();

        let mut comments = self
            .db
            .fetch_all(&q)
            .await?
            .iter()
            .map(Comment::from_row)
            .collect::<Result<Vec<_>>>()?;

        let author_ids = comments
            .iter()
            .map(|c| c.create_user_id)
            .chain([node.create_user_id]);
        let users = self.tree.authors().resolve(author_ids).await?;

        if !node.attach_author(&users) {
            warn!(page = %node.name, id = node.id, "couldn't find author for page");
        }
        for comment in &mut comments {
            if !comment.attach_author(&users) {
                warn!(comment = comment.id, page = node.id, "couldn't find author for comment");
            }
        }

        Ok(CommentsView {
            node,
            comments: Paged::new(comments, total, page),
        })
    }
}

/// Shared predicate for content search; `fields` is the select list.
fn content_query(filter: &SearchFilter, fields: &str, viewer: i64) -> Query {
    let mut q = Query::select(fields, "content c");
    if !filter.text.is_empty() {
        let any = format!("%{}%", filter.text);
        q.push_sql(
            " AND (c.name LIKE ? OR c.hash LIKE ? OR \
             EXISTS (SELECT 1 FROM content_keywords WHERE contentId = c.id AND value LIKE ?))",
        );
        q.add_params([any.clone(), any.clone(), any]);
    }
    if filter.user != 0 {
        q.push_sql(" AND c.createUserId = ?");
        q.add_param(filter.user);
    }
    if !filter.ignore_types.is_empty() {
        q.push_sql(" AND c.contentType NOT IN (");
        q.add_parameterized_list(unique_params(
            filter.ignore_types.iter().map(|t| t.as_i64()),
        ));
        q.push_sql(")");
    }
    q.and_viewable("c.id", viewer);
    q
}

/// Shared predicate for comment listings on one content node.
fn comment_query(filter: &CommentFilter, fields: &str, content_id: i64, viewer: i64) -> Query {
    let mut q = Query::select(fields, "messages m");
    q.push_sql(" AND m.contentId = ?");
    q.add_param(content_id);
    q.and_comment_viewable("m");
    if !filter.text.is_empty() {
        q.push_sql(" AND m.text LIKE ?");
        q.add_param(format!("%{}%", filter.text));
    }
    if filter.user != 0 {
        q.push_sql(" AND m.createUserId = ?");
        q.add_param(filter.user);
    }
    if !filter.start.is_empty() {
        q.push_sql(" AND m.createDate > ?");
        q.add_param(filter.start.as_str());
    }
    q.and_viewable("m.contentId", viewer);
    q
}
