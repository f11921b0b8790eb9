//! # Query composition
//!
//! Every read Canopy performs is built here: SQL text plus positional
//! parameters plus ordering and pagination. The viewable filter lives in one
//! place so no caller ever writes its own permission predicate.

use crate::error::{DomainError, Result};
use crate::row::SqlValue;
use std::collections::HashSet;
use std::hash::Hash;

/// One SQL statement under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<SqlValue>,
    order: Option<String>,
    limit: Option<u64>,
    skip: Option<u64>,
    finalized: bool,
}

impl Query {
    /// An empty statement with no ordering and no limit/offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT <fields> FROM <from> WHERE 1`, ready for `AND ...` clauses.
    pub fn select(fields: &str, from: &str) -> Self {
        let mut q = Self::new();
        q.push_sql(&format!("SELECT {fields} FROM {from} WHERE 1"));
        q
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Appends raw SQL. Any `?` written here needs a matching `add_param`.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn add_param(&mut self, value: impl Into<SqlValue>) {
        self.params.push(value.into());
    }

    /// Appends parameters without touching the SQL text.
    pub fn add_params<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.params.extend(values.into_iter().map(Into::into));
    }

    /// Appends parameters AND their `?,?,?` placeholders, for `IN (...)`.
    pub fn add_parameterized_list<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let before = self.params.len();
        self.add_params(values);
        let placeholders = vec!["?"; self.params.len() - before];
        self.sql.push_str(&placeholders.join(","));
    }

    /// Restricts rows to content the viewer may read: the owning row is not
    /// soft-deleted, and a read grant exists for anonymous (user 0), for the
    /// viewer, or for a group the viewer belongs to.
    /// Needs an existing WHERE clause (`WHERE 1` is fine).
    pub fn and_viewable(&mut self, id_column: &str, viewer_id: i64) {
        let deleted = match id_column.split_once('.') {
            Some((alias, _)) => format!("{alias}.deleted"),
            None => "deleted".to_string(),
        };
        self.sql.push_str(&format!(
            " AND {deleted} = 0 AND {id_column} IN \
             (SELECT contentId FROM content_permissions WHERE read = 1 AND \
             (userId IN (0, ?) OR userId IN \
             (SELECT relatedId FROM user_relations WHERE userId = ? AND type = 1)))"
        ));
        self.add_params([viewer_id, viewer_id]);
    }

    /// Restricts message rows to visible comments (not deleted, not module
    /// output). Needs an existing WHERE clause.
    pub fn and_comment_viewable(&mut self, alias: &str) {
        let prefix = qualifier(alias);
        self.sql.push_str(&format!(
            " AND {prefix}deleted = 0 AND {prefix}module IS NULL"
        ));
    }

    /// The ORDER BY expression, without the keywords (add DESC yourself).
    pub fn order_by(&mut self, order: impl Into<String>) {
        self.order = Some(order.into());
    }

    pub fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    pub fn skip(&mut self, skip: u64) {
        self.skip = Some(skip);
    }

    /// Appends ORDER BY, LIMIT and OFFSET in that order. Runs once; later
    /// calls change nothing.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Some(order) = &self.order {
            self.sql.push_str(" ORDER BY ");
            self.sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            self.sql.push_str(" LIMIT ?");
            self.params.push(limit.into());
        }
        if let Some(skip) = self.skip {
            self.sql.push_str(" OFFSET ?");
            self.params.push(skip.into());
        }
    }

    /// Verifies that every emitted placeholder has exactly one parameter.
    /// Executors call this before running anything.
    pub fn check(&self) -> Result<()> {
        let placeholders = placeholder_count(&self.sql);
        if placeholders != self.params.len() {
            return Err(DomainError::Internal(format!(
                "query has {placeholders} placeholders but {} params: {}",
                self.params.len(),
                self.sql
            )));
        }
        Ok(())
    }
}

fn qualifier(alias: &str) -> String {
    if alias.is_empty() {
        String::new()
    } else {
        format!("{alias}.")
    }
}

/// Counts `?` placeholders outside quoted literals and identifiers.
pub fn placeholder_count(sql: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for ch in sql.chars() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(open), _) if ch == open => quote = None,
            (None, '?') => count += 1,
            _ => {}
        }
    }
    count
}

/// Distinct values in first-seen order. Keeps `IN (...)` lists small when
/// the same id repeats (one author on many comments).
pub fn unique_params<T, I>(ids: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// User columns for SELECT.
pub fn user_columns(alias: &str) -> String {
    let t = qualifier(alias);
    format!("{t}id,{t}username,{t}avatar,{t}createDate,{t}super")
}

/// Content columns for SELECT. Without `all_fields` the large `text` column
/// is replaced by an empty string, which is all list views need.
/// `alias` must name the content table; the private flag refers to it.
pub fn content_columns(alias: &str, all_fields: bool) -> String {
    debug_assert!(!alias.is_empty(), "content_columns needs a table alias");
    let t = qualifier(alias);
    let text = if all_fields {
        format!("{t}text")
    } else {
        "'' AS text".to_string()
    };
    format!(
        "{t}id,{t}name,{t}hash,{text},{t}parentId,{t}contentType,{t}createDate,{t}createUserId,\
         NOT EXISTS (SELECT 1 FROM content_permissions WHERE contentId = {t}id AND userId = 0 AND read = 1) AS private"
    )
}

/// Comment (message) columns for SELECT.
pub fn comment_columns(alias: &str) -> String {
    let t = qualifier(alias);
    format!("{t}id,{t}contentId,{t}createDate,{t}text,{t}createUserId")
}
