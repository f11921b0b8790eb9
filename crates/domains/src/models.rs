//! # Domain Models
//!
//! These structs represent the read-only entities Canopy serves.
//! Ids are the integer row ids of the existing content database; content is
//! addressed externally by its unguessable `hash`.

use crate::error::Result;
use crate::row::{FromSqlRow, SqlRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Batch-loaded users keyed by id. Values are shared, so attaching the same
/// author to many comments never clones the user.
pub type UserMap = HashMap<i64, Arc<User>>;

/// Basic user data (not all columns of the users table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar: String,
    pub created: String,
    pub is_super: bool,
}

impl FromSqlRow for User {
    fn from_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            username: row.text("username")?,
            avatar: row.text("avatar")?,
            created: row.text("createDate")?,
            is_super: row.bool("super")?,
        })
    }
}

/// Stored credentials for a login attempt. Never leaves the auth service.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub digest: String,
    pub salt: String,
}

impl FromSqlRow for UserCredentials {
    fn from_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            user: User::from_row(row)?,
            digest: row.text("password")?,
            salt: row.text("salt")?,
        })
    }
}

/// The kind of a content node, as stored in `content.contentType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    None,
    Page,
    Module,
    File,
    Userpage,
    System,
    Other(i64),
}

impl ContentType {
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Page,
            2 => Self::Module,
            3 => Self::File,
            4 => Self::Userpage,
            5 => Self::System,
            other => Self::Other(other),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Page => 1,
            Self::Module => 2,
            Self::File => 3,
            Self::Userpage => 4,
            Self::System => 5,
            Self::Other(other) => other,
        }
    }
}

/// A hierarchical content node. `parent_id == 0` means "child of the root".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub id: i64,
    pub name: String,
    pub hash: String,
    pub text: String,
    pub parent_id: i64,
    pub created: String,
    pub content_type: ContentType,
    pub create_user_id: i64,
    /// True when no permission row grants anonymous read
    pub private: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Arc<User>>,
}

impl Content {
    /// The virtual root every tree hangs from. It has no row and no author.
    pub fn root() -> Self {
        Self {
            id: 0,
            name: "Root".to_string(),
            hash: String::new(),
            text: String::new(),
            parent_id: 0,
            created: String::new(),
            content_type: ContentType::None,
            create_user_id: 0,
            private: false,
            values: BTreeMap::new(),
            author: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == 0
    }

    pub fn author(&self) -> Option<&User> {
        self.author.as_deref()
    }

    /// Links the author out of a batch lookup. Returns false when the
    /// author id has no matching user; the reference then stays unset.
    pub fn attach_author(&mut self, users: &UserMap) -> bool {
        self.author = users.get(&self.create_user_id).cloned();
        self.author.is_some()
    }
}

impl FromSqlRow for Content {
    fn from_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            hash: row.text("hash")?,
            text: row.text("text")?,
            parent_id: row.i64("parentId")?,
            created: row.text("createDate")?,
            content_type: ContentType::from_i64(row.i64("contentType")?),
            create_user_id: row.i64("createUserId")?,
            private: row.bool("private")?,
            values: BTreeMap::new(),
            author: None,
        })
    }
}

/// A comment (message) posted on a content node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub content_id: i64,
    pub created: String,
    pub text: String,
    pub create_user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Arc<User>>,
}

impl Comment {
    pub fn author(&self) -> Option<&User> {
        self.author.as_deref()
    }

    pub fn attach_author(&mut self, users: &UserMap) -> bool {
        self.author = users.get(&self.create_user_id).cloned();
        self.author.is_some()
    }
}

impl FromSqlRow for Comment {
    fn from_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            id: row.i64("id")?,
            content_id: row.i64("contentId")?,
            created: row.text("createDate")?,
            text: row.text("text")?,
            create_user_id: row.i64("createUserId")?,
            author: None,
        })
    }
}

/// An authenticated login, owned by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// Which page of a listing to fetch. Pages are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page) * u64::from(self.per_page)
    }
}

/// One page of a counted listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    /// Total matches across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    /// 1-based index of the first item on this page
    pub start: u64,
    /// 1-based index of the last item, absent for an empty page
    pub end: Option<u64>,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let skip = request.skip();
        let end = (!items.is_empty()).then(|| skip + items.len() as u64);
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
            start: skip + 1,
            end,
        }
    }
}

/// Everything needed to render one content page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub node: Content,
    pub children: Vec<Content>,
    /// Root first, the node itself last
    pub breadcrumbs: Vec<Content>,
    /// Viewable comments on the node; absent for the virtual root
    pub comment_count: Option<i64>,
}

/// A page of comments together with the node they belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentsView {
    pub node: Content,
    pub comments: Paged<Comment>,
}

/// Content search filter. Empty/zero fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub text: String,
    pub user: i64,
    pub ignore_types: Vec<ContentType>,
}

/// Comment listing filter. Empty/zero fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentFilter {
    pub text: String,
    pub user: i64,
    /// Only comments created strictly after this date
    pub start: String,
    /// Oldest first instead of newest first
    pub oldest: bool,
}
