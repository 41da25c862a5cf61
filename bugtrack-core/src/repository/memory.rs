//! In-memory implementation of `Repository`.
//!
//! All entities are held in memory and lost on restart. Every table sits
//! behind a single `RwLock` so multi-row operations such as
//! `unassign_bugs` are atomic, matching the SQLite backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BugFilter, Repository, RepositoryError};
use crate::model::{
    now, Bug, BugId, BugStatus, Comment, CommentId, NewBug, NewComment, NewUser, User, UserId,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    bugs: BTreeMap<BugId, Bug>,
    comments: BTreeMap<CommentId, Comment>,
    last_user_id: u64,
    last_bug_id: u64,
    last_comment_id: u64,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

/// In-memory entity store.
///
/// Ids are allocated sequentially from 1 and never reused, like SQLite's
/// `AUTOINCREMENT`.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(RepositoryError::Conflict { field: "email" });
        }

        tables.last_user_id += 1;
        let timestamp = now();
        let user = User {
            id: UserId(tables.last_user_id),
            name: user.name,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            created_at: timestamp,
            updated_at: timestamp,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Ok(false);
        }
        if tables.email_taken(&user.email, Some(user.id)) {
            return Err(RepositoryError::Conflict { field: "email" });
        }
        tables.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn delete_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.remove(&id))
    }

    async fn insert_bug(&self, created_by: UserId, bug: NewBug) -> Result<Bug, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.last_bug_id += 1;
        let timestamp = now();
        let bug = Bug {
            id: BugId(tables.last_bug_id),
            title: bug.title,
            description: bug.description,
            priority: bug.priority,
            status: BugStatus::Open,
            created_by,
            assigned_to: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        tables.bugs.insert(bug.id, bug.clone());
        Ok(bug)
    }

    async fn get_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.bugs.get(&id).cloned())
    }

    async fn update_bug(&self, bug: &Bug) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.bugs.get_mut(&bug.id) else {
            return Ok(false);
        };
        if !bug.assignment_consistent() {
            return Err(RepositoryError::storage(
                "update_bug",
                format!(
                    "bug {} is {} with assignee {:?}",
                    bug.id, bug.status, bug.assigned_to
                ),
            ));
        }
        *stored = bug.clone();
        Ok(true)
    }

    async fn delete_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let removed = tables.bugs.remove(&id);
        if removed.is_some() {
            tables.comments.retain(|_, c| c.bug_id != id);
        }
        Ok(removed)
    }

    async fn list_bugs(&self, filter: &BugFilter) -> Result<Vec<Bug>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .bugs
            .values()
            .filter(|bug| filter.matches(bug))
            .cloned()
            .collect())
    }

    async fn unassign_bugs(&self, user: UserId) -> Result<Vec<BugId>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let timestamp = now();
        let mut changed = Vec::new();
        for bug in tables.bugs.values_mut() {
            if bug.assigned_to == Some(user) {
                bug.assigned_to = None;
                bug.status = BugStatus::Open;
                bug.updated_at = timestamp;
                changed.push(bug.id);
            }
        }
        Ok(changed)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.bugs.contains_key(&comment.bug_id) {
            return Err(RepositoryError::storage(
                "insert_comment",
                format!("bug {} does not exist", comment.bug_id),
            ));
        }

        tables.last_comment_id += 1;
        let comment = Comment {
            id: CommentId(tables.last_comment_id),
            bug_id: comment.bug_id,
            user_id: comment.user_id,
            text: comment.text,
            created_at: now(),
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.comments.get(&id).cloned())
    }

    async fn list_comments(&self, bug: BugId) -> Result<Vec<Comment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .values()
            .filter(|c| c.bug_id == bug)
            .cloned()
            .collect())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.comments.remove(&id))
    }
}
