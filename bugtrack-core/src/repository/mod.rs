//! Entity store abstraction.
//!
//! The `Repository` trait covers create, find, update and delete by id for
//! users, bugs and comments, plus filtered bug listing. Two backends ship with
//! the crate: [`InMemoryRepository`] for tests and short-lived processes, and
//! [`SqliteRepository`] for persistence across runs.
//!
//! Stores know nothing about roles or lifecycle rules. They do enforce the
//! constraints a database would: unique emails and comment ownership by bug.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    Bug, BugId, BugStatus, Comment, CommentId, NewBug, NewComment, NewUser, User, UserId,
};

/// Failure inside an entity store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backend failed while performing `operation`.
    #[error("storage error during {operation}: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },

    /// A stored row could not be turned back into an entity.
    #[error("corrupt {what} in storage")]
    Corruption { what: &'static str },

    /// A uniqueness constraint on `field` was violated.
    #[error("{field} already exists")]
    Conflict { field: &'static str },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            detail: detail.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }
}

/// Conjunctive filter over bugs. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BugFilter {
    pub created_by: Option<UserId>,
    pub assigned_to: Option<UserId>,
    pub status: Option<BugStatus>,
}

impl BugFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn created_by(user: UserId) -> Self {
        Self {
            created_by: Some(user),
            ..Self::default()
        }
    }

    pub fn assigned_to(user: UserId) -> Self {
        Self {
            assigned_to: Some(user),
            ..Self::default()
        }
    }

    pub fn with_status(self, status: Option<BugStatus>) -> Self {
        Self { status, ..self }
    }

    pub fn matches(&self, bug: &Bug) -> bool {
        self.created_by.map_or(true, |id| bug.created_by == id)
            && self.assigned_to.map_or(true, |id| bug.assigned_to == Some(id))
            && self.status.map_or(true, |status| bug.status == status)
    }
}

/// Storage backend for the bug tracker.
///
/// Every method is a single atomic step; the service composes them and
/// accepts last-write-wins between concurrent callers.
#[async_trait]
pub trait Repository: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user, assigning a fresh id. Fails with `Conflict { field: "email" }`
    /// when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// All users ordered by id.
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    /// Overwrite the stored user with the same id. Returns `false` if it no
    /// longer exists.
    async fn update_user(&self, user: &User) -> Result<bool, RepositoryError>;

    async fn delete_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    // =========================================================================
    // Bugs
    // =========================================================================

    /// Insert a bug owned by `created_by`. New bugs are always open and
    /// unassigned.
    async fn insert_bug(&self, created_by: UserId, bug: NewBug) -> Result<Bug, RepositoryError>;

    async fn get_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError>;

    /// Overwrite the stored bug with the same id. Returns `false` if it no
    /// longer exists. A bug whose assignee disagrees with its status is
    /// refused with a storage error.
    async fn update_bug(&self, bug: &Bug) -> Result<bool, RepositoryError>;

    /// Remove a bug together with its comments.
    async fn delete_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError>;

    /// Bugs matching `filter`, ordered by id.
    async fn list_bugs(&self, filter: &BugFilter) -> Result<Vec<Bug>, RepositoryError>;

    /// Reset every bug assigned to `user` to open and unassigned. Returns the
    /// ids of the bugs that changed.
    async fn unassign_bugs(&self, user: UserId) -> Result<Vec<BugId>, RepositoryError>;

    // =========================================================================
    // Comments
    // =========================================================================

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError>;

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError>;

    /// Comments on `bug`, oldest first.
    async fn list_comments(&self, bug: BugId) -> Result<Vec<Comment>, RepositoryError>;

    async fn delete_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError>;
}
