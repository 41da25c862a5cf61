//! Use-case orchestration.
//!
//! [`BugTracker`] wires the entity store, the authorization policy and the
//! lifecycle state machine together. Every public method takes the caller
//! explicitly, loads what it needs, asks the policy, and only then touches
//! the store. Operations are grouped by entity in the submodules.

mod bugs;
mod comments;
mod users;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{Actor, Bug, BugId, BugStatus, Caller, Comment, FieldMask, Role, User, UserId};
use crate::repository::Repository;

/// Public profile of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// A bug with its creator and assignee resolved.
///
/// Either side is `None` when the referenced user has since been deleted
/// (or, for the assignee, when the bug is unassigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugView {
    #[serde(flatten)]
    pub bug: Bug,
    pub creator: Option<UserSummary>,
    pub assignee: Option<UserSummary>,
}

/// A comment with its author resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserSummary>,
}

/// Everything shown on a bug's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugDetails {
    #[serde(flatten)]
    pub view: BugView,
    pub comments: Vec<CommentView>,
    /// Statuses the viewer may move the bug to next.
    pub next_statuses: Vec<BugStatus>,
}

/// Result of a successful `update_bug`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub bug: BugView,
    /// Requested fields the caller was allowed to write.
    pub applied: FieldMask,
    /// Requested fields outside the caller's mask, dropped silently.
    pub ignored: FieldMask,
}

/// Result of deleting a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRemoval {
    pub user: UserSummary,
    /// Bugs that were reset to open because the user was their assignee.
    pub unassigned_bugs: Vec<BugId>,
}

/// The bug tracker service.
#[derive(Clone)]
pub struct BugTracker {
    repo: Arc<dyn Repository>,
}

impl BugTracker {
    pub fn new(repo: impl Repository + 'static) -> Self {
        Self::with_repository(Arc::new(repo))
    }

    pub fn with_repository(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    async fn load_bug(&self, id: BugId) -> Result<Bug, CoreError> {
        self.repo
            .get_bug(id)
            .await?
            .ok_or_else(|| CoreError::not_found("bug", id))
    }

    async fn load_user(&self, id: UserId) -> Result<User, CoreError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    async fn summary_of(&self, id: Option<UserId>) -> Result<Option<UserSummary>, CoreError> {
        match id {
            Some(id) => Ok(self.repo.get_user(id).await?.as_ref().map(UserSummary::from)),
            None => Ok(None),
        }
    }

    /// Every user by id, for resolving many references at once.
    async fn user_index(&self) -> Result<HashMap<UserId, UserSummary>, CoreError> {
        Ok(self
            .repo
            .list_users()
            .await?
            .iter()
            .map(|user| (user.id, UserSummary::from(user)))
            .collect())
    }

    async fn bug_view(&self, bug: Bug) -> Result<BugView, CoreError> {
        let creator = self.summary_of(Some(bug.created_by)).await?;
        let assignee = self.summary_of(bug.assigned_to).await?;
        Ok(BugView {
            bug,
            creator,
            assignee,
        })
    }
}

fn require_actor(caller: &Caller) -> Result<Actor, CoreError> {
    caller.actor().copied().ok_or(CoreError::Unauthenticated)
}

fn view_from_index(bug: Bug, users: &HashMap<UserId, UserSummary>) -> BugView {
    let creator = users.get(&bug.created_by).cloned();
    let assignee = bug.assigned_to.and_then(|id| users.get(&id).cloned());
    BugView {
        bug,
        creator,
        assignee,
    }
}
