//! Authorization policy.
//!
//! Each role owns a static table of [`Rule`]s (one module per role). A rule
//! grants an [`Action`] when its [`Condition`] holds for the actor and the
//! target, and carries the field mask the actor may write. [`authorize`] is
//! the only evaluator; nothing else in the crate branches on roles.

mod admin;
mod developer;
mod tester;

use crate::error::CoreError;
use crate::model::{Actor, Bug, BugStatus, Caller, Comment, FieldMask, Role, UserId};
use crate::repository::BugFilter;

/// Something a caller may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateBug,
    UpdateBug,
    DeleteBug,
    ViewBug,
    ListBugs,
    CreateComment,
    DeleteComment,
    ListUsers,
    ViewUser,
    UpdateUser,
    DeleteUser,
}

/// What the action is applied to.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    None,
    Bug(&'a Bug),
    Comment(&'a Comment),
    User(UserId),
}

/// Relationship between actor and target that a rule requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// Actor created the target bug.
    BugCreator,
    /// Actor created the target bug and it is still open.
    BugCreatorWhileOpen,
    /// Actor is the target bug's assignee.
    BugAssignee,
    /// Actor wrote the target comment.
    CommentAuthor,
    /// Target user is the actor.
    SameUser,
    /// Target user is anyone but the actor.
    OtherUser,
}

impl Condition {
    pub fn holds(&self, actor: &Actor, target: &Target<'_>) -> bool {
        match (self, target) {
            (Self::Always, _) => true,
            (Self::BugCreator, Target::Bug(bug)) => bug.created_by == actor.id,
            (Self::BugCreatorWhileOpen, Target::Bug(bug)) => {
                bug.created_by == actor.id && bug.status == BugStatus::Open
            }
            (Self::BugAssignee, Target::Bug(bug)) => bug.assigned_to == Some(actor.id),
            (Self::CommentAuthor, Target::Comment(comment)) => comment.user_id == actor.id,
            (Self::SameUser, Target::User(id)) => *id == actor.id,
            (Self::OtherUser, Target::User(id)) => *id != actor.id,
            _ => false,
        }
    }
}

/// One row of a role's policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub action: Action,
    pub condition: Condition,
    pub mask: FieldMask,
}

impl Rule {
    pub const fn new(action: Action, condition: Condition) -> Self {
        Self {
            action,
            condition,
            mask: FieldMask::EMPTY,
        }
    }

    pub const fn with_mask(action: Action, condition: Condition, mask: FieldMask) -> Self {
        Self {
            action,
            condition,
            mask,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow { mask: FieldMask },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Convert into the mask on success, or the matching `CoreError`.
    pub fn into_result(self) -> Result<FieldMask, CoreError> {
        match self {
            Self::Allow { mask } => Ok(mask),
            Self::Deny(DenyReason::Unauthenticated) => Err(CoreError::Unauthenticated),
            Self::Deny(DenyReason::Forbidden) => Err(CoreError::Forbidden),
        }
    }
}

/// The policy table for a role.
pub fn rules_for(role: Role) -> &'static [Rule] {
    match role {
        Role::Admin => admin::RULES,
        Role::Developer => developer::RULES,
        Role::Tester => tester::RULES,
    }
}

/// Decide whether `caller` may perform `action` on `target`.
///
/// The first matching rule wins. Anonymous callers are always denied with
/// `Unauthenticated`; an authenticated caller with no matching rule gets
/// `Forbidden`.
pub fn authorize(caller: &Caller, action: Action, target: Target<'_>) -> Decision {
    let Some(actor) = caller.actor() else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };

    rules_for(actor.role)
        .iter()
        .filter(|rule| rule.action == action)
        .find(|rule| rule.condition.holds(actor, &target))
        .map_or(Decision::Deny(DenyReason::Forbidden), |rule| {
            Decision::Allow { mask: rule.mask }
        })
}

/// The bugs `actor` may see, derived from its `ViewBug` rule so that listing
/// and viewing can never disagree. `None` when the role may see no bug.
pub fn visible_bugs(actor: &Actor) -> Option<BugFilter> {
    let condition = rules_for(actor.role)
        .iter()
        .find(|rule| rule.action == Action::ViewBug)
        .map(|rule| rule.condition);

    match condition {
        Some(Condition::Always) => Some(BugFilter::all()),
        Some(Condition::BugCreator | Condition::BugCreatorWhileOpen) => {
            Some(BugFilter::created_by(actor.id))
        }
        Some(Condition::BugAssignee) => Some(BugFilter::assigned_to(actor.id)),
        _ => None,
    }
}
