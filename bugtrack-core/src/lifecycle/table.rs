//! The bug status transition table.

use crate::model::{BugStatus, Role};

/// One legal `from -> to` edge and the roles that may take it.
///
/// For testers the policy has already established that the actor created
/// the bug; for developers that the actor is the assignee. The table only
/// needs the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: BugStatus,
    pub to: BugStatus,
    pub by: &'static [Role],
}

const ADMIN: &[Role] = &[Role::Admin];
const ASSIGNEE: &[Role] = &[Role::Developer, Role::Admin];
const CREATOR: &[Role] = &[Role::Tester, Role::Admin];

/// Every non-override transition. Admins may additionally move between any
/// two states (see [`is_permitted`]).
pub const TRANSITIONS: &[TransitionRule] = &[
    // Only reachable through assignment.
    TransitionRule {
        from: BugStatus::Open,
        to: BugStatus::Assigned,
        by: ADMIN,
    },
    TransitionRule {
        from: BugStatus::Assigned,
        to: BugStatus::InProgress,
        by: ASSIGNEE,
    },
    TransitionRule {
        from: BugStatus::InProgress,
        to: BugStatus::Fixed,
        by: ASSIGNEE,
    },
    TransitionRule {
        from: BugStatus::Fixed,
        to: BugStatus::Closed,
        by: CREATOR,
    },
    TransitionRule {
        from: BugStatus::Fixed,
        to: BugStatus::Reopened,
        by: CREATOR,
    },
    TransitionRule {
        from: BugStatus::Closed,
        to: BugStatus::Reopened,
        by: CREATOR,
    },
    TransitionRule {
        from: BugStatus::Reopened,
        to: BugStatus::InProgress,
        by: ASSIGNEE,
    },
];

/// Whether `role` may move a bug from `from` to `to`.
///
/// Staying in the same status is not a transition and is always permitted.
pub fn is_permitted(role: Role, from: BugStatus, to: BugStatus) -> bool {
    if from == to || role == Role::Admin {
        return true;
    }
    TRANSITIONS
        .iter()
        .any(|rule| rule.from == from && rule.to == to && rule.by.contains(&role))
}

/// Statuses `role` may move a bug to from `from`, excluding `from` itself.
pub fn next_statuses(role: Role, from: BugStatus) -> Vec<BugStatus> {
    BugStatus::ALL
        .into_iter()
        .filter(|to| *to != from && is_permitted(role, from, *to))
        .collect()
}
