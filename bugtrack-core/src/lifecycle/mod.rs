//! Bug lifecycle state machine.
//!
//! A pure function decides the status and assignee a bug ends up with after
//! an update. The caller has already been authorized and its patch restricted
//! to its field mask; this module only answers "is the resulting state legal".
//!
//! Assignment wins over an explicit status in the same request: assigning a
//! developer forces `assigned`, unassigning forces `open`.

mod table;

pub use table::{is_permitted, next_statuses, TransitionRule, TRANSITIONS};

use thiserror::Error;

use crate::model::{Bug, BugStatus, Role, UserId};

/// A status change that the transition table (or the assignment invariant)
/// does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BugStatus,
    pub to: BugStatus,
}

/// Status and assignee after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionResult {
    pub status: BugStatus,
    pub assigned_to: Option<UserId>,
}

impl TransitionResult {
    pub fn no_change(bug: &Bug) -> Self {
        Self {
            status: bug.status,
            assigned_to: bug.assigned_to,
        }
    }

    pub fn status_changed(&self, bug: &Bug) -> bool {
        self.status != bug.status
    }

    pub fn assignee_changed(&self, bug: &Bug) -> bool {
        self.assigned_to != bug.assigned_to
    }
}

/// Compute the status and assignee that `role` ends up with when requesting
/// `status` and/or `assignment` on `bug`.
///
/// `assignment` follows `BugPatch::assigned_to`: `None` leaves the assignee
/// alone, `Some(None)` unassigns, `Some(Some(id))` assigns.
pub fn resolve(
    role: Role,
    bug: &Bug,
    status: Option<BugStatus>,
    assignment: Option<Option<UserId>>,
) -> Result<TransitionResult, InvalidTransition> {
    let next = match (assignment, status) {
        (Some(Some(assignee)), _) => TransitionResult {
            status: BugStatus::Assigned,
            assigned_to: Some(assignee),
        },
        (Some(None), _) => TransitionResult {
            status: BugStatus::Open,
            assigned_to: None,
        },
        (None, Some(status)) => TransitionResult {
            status,
            assigned_to: bug.assigned_to,
        },
        (None, None) => return Ok(TransitionResult::no_change(bug)),
    };

    let invalid = InvalidTransition {
        from: bug.status,
        to: next.status,
    };

    if !is_permitted(role, bug.status, next.status) {
        return Err(invalid);
    }

    // Even the admin override cannot produce an open-but-assigned or
    // unassigned-but-progressing bug.
    if next.assigned_to.is_some() != next.status.requires_assignee() {
        return Err(invalid);
    }

    Ok(next)
}

/// Statuses `role` can move `bug` to with a status-only request.
///
/// Narrower than [`next_statuses`] for admins: targets that would break the
/// assignment invariant are left out.
pub fn available_statuses(role: Role, bug: &Bug) -> Vec<BugStatus> {
    next_statuses(role, bug.status)
        .into_iter()
        .filter(|status| resolve(role, bug, Some(*status), None).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, BugId, Priority};
    use proptest::prelude::*;

    fn bug(status: BugStatus, assigned_to: Option<u64>) -> Bug {
        Bug {
            id: BugId(1),
            title: "Crash on save".to_string(),
            description: "Stack trace attached".to_string(),
            priority: Priority::High,
            status,
            created_by: UserId(10),
            assigned_to: assigned_to.map(UserId),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_assignment_forces_assigned() {
        let open = bug(BugStatus::Open, None);
        let result = resolve(Role::Admin, &open, None, Some(Some(UserId(20)))).unwrap();
        assert_eq!(result.status, BugStatus::Assigned);
        assert_eq!(result.assigned_to, Some(UserId(20)));
    }

    #[test]
    fn test_assignment_beats_explicit_status() {
        let open = bug(BugStatus::Open, None);
        let result = resolve(
            Role::Admin,
            &open,
            Some(BugStatus::Closed),
            Some(Some(UserId(20))),
        )
        .unwrap();
        assert_eq!(result.status, BugStatus::Assigned);
    }

    #[test]
    fn test_unassignment_forces_open() {
        let fixed = bug(BugStatus::Fixed, Some(20));
        let result = resolve(Role::Admin, &fixed, Some(BugStatus::Closed), Some(None)).unwrap();
        assert_eq!(result.status, BugStatus::Open);
        assert_eq!(result.assigned_to, None);
    }

    #[test]
    fn test_reassignment_restarts_at_assigned() {
        let in_progress = bug(BugStatus::InProgress, Some(20));
        let result = resolve(Role::Admin, &in_progress, None, Some(Some(UserId(21)))).unwrap();
        assert_eq!(result.status, BugStatus::Assigned);
        assert_eq!(result.assigned_to, Some(UserId(21)));
    }

    #[test]
    fn test_developer_cannot_skip_to_closed() {
        let in_progress = bug(BugStatus::InProgress, Some(20));
        let err = resolve(Role::Developer, &in_progress, Some(BugStatus::Closed), None).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: BugStatus::InProgress,
                to: BugStatus::Closed
            }
        );
    }

    #[test]
    fn test_tester_cannot_close_open_bug() {
        let open = bug(BugStatus::Open, None);
        assert!(resolve(Role::Tester, &open, Some(BugStatus::Closed), None).is_err());
    }

    #[test]
    fn test_admin_cannot_progress_unassigned_bug() {
        let open = bug(BugStatus::Open, None);
        let err = resolve(Role::Admin, &open, Some(BugStatus::InProgress), None).unwrap_err();
        assert_eq!(err.to, BugStatus::InProgress);
    }

    #[test]
    fn test_admin_cannot_reopen_to_open_while_assigned() {
        let closed = bug(BugStatus::Closed, Some(20));
        assert!(resolve(Role::Admin, &closed, Some(BugStatus::Open), None).is_err());
    }

    #[test]
    fn test_admin_override_between_assigned_states() {
        let closed = bug(BugStatus::Closed, Some(20));
        let result = resolve(Role::Admin, &closed, Some(BugStatus::InProgress), None).unwrap();
        assert_eq!(result.status, BugStatus::InProgress);
        assert_eq!(result.assigned_to, Some(UserId(20)));
    }

    #[test]
    fn test_same_status_is_noop() {
        let fixed = bug(BugStatus::Fixed, Some(20));
        let result = resolve(Role::Developer, &fixed, Some(BugStatus::Fixed), None).unwrap();
        assert!(!result.status_changed(&fixed));
        assert!(!result.assignee_changed(&fixed));
    }

    #[test]
    fn test_empty_request_is_noop() {
        let assigned = bug(BugStatus::Assigned, Some(20));
        assert_eq!(
            resolve(Role::Tester, &assigned, None, None).unwrap(),
            TransitionResult::no_change(&assigned)
        );
    }

    #[test]
    fn test_available_statuses_by_role() {
        let assigned = bug(BugStatus::Assigned, Some(20));
        assert_eq!(
            available_statuses(Role::Developer, &assigned),
            vec![BugStatus::InProgress]
        );
        assert!(available_statuses(Role::Tester, &assigned).is_empty());
        assert_eq!(
            available_statuses(Role::Admin, &assigned),
            vec![
                BugStatus::InProgress,
                BugStatus::Fixed,
                BugStatus::Reopened,
                BugStatus::Closed
            ]
        );

        let fixed = bug(BugStatus::Fixed, Some(20));
        assert_eq!(
            available_statuses(Role::Tester, &fixed),
            vec![BugStatus::Reopened, BugStatus::Closed]
        );
    }

    #[test]
    fn test_open_bug_needs_assignment_first() {
        let open = bug(BugStatus::Open, None);
        for role in Role::ALL {
            assert!(available_statuses(role, &open).is_empty());
        }
    }

    // =========================================================================
    // Property Tests
    // =========================================================================

    fn arb_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn arb_status() -> impl Strategy<Value = BugStatus> {
        prop::sample::select(BugStatus::ALL.to_vec())
    }

    /// Bugs that already satisfy the assignment invariant.
    fn arb_consistent_bug() -> impl Strategy<Value = Bug> {
        (arb_status(), 1u64..50).prop_map(|(status, assignee)| {
            if status.requires_assignee() {
                bug(status, Some(assignee))
            } else {
                bug(status, None)
            }
        })
    }

    fn arb_assignment() -> impl Strategy<Value = Option<Option<UserId>>> {
        prop_oneof![
            Just(None),
            Just(Some(None)),
            (1u64..50).prop_map(|id| Some(Some(UserId(id)))),
        ]
    }

    proptest! {
        /// Property: every successful resolution keeps assigned_to == null <=> status == open.
        #[test]
        fn resolution_preserves_assignment_invariant(
            role in arb_role(),
            bug in arb_consistent_bug(),
            status in proptest::option::of(arb_status()),
            assignment in arb_assignment(),
        ) {
            if let Ok(result) = resolve(role, &bug, status, assignment) {
                prop_assert_eq!(
                    result.assigned_to.is_some(),
                    result.status.requires_assignee()
                );
            }
        }

        /// Property: non-admins only ever take edges listed in the table.
        #[test]
        fn non_admin_changes_follow_table(
            role in prop::sample::select(vec![Role::Developer, Role::Tester]),
            bug in arb_consistent_bug(),
            status in arb_status(),
        ) {
            if let Ok(result) = resolve(role, &bug, Some(status), None) {
                if result.status_changed(&bug) {
                    let listed = TRANSITIONS.iter().any(|rule| {
                        rule.from == bug.status && rule.to == result.status && rule.by.contains(&role)
                    });
                    prop_assert!(listed);
                }
            }
        }

        /// Property: a status-only request never touches the assignee.
        #[test]
        fn status_request_keeps_assignee(
            role in arb_role(),
            bug in arb_consistent_bug(),
            status in arb_status(),
        ) {
            if let Ok(result) = resolve(role, &bug, Some(status), None) {
                prop_assert_eq!(result.assigned_to, bug.assigned_to);
            }
        }
    }
}
