//! Per-status bug counts, the dashboard view of the tracker.

use serde::Serialize;

use crate::model::{Bug, BugStatus};

/// Counts over the bugs a caller can see.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BugSummary {
    pub total: usize,
    pub open: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub fixed: usize,
    pub reopened: usize,
    pub closed: usize,
    /// Bugs without an assignee, i.e. waiting for triage.
    pub unassigned: usize,
    /// Bugs that still need work: everything not closed.
    pub active: usize,
}

impl BugSummary {
    pub fn from_bugs<'a>(bugs: impl IntoIterator<Item = &'a Bug>) -> Self {
        let mut summary = Self::default();

        for bug in bugs {
            summary.total += 1;
            if bug.status != BugStatus::Closed {
                summary.active += 1;
            }
            if bug.assigned_to.is_none() {
                summary.unassigned += 1;
            }
            match bug.status {
                BugStatus::Open => summary.open += 1,
                BugStatus::Assigned => summary.assigned += 1,
                BugStatus::InProgress => summary.in_progress += 1,
                BugStatus::Fixed => summary.fixed += 1,
                BugStatus::Reopened => summary.reopened += 1,
                BugStatus::Closed => summary.closed += 1,
            }
        }

        summary
    }
}
