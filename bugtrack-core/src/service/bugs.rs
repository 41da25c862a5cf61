//! Bug use cases.

use tracing::{debug, info, warn};
use validator::Validate;

use super::{require_actor, view_from_index, BugDetails, BugTracker, BugView, CommentView, UpdateOutcome};
use crate::error::CoreError;
use crate::lifecycle;
use crate::model::{now, Bug, BugField, BugId, BugPatch, BugStatus, Caller, NewBug, Role, UserId};
use crate::policy::{self, Action, Decision, Target};
use crate::summary::BugSummary;

impl BugTracker {
    /// Report a new bug. The bug is owned by the caller, open and unassigned.
    pub async fn create_bug(&self, caller: &Caller, bug: NewBug) -> Result<BugView, CoreError> {
        let actor = require_actor(caller)?;
        policy::authorize(caller, Action::CreateBug, Target::None).into_result()?;

        let bug = bug.normalized();
        bug.validate()?;

        let bug = self.repo.insert_bug(actor.id, bug).await?;
        info!("User {} reported bug #{} ({})", actor.id, bug.id, bug.priority);
        self.bug_view(bug).await
    }

    /// Apply `patch` to a bug.
    ///
    /// Fields outside the caller's mask are dropped and reported back in
    /// [`UpdateOutcome::ignored`]. Status and assignee changes go through the
    /// lifecycle state machine; if it rejects them nothing is persisted.
    pub async fn update_bug(
        &self,
        caller: &Caller,
        id: BugId,
        patch: BugPatch,
    ) -> Result<UpdateOutcome, CoreError> {
        let actor = require_actor(caller)?;
        let mut bug = self.load_bug(id).await?;
        let mask = policy::authorize(caller, Action::UpdateBug, Target::Bug(&bug)).into_result()?;

        let requested = patch.fields();
        let ignored = requested.difference(mask);
        if !ignored.is_empty() {
            debug!(
                "Ignoring fields {:?} from user {} on bug #{}",
                ignored, actor.id, bug.id
            );
        }

        let patch = patch.restrict(mask).normalized();
        let applied = patch.fields();
        patch.validate()?;

        if let Some(Some(assignee)) = patch.assigned_to {
            self.require_developer(assignee).await?;
        }

        let next = lifecycle::resolve(actor.role, &bug, patch.status, patch.assigned_to)
            .map_err(|err| {
                warn!(
                    "User {} ({}) attempted {} -> {} on bug #{}",
                    actor.id, actor.role, err.from, err.to, bug.id
                );
                err
            })?;

        let mut changed = false;
        if let Some(title) = patch.title.filter(|t| *t != bug.title) {
            bug.title = title;
            changed = true;
        }
        if let Some(description) = patch.description.filter(|d| *d != bug.description) {
            bug.description = description;
            changed = true;
        }
        if let Some(priority) = patch.priority.filter(|p| *p != bug.priority) {
            bug.priority = priority;
            changed = true;
        }
        if next.status_changed(&bug) || next.assignee_changed(&bug) {
            info!(
                "Bug #{} moved {} -> {} by user {} (assignee {:?} -> {:?})",
                bug.id, bug.status, next.status, actor.id, bug.assigned_to, next.assigned_to
            );
            bug.status = next.status;
            bug.assigned_to = next.assigned_to;
            changed = true;
        }

        if changed {
            bug.updated_at = now();
            if !self.repo.update_bug(&bug).await? {
                return Err(CoreError::not_found("bug", bug.id));
            }
        }

        Ok(UpdateOutcome {
            bug: self.bug_view(bug).await?,
            applied,
            ignored,
        })
    }

    /// Delete a bug. Its comments go with it in the same store call.
    pub async fn delete_bug(&self, caller: &Caller, id: BugId) -> Result<Bug, CoreError> {
        let actor = require_actor(caller)?;
        let bug = self.load_bug(id).await?;
        policy::authorize(caller, Action::DeleteBug, Target::Bug(&bug)).into_result()?;

        let bug = self
            .repo
            .delete_bug(id)
            .await?
            .ok_or_else(|| CoreError::not_found("bug", id))?;

        info!("User {} deleted bug #{}", actor.id, bug.id);
        Ok(bug)
    }

    /// Bugs the caller may see, optionally narrowed to one status.
    pub async fn list_bugs(
        &self,
        caller: &Caller,
        status: Option<BugStatus>,
    ) -> Result<Vec<BugView>, CoreError> {
        let bugs = self.visible_bugs(caller, status).await?;
        let users = self.user_index().await?;
        Ok(bugs
            .into_iter()
            .map(|bug| view_from_index(bug, &users))
            .collect())
    }

    /// A single bug with its comments.
    pub async fn get_bug(&self, caller: &Caller, id: BugId) -> Result<BugDetails, CoreError> {
        let actor = require_actor(caller)?;
        let bug = self.load_bug(id).await?;
        policy::authorize(caller, Action::ViewBug, Target::Bug(&bug)).into_result()?;

        let next_statuses = match policy::authorize(caller, Action::UpdateBug, Target::Bug(&bug)) {
            Decision::Allow { mask } if mask.contains(BugField::Status) => {
                lifecycle::available_statuses(actor.role, &bug)
            }
            _ => Vec::new(),
        };

        let users = self.user_index().await?;
        let comments = self
            .repo
            .list_comments(id)
            .await?
            .into_iter()
            .map(|comment| CommentView {
                author: users.get(&comment.user_id).cloned(),
                comment,
            })
            .collect();

        Ok(BugDetails {
            view: view_from_index(bug, &users),
            comments,
            next_statuses,
        })
    }

    /// Per-status counts over the bugs the caller may see.
    pub async fn bug_summary(&self, caller: &Caller) -> Result<BugSummary, CoreError> {
        let bugs = self.visible_bugs(caller, None).await?;
        Ok(BugSummary::from_bugs(&bugs))
    }

    async fn visible_bugs(
        &self,
        caller: &Caller,
        status: Option<BugStatus>,
    ) -> Result<Vec<Bug>, CoreError> {
        let actor = require_actor(caller)?;
        policy::authorize(caller, Action::ListBugs, Target::None).into_result()?;

        match policy::visible_bugs(&actor) {
            Some(filter) => Ok(self.repo.list_bugs(&filter.with_status(status)).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Assignees must exist and be developers.
    async fn require_developer(&self, id: UserId) -> Result<(), CoreError> {
        let user = self.load_user(id).await?;
        if user.role != Role::Developer {
            return Err(CoreError::validation(
                BugField::AssignedTo.as_str(),
                format!("user {} is a {}, not a developer", user.id, user.role),
            ));
        }
        Ok(())
    }
}
