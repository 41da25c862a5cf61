//! Comment use cases.

use tracing::info;
use validator::Validate;

use super::{require_actor, BugTracker, CommentView};
use crate::error::CoreError;
use crate::model::{BugId, Caller, Comment, CommentId, NewComment};
use crate::policy::{self, Action, Target};

impl BugTracker {
    /// Post a comment on an existing bug as the caller.
    pub async fn create_comment(
        &self,
        caller: &Caller,
        bug_id: BugId,
        text: impl Into<String>,
    ) -> Result<CommentView, CoreError> {
        let actor = require_actor(caller)?;
        let bug = self.load_bug(bug_id).await?;
        policy::authorize(caller, Action::CreateComment, Target::Bug(&bug)).into_result()?;

        let comment = NewComment {
            bug_id,
            user_id: actor.id,
            text: text.into(),
        }
        .normalized();
        comment.validate()?;

        let comment = self.repo.insert_comment(comment).await?;
        info!(
            "User {} commented on bug #{} (comment {})",
            actor.id, bug_id, comment.id
        );

        Ok(CommentView {
            author: self.summary_of(Some(actor.id)).await?,
            comment,
        })
    }

    /// Delete a comment. Authors may delete their own; admins any.
    pub async fn delete_comment(
        &self,
        caller: &Caller,
        id: CommentId,
    ) -> Result<Comment, CoreError> {
        let actor = require_actor(caller)?;
        let comment = self
            .repo
            .get_comment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("comment", id))?;
        policy::authorize(caller, Action::DeleteComment, Target::Comment(&comment))
            .into_result()?;

        let comment = self
            .repo
            .delete_comment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("comment", id))?;
        info!(
            "User {} deleted comment {} on bug #{}",
            actor.id, comment.id, comment.bug_id
        );
        Ok(comment)
    }
}
