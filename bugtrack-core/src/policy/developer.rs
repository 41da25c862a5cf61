//! Developers work the bugs assigned to them.

use super::{Action, Condition, Rule};
use crate::model::{BugField, FieldMask};

const ASSIGNEE_FIELDS: FieldMask = FieldMask::of(&[BugField::Status]);

pub const RULES: &[Rule] = &[
    Rule::with_mask(Action::UpdateBug, Condition::BugAssignee, ASSIGNEE_FIELDS),
    Rule::new(Action::ViewBug, Condition::BugAssignee),
    Rule::new(Action::ListBugs, Condition::Always),
    Rule::new(Action::CreateComment, Condition::Always),
    Rule::new(Action::DeleteComment, Condition::CommentAuthor),
    Rule::new(Action::ViewUser, Condition::SameUser),
    Rule::new(Action::UpdateUser, Condition::SameUser),
];
