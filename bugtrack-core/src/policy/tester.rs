//! Testers report bugs and shepherd their own reports to closure.

use super::{Action, Condition, Rule};
use crate::model::{BugField, FieldMask};

const REPORT_FIELDS: FieldMask =
    FieldMask::of(&[BugField::Title, BugField::Description, BugField::Priority]);

const CREATOR_FIELDS: FieldMask = FieldMask::of(&[
    BugField::Title,
    BugField::Description,
    BugField::Priority,
    BugField::Status,
]);

pub const RULES: &[Rule] = &[
    Rule::with_mask(Action::CreateBug, Condition::Always, REPORT_FIELDS),
    Rule::with_mask(Action::UpdateBug, Condition::BugCreator, CREATOR_FIELDS),
    Rule::new(Action::DeleteBug, Condition::BugCreatorWhileOpen),
    Rule::new(Action::ViewBug, Condition::BugCreator),
    Rule::new(Action::ListBugs, Condition::Always),
    Rule::new(Action::CreateComment, Condition::Always),
    Rule::new(Action::DeleteComment, Condition::CommentAuthor),
    Rule::new(Action::ViewUser, Condition::SameUser),
    Rule::new(Action::UpdateUser, Condition::SameUser),
];
