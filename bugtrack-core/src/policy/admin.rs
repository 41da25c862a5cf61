//! Admins oversee every bug and user.

use super::{Action, Condition, Rule};
use crate::model::{BugField, FieldMask};

const REPORT_FIELDS: FieldMask =
    FieldMask::of(&[BugField::Title, BugField::Description, BugField::Priority]);

pub const RULES: &[Rule] = &[
    Rule::with_mask(Action::CreateBug, Condition::Always, REPORT_FIELDS),
    Rule::with_mask(Action::UpdateBug, Condition::Always, FieldMask::ALL),
    Rule::new(Action::DeleteBug, Condition::Always),
    Rule::new(Action::ViewBug, Condition::Always),
    Rule::new(Action::ListBugs, Condition::Always),
    Rule::new(Action::CreateComment, Condition::Always),
    Rule::new(Action::DeleteComment, Condition::Always),
    Rule::new(Action::ListUsers, Condition::Always),
    Rule::new(Action::ViewUser, Condition::Always),
    Rule::new(Action::UpdateUser, Condition::Always),
    // Deleting yourself would leave nobody able to manage users.
    Rule::new(Action::DeleteUser, Condition::OtherUser),
];
