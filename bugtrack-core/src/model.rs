//! Domain types for users, bugs and comments.
//!
//! Statuses, roles and priorities are closed enums so an unknown value can
//! only exist as a `ParseEnumError` at the edge, never inside the core.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

use crate::error::ParseEnumError;

/// Current time truncated to milliseconds, the precision the stores keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// =============================================================================
// Identifiers
// =============================================================================

/// Newtype for user IDs to prevent mixing with bug or comment IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Newtype for bug IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BugId(pub u64);

impl fmt::Display for BugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BugId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<BugId> for u64 {
    fn from(id: BugId) -> Self {
        id.0
    }
}

/// Newtype for comment IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CommentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<CommentId> for u64 {
    fn from(id: CommentId) -> Self {
        id.0
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Role of a registered user. Drives every policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Developer,
    Tester,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Developer, Role::Tester];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Developer => "developer",
            Self::Tester => "tester",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                field: "role",
                value: s.to_string(),
            })
    }
}

/// Bug priority. Serialized in title case, as reporters enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                field: "priority",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a bug.
///
/// `Open` is the only status an unassigned bug may have; every other status
/// requires an assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Open,
    Assigned,
    InProgress,
    Fixed,
    Reopened,
    Closed,
}

impl BugStatus {
    pub const ALL: [BugStatus; 6] = [
        BugStatus::Open,
        BugStatus::Assigned,
        BugStatus::InProgress,
        BugStatus::Fixed,
        BugStatus::Reopened,
        BugStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Fixed => "fixed",
            Self::Reopened => "reopened",
            Self::Closed => "closed",
        }
    }

    /// Whether this status requires a non-null assignee.
    pub fn requires_assignee(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl Default for BugStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BugStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                field: "status",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Actors
// =============================================================================

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Whoever is calling into the core. Resolved by the shell, never read from
/// global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(Actor),
}

impl Caller {
    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Self::Anonymous => None,
            Self::User(actor) => Some(actor),
        }
    }
}

impl From<Actor> for Caller {
    fn from(actor: Actor) -> Self {
        Self::User(actor)
    }
}

impl From<Option<Actor>> for Caller {
    fn from(actor: Option<Actor>) -> Self {
        actor.map_or(Self::Anonymous, Self::User)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// Input for registering a user. The password arrives already hashed.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub role: Role,
    #[validate(length(min = 1, message = "is required"))]
    pub password_hash: String,
}

impl NewUser {
    pub(crate) fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            ..self
        }
    }
}

/// Profile edit. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct UserPatch {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
}

impl UserPatch {
    pub(crate) fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| n.trim().to_string()),
            email: self.email.map(|e| e.trim().to_string()),
        }
    }
}

/// A reported defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bug {
    pub id: BugId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: BugStatus,
    pub created_by: UserId,
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bug {
    /// `assigned_to` is null exactly when the status is `open`.
    pub fn assignment_consistent(&self) -> bool {
        self.assigned_to.is_some() == self.status.requires_assignee()
    }
}

/// Input for reporting a bug.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewBug {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "is required"))]
    pub description: String,
    pub priority: Priority,
}

impl NewBug {
    pub fn new(title: impl Into<String>, description: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
        }
    }

    pub(crate) fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            ..self
        }
    }
}

/// A comment attached to a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub bug_id: BugId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Input for posting a comment.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewComment {
    pub bug_id: BugId,
    pub user_id: UserId,
    #[validate(length(min = 1, message = "is required"))]
    pub text: String,
}

impl NewComment {
    pub(crate) fn normalized(self) -> Self {
        Self {
            text: self.text.trim().to_string(),
            ..self
        }
    }
}

// =============================================================================
// Field masks and patches
// =============================================================================

/// A bug field that an update may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugField {
    Title,
    Description,
    Priority,
    Status,
    AssignedTo,
}

impl BugField {
    pub const ALL: [BugField; 5] = [
        BugField::Title,
        BugField::Description,
        BugField::Priority,
        BugField::Status,
        BugField::AssignedTo,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Priority => "priority",
            Self::Status => "status",
            Self::AssignedTo => "assigned_to",
        }
    }
}

impl fmt::Display for BugField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of bug fields, small enough to live in a `const` policy table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldMask(u8);

impl FieldMask {
    pub const EMPTY: FieldMask = FieldMask(0);
    pub const ALL: FieldMask = FieldMask::of(&BugField::ALL);

    pub const fn of(fields: &[BugField]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < fields.len() {
            bits |= fields[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn contains(&self, field: BugField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: BugField) {
        self.0 |= field.bit();
    }

    pub const fn intersection(self, other: FieldMask) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn difference(self, other: FieldMask) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_subset(&self, other: FieldMask) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = BugField> + '_ {
        BugField::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl fmt::Debug for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for FieldMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Partial update of a bug.
///
/// `assigned_to` is doubly optional: `None` leaves the assignee alone,
/// `Some(None)` unassigns, `Some(Some(id))` assigns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct BugPatch {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    #[serde(default)]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "is required"))]
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<BugStatus>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub assigned_to: Option<Option<UserId>>,
}

/// Distinguishes an explicit `null` from an absent key.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl BugPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn status(mut self, status: BugStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assign(mut self, user: impl Into<UserId>) -> Self {
        self.assigned_to = Some(Some(user.into()));
        self
    }

    pub fn unassign(mut self) -> Self {
        self.assigned_to = Some(None);
        self
    }

    /// Fields this patch touches.
    pub fn fields(&self) -> FieldMask {
        let mut mask = FieldMask::EMPTY;
        if self.title.is_some() {
            mask.insert(BugField::Title);
        }
        if self.description.is_some() {
            mask.insert(BugField::Description);
        }
        if self.priority.is_some() {
            mask.insert(BugField::Priority);
        }
        if self.status.is_some() {
            mask.insert(BugField::Status);
        }
        if self.assigned_to.is_some() {
            mask.insert(BugField::AssignedTo);
        }
        mask
    }

    /// Drop every field outside `mask`.
    pub fn restrict(self, mask: FieldMask) -> Self {
        Self {
            title: self.title.filter(|_| mask.contains(BugField::Title)),
            description: self
                .description
                .filter(|_| mask.contains(BugField::Description)),
            priority: self.priority.filter(|_| mask.contains(BugField::Priority)),
            status: self.status.filter(|_| mask.contains(BugField::Status)),
            assigned_to: self
                .assigned_to
                .filter(|_| mask.contains(BugField::AssignedTo)),
        }
    }

    pub(crate) fn normalized(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            ..self
        }
    }
}
