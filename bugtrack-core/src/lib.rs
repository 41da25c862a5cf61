//! Core of a role-based bug tracker.
//!
//! Testers report bugs, developers work the bugs assigned to them and admins
//! oversee users and every bug. Each request is checked against three axes:
//! the caller's role, the caller's relationship to the bug (creator or
//! assignee) and the bug's current status.
//!
//! - [`policy`] decides who may do what and which fields they may write.
//! - [`lifecycle`] decides which status changes are legal.
//! - [`repository`] stores users, bugs and comments.
//! - [`BugTracker`] combines the three for each use case.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod policy;
pub mod repository;
pub mod service;
pub mod summary;

pub use config::Config;
pub use error::{CoreError, ParseEnumError};
pub use model::{
    Actor, Bug, BugField, BugId, BugPatch, BugStatus, Caller, Comment, CommentId, FieldMask,
    NewBug, NewUser, Priority, Role, User, UserId, UserPatch,
};
pub use repository::{BugFilter, InMemoryRepository, Repository, RepositoryError, SqliteRepository};
pub use service::{
    BugDetails, BugTracker, BugView, CommentView, UpdateOutcome, UserRemoval, UserSummary,
};
pub use summary::BugSummary;
