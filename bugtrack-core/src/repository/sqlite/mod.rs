//! SQLite implementation of `Repository`.
//!
//! This provides persistent storage that survives restarts of the CLI.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Row Mapping
//!
//! Enums are stored by their wire names and timestamps as unix milliseconds.
//! A row that does not map back to an entity is reported as corruption rather
//! than skipped.

mod bugs;
mod comments;
mod users;


use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{BugFilter, Repository, RepositoryError};
use crate::model::{
    now, Bug, BugId, Comment, CommentId, NewBug, NewComment, NewUser, User, UserId,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed entity store.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime. All access is serialized on a single
/// connection.
pub struct SqliteRepository {
    /// Exposed as `pub(crate)` so tests can corrupt rows directly.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for crash safety
    /// - `synchronous = FULL` so committed writes survive power loss
    /// - `busy_timeout = 5000ms` to wait out another process holding the lock
    /// - `foreign_keys = ON` so comments follow their bug on delete
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // The store holds password hashes.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite silently keeps DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 means a fresh database.
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;
        debug!(
            "Opened SQLite store at {} (schema v{})",
            path_str, CURRENT_SCHEMA_VERSION
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1.
        // Users are weak references from bugs and comments, so those columns
        // carry no foreign key; comments belong to their bug.
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    role TEXT NOT NULL CHECK (role IN ('admin', 'developer', 'tester')),
                    password_hash TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS bugs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    priority TEXT NOT NULL CHECK (priority IN ('Low', 'Medium', 'High')),
                    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN
                        ('open', 'assigned', 'in_progress', 'fixed', 'reopened', 'closed')),
                    created_by INTEGER NOT NULL,
                    assigned_to INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    CHECK ((assigned_to IS NULL) = (status = 'open'))
                );

                CREATE INDEX IF NOT EXISTS idx_bugs_created_by ON bugs(created_by);
                CREATE INDEX IF NOT EXISTS idx_bugs_assigned_to
                    ON bugs(assigned_to) WHERE assigned_to IS NOT NULL;

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    bug_id INTEGER NOT NULL REFERENCES bugs(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL,
                    comment TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_comments_bug ON comments(bug_id, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

/// Map a rusqlite error for `operation` into a storage error.
pub(super) fn storage(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| RepositoryError::storage(operation, e.to_string())
}

/// Whether `err` is a UNIQUE constraint violation.
pub(super) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Convert an id to i64 for SQLite storage.
///
/// Returns an error if the id exceeds i64::MAX, which would cause silent
/// overflow with `as i64`.
pub(super) fn id_to_i64(id: u64, operation: &'static str) -> Result<i64, RepositoryError> {
    i64::try_from(id).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!("id {} exceeds maximum storable value ({})", id, i64::MAX),
        )
    })
}

/// Key for a lookup by id. `None` means no row can carry this id, so the
/// lookup finds nothing.
pub(super) fn lookup_key(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

/// Convert an i64 from SQLite back to an id.
///
/// A negative value can only come from a corrupted database.
pub(super) fn i64_to_id(value: i64, what: &'static str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::corruption(what))
}

pub(super) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(super) fn from_millis(value: i64, what: &'static str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| RepositoryError::corruption(what))
}

// =============================================================================
// Repository trait implementation
// =============================================================================

#[async_trait]
impl Repository for SqliteRepository {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let timestamp = to_millis(now());
        self.with_conn("insert_user", move |conn| {
            users::insert_user_sync(conn, &user, timestamp)
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("get_user", move |conn| users::get_user_sync(conn, id))
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.to_string();
        self.with_conn("find_user_by_email", move |conn| {
            users::find_user_by_email_sync(conn, &email)
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.with_conn("list_users", users::list_users_sync).await
    }

    async fn update_user(&self, user: &User) -> Result<bool, RepositoryError> {
        let user = user.clone();
        self.with_conn("update_user", move |conn| users::update_user_sync(conn, &user))
            .await
    }

    async fn delete_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("delete_user", move |conn| users::delete_user_sync(conn, id))
            .await
    }

    async fn insert_bug(&self, created_by: UserId, bug: NewBug) -> Result<Bug, RepositoryError> {
        let created_by = id_to_i64(created_by.0, "insert_bug")?;
        let timestamp = to_millis(now());
        self.with_conn("insert_bug", move |conn| {
            bugs::insert_bug_sync(conn, created_by, &bug, timestamp)
        })
        .await
    }

    async fn get_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("get_bug", move |conn| bugs::get_bug_sync(conn, id))
            .await
    }

    async fn update_bug(&self, bug: &Bug) -> Result<bool, RepositoryError> {
        let bug = bug.clone();
        self.with_conn("update_bug", move |conn| bugs::update_bug_sync(conn, &bug))
            .await
    }

    async fn delete_bug(&self, id: BugId) -> Result<Option<Bug>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("delete_bug", move |conn| bugs::delete_bug_sync(conn, id))
            .await
    }

    async fn list_bugs(&self, filter: &BugFilter) -> Result<Vec<Bug>, RepositoryError> {
        let filter = *filter;
        self.with_conn("list_bugs", move |conn| bugs::list_bugs_sync(conn, &filter))
            .await
    }

    async fn unassign_bugs(&self, user: UserId) -> Result<Vec<BugId>, RepositoryError> {
        let Some(user) = lookup_key(user.0) else {
            return Ok(Vec::new());
        };
        let timestamp = to_millis(now());
        self.with_conn("unassign_bugs", move |conn| {
            bugs::unassign_bugs_sync(conn, user, timestamp)
        })
        .await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let timestamp = to_millis(now());
        self.with_conn("insert_comment", move |conn| {
            comments::insert_comment_sync(conn, &comment, timestamp)
        })
        .await
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("get_comment", move |conn| comments::get_comment_sync(conn, id))
            .await
    }

    async fn list_comments(&self, bug: BugId) -> Result<Vec<Comment>, RepositoryError> {
        let Some(bug) = lookup_key(bug.0) else {
            return Ok(Vec::new());
        };
        self.with_conn("list_comments", move |conn| {
            comments::list_comments_sync(conn, bug)
        })
        .await
    }

    async fn delete_comment(&self, id: CommentId) -> Result<Option<Comment>, RepositoryError> {
        let Some(id) = lookup_key(id.0) else {
            return Ok(None);
        };
        self.with_conn("delete_comment", move |conn| {
            comments::delete_comment_sync(conn, id)
        })
        .await
    }
}
