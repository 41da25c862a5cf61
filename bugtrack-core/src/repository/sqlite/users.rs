//! User table operations for the SQLite repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::RepositoryError;
use super::{from_millis, i64_to_id, is_unique_violation, lookup_key, storage, to_millis};
use crate::model::{NewUser, Role, User, UserId};

const USER_COLUMNS: &str = "id, name, email, role, password_hash, created_at, updated_at";

/// Raw `users` row before enum and timestamp decoding.
struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    created_at: i64,
    updated_at: i64,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            password_hash: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: UserId(i64_to_id(self.id, "user id")?),
            name: self.name,
            email: self.email,
            role: self
                .role
                .parse::<Role>()
                .map_err(|_| RepositoryError::corruption("user role"))?,
            password_hash: self.password_hash,
            created_at: from_millis(self.created_at, "user created_at")?,
            updated_at: from_millis(self.updated_at, "user updated_at")?,
        })
    }
}

fn email_conflict(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| {
        if is_unique_violation(&e) {
            RepositoryError::Conflict { field: "email" }
        } else {
            RepositoryError::storage(operation, e.to_string())
        }
    }
}

pub(super) fn insert_user_sync(
    conn: &Connection,
    user: &NewUser,
    now_millis: i64,
) -> Result<User, RepositoryError> {
    conn.query_row(
        &format!(
            "INSERT INTO users (name, email, role, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING {USER_COLUMNS}"
        ),
        params![
            user.name,
            user.email,
            user.role.as_str(),
            user.password_hash,
            now_millis
        ],
        UserRow::from_row,
    )
    .map_err(email_conflict("insert_user"))?
    .into_user()
}

pub(super) fn get_user_sync(conn: &Connection, id: i64) -> Result<Option<User>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        UserRow::from_row,
    )
    .optional()
    .map_err(storage("get_user"))?
    .map(UserRow::into_user)
    .transpose()
}

pub(super) fn find_user_by_email_sync(
    conn: &Connection,
    email: &str,
) -> Result<Option<User>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        UserRow::from_row,
    )
    .optional()
    .map_err(storage("find_user_by_email"))?
    .map(UserRow::into_user)
    .transpose()
}

pub(super) fn list_users_sync(conn: &Connection) -> Result<Vec<User>, RepositoryError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
        .map_err(storage("list_users"))?;

    let rows = stmt
        .query_map([], UserRow::from_row)
        .map_err(storage("list_users"))?;

    let users = rows
        .map(|row| row.map_err(storage("list_users row"))?.into_user())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub(super) fn update_user_sync(conn: &Connection, user: &User) -> Result<bool, RepositoryError> {
    let Some(id) = lookup_key(user.id.0) else {
        return Ok(false);
    };
    let changed = conn
        .execute(
            "UPDATE users SET name = ?2, email = ?3, role = ?4, password_hash = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                user.name,
                user.email,
                user.role.as_str(),
                user.password_hash,
                to_millis(user.updated_at)
            ],
        )
        .map_err(email_conflict("update_user"))?;
    Ok(changed > 0)
}

pub(super) fn delete_user_sync(conn: &Connection, id: i64) -> Result<Option<User>, RepositoryError> {
    conn.query_row(
        &format!("DELETE FROM users WHERE id = ?1 RETURNING {USER_COLUMNS}"),
        params![id],
        UserRow::from_row,
    )
    .optional()
    .map_err(storage("delete_user"))?
    .map(UserRow::into_user)
    .transpose()
}
