//! Bug table operations for the SQLite repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::{BugFilter, RepositoryError};
use super::{from_millis, i64_to_id, id_to_i64, lookup_key, storage, to_millis};
use crate::model::{Bug, BugId, BugStatus, NewBug, Priority, UserId};

const BUG_COLUMNS: &str =
    "id, title, description, priority, status, created_by, assigned_to, created_at, updated_at";

/// Raw `bugs` row before enum and timestamp decoding.
struct BugRow {
    id: i64,
    title: String,
    description: String,
    priority: String,
    status: String,
    created_by: i64,
    assigned_to: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl BugRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            priority: row.get(3)?,
            status: row.get(4)?,
            created_by: row.get(5)?,
            assigned_to: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_bug(self) -> Result<Bug, RepositoryError> {
        let assigned_to = match self.assigned_to {
            Some(id) => Some(UserId(i64_to_id(id, "bug assigned_to")?)),
            None => None,
        };

        Ok(Bug {
            id: BugId(i64_to_id(self.id, "bug id")?),
            title: self.title,
            description: self.description,
            priority: self
                .priority
                .parse::<Priority>()
                .map_err(|_| RepositoryError::corruption("bug priority"))?,
            status: self
                .status
                .parse::<BugStatus>()
                .map_err(|_| RepositoryError::corruption("bug status"))?,
            created_by: UserId(i64_to_id(self.created_by, "bug created_by")?),
            assigned_to,
            created_at: from_millis(self.created_at, "bug created_at")?,
            updated_at: from_millis(self.updated_at, "bug updated_at")?,
        })
    }
}

pub(super) fn insert_bug_sync(
    conn: &Connection,
    created_by: i64,
    bug: &NewBug,
    now_millis: i64,
) -> Result<Bug, RepositoryError> {
    conn.query_row(
        &format!(
            "INSERT INTO bugs (title, description, priority, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING {BUG_COLUMNS}"
        ),
        params![
            bug.title,
            bug.description,
            bug.priority.as_str(),
            created_by,
            now_millis
        ],
        BugRow::from_row,
    )
    .map_err(storage("insert_bug"))?
    .into_bug()
}

pub(super) fn get_bug_sync(conn: &Connection, id: i64) -> Result<Option<Bug>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {BUG_COLUMNS} FROM bugs WHERE id = ?1"),
        params![id],
        BugRow::from_row,
    )
    .optional()
    .map_err(storage("get_bug"))?
    .map(BugRow::into_bug)
    .transpose()
}

pub(super) fn update_bug_sync(conn: &Connection, bug: &Bug) -> Result<bool, RepositoryError> {
    let Some(id) = lookup_key(bug.id.0) else {
        return Ok(false);
    };
    let assigned_to = bug
        .assigned_to
        .map(|user| id_to_i64(user.0, "update_bug"))
        .transpose()?;

    // created_by and created_at are immutable and never written back.
    let changed = conn
        .execute(
            "UPDATE bugs SET title = ?2, description = ?3, priority = ?4, status = ?5,
                             assigned_to = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                bug.title,
                bug.description,
                bug.priority.as_str(),
                bug.status.as_str(),
                assigned_to,
                to_millis(bug.updated_at)
            ],
        )
        .map_err(storage("update_bug"))?;
    Ok(changed > 0)
}

pub(super) fn delete_bug_sync(conn: &Connection, id: i64) -> Result<Option<Bug>, RepositoryError> {
    conn.query_row(
        &format!("DELETE FROM bugs WHERE id = ?1 RETURNING {BUG_COLUMNS}"),
        params![id],
        BugRow::from_row,
    )
    .optional()
    .map_err(storage("delete_bug"))?
    .map(BugRow::into_bug)
    .transpose()
}

pub(super) fn list_bugs_sync(
    conn: &Connection,
    filter: &BugFilter,
) -> Result<Vec<Bug>, RepositoryError> {
    // A filter on an id no row can carry matches nothing.
    let created_by = match filter.created_by.map(|id| lookup_key(id.0)) {
        Some(None) => return Ok(Vec::new()),
        key => key.flatten(),
    };
    let assigned_to = match filter.assigned_to.map(|id| lookup_key(id.0)) {
        Some(None) => return Ok(Vec::new()),
        key => key.flatten(),
    };
    let status = filter.status.map(|s| s.as_str());

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BUG_COLUMNS} FROM bugs
             WHERE (?1 IS NULL OR created_by = ?1)
               AND (?2 IS NULL OR assigned_to = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY id"
        ))
        .map_err(storage("list_bugs"))?;

    let rows = stmt
        .query_map(params![created_by, assigned_to, status], BugRow::from_row)
        .map_err(storage("list_bugs"))?;

    let bugs = rows
        .map(|row| row.map_err(storage("list_bugs row"))?.into_bug())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bugs)
}

pub(super) fn unassign_bugs_sync(
    conn: &Connection,
    user: i64,
    now_millis: i64,
) -> Result<Vec<BugId>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            "UPDATE bugs SET assigned_to = NULL, status = 'open', updated_at = ?2
             WHERE assigned_to = ?1
             RETURNING id",
        )
        .map_err(storage("unassign_bugs"))?;

    let rows = stmt
        .query_map(params![user, now_millis], |row| row.get::<_, i64>(0))
        .map_err(storage("unassign_bugs"))?;

    let mut ids = rows
        .map(|row| Ok(BugId(i64_to_id(row.map_err(storage("unassign_bugs row"))?, "bug id")?)))
        .collect::<Result<Vec<_>, RepositoryError>>()?;
    // RETURNING order is unspecified.
    ids.sort();
    Ok(ids)
}
