//! Comment table operations for the SQLite repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::super::RepositoryError;
use super::{from_millis, i64_to_id, id_to_i64, storage};
use crate::model::{BugId, Comment, CommentId, NewComment, UserId};

const COMMENT_COLUMNS: &str = "id, bug_id, user_id, comment, created_at";

struct CommentRow {
    id: i64,
    bug_id: i64,
    user_id: i64,
    text: String,
    created_at: i64,
}

impl CommentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            bug_id: row.get(1)?,
            user_id: row.get(2)?,
            text: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_comment(self) -> Result<Comment, RepositoryError> {
        Ok(Comment {
            id: CommentId(i64_to_id(self.id, "comment id")?),
            bug_id: BugId(i64_to_id(self.bug_id, "comment bug_id")?),
            user_id: UserId(i64_to_id(self.user_id, "comment user_id")?),
            text: self.text,
            created_at: from_millis(self.created_at, "comment created_at")?,
        })
    }
}

pub(super) fn insert_comment_sync(
    conn: &Connection,
    comment: &NewComment,
    now_millis: i64,
) -> Result<Comment, RepositoryError> {
    let bug_id = id_to_i64(comment.bug_id.0, "insert_comment")?;
    let user_id = id_to_i64(comment.user_id.0, "insert_comment")?;

    // A missing bug fails the foreign key and surfaces as a storage error.
    conn.query_row(
        &format!(
            "INSERT INTO comments (bug_id, user_id, comment, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING {COMMENT_COLUMNS}"
        ),
        params![bug_id, user_id, comment.text, now_millis],
        CommentRow::from_row,
    )
    .map_err(storage("insert_comment"))?
    .into_comment()
}

pub(super) fn get_comment_sync(
    conn: &Connection,
    id: i64,
) -> Result<Option<Comment>, RepositoryError> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
        params![id],
        CommentRow::from_row,
    )
    .optional()
    .map_err(storage("get_comment"))?
    .map(CommentRow::into_comment)
    .transpose()
}

pub(super) fn list_comments_sync(
    conn: &Connection,
    bug_id: i64,
) -> Result<Vec<Comment>, RepositoryError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE bug_id = ?1 ORDER BY id"
        ))
        .map_err(storage("list_comments"))?;

    let rows = stmt
        .query_map(params![bug_id], CommentRow::from_row)
        .map_err(storage("list_comments"))?;

    let comments = rows
        .map(|row| row.map_err(storage("list_comments row"))?.into_comment())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub(super) fn delete_comment_sync(
    conn: &Connection,
    id: i64,
) -> Result<Option<Comment>, RepositoryError> {
    conn.query_row(
        &format!("DELETE FROM comments WHERE id = ?1 RETURNING {COMMENT_COLUMNS}"),
        params![id],
        CommentRow::from_row,
    )
    .optional()
    .map_err(storage("delete_comment"))?
    .map(CommentRow::into_comment)
    .transpose()
}
