//! Comment rows: intake insert, moderation transitions, and listings.
//!
//! Every status transition is a conditional `UPDATE ... WHERE status = ...`
//! so the first moderation decision wins and later ones observe
//! `changed = false` without an error.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::store::{epoch_secs, Store};
use crate::types::{Comment, CommentStatus, StatusFilter};

/// Filter for moderation listings. `allowed_site_ids` carries every site
/// the current admin may access and must be non-empty.
#[derive(Debug, Clone)]
pub struct CommentFilter {
    pub site_id: Option<i64>,
    pub allowed_site_ids: Vec<i64>,
    pub status: StatusFilter,
    pub limit: u32,
    pub offset: u32,
}

const COMMENT_COLUMNS: &str = "id, site_id, entry_id, post_path, parent_id, status, author, \
                               email, author_url, body, ip, created_at, approved_at, rejected_at";

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let status: String = row.get(5)?;
    Ok(Comment {
        id: row.get(0)?,
        site_id: row.get(1)?,
        entry_id: row.get(2)?,
        post_path: row.get(3)?,
        parent_id: row.get(4)?,
        status: CommentStatus::parse(&status).unwrap_or(CommentStatus::Pending),
        author: row.get(6)?,
        email: row.get(7)?,
        author_url: row.get(8)?,
        body: row.get(9)?,
        ip: row.get(10)?,
        created_at: row.get(11)?,
        approved_at: row.get(12)?,
        rejected_at: row.get(13)?,
    })
}

impl Store {
    /// Insert a new comment as `pending`. Fails with [`StoreError::Conflict`]
    /// when the id already exists. Parent referential integrity is enforced
    /// upstream via [`Store::parent_exists`].
    pub fn insert_comment(&self, c: &Comment) -> StoreResult<()> {
        if c.site_id <= 0 {
            return Err(StoreError::InvalidInput("site_id must be > 0"));
        }
        if c.id.trim().is_empty() {
            return Err(StoreError::InvalidInput("comment id is required"));
        }
        let created_at = if c.created_at > 0 { c.created_at } else { epoch_secs() };

        self.lock()
            .execute(
                "INSERT INTO comments (id, site_id, entry_id, post_path, parent_id, status, \
                 author, email, author_url, body, ip, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    c.id,
                    c.site_id,
                    c.entry_id,
                    c.post_path.trim(),
                    c.parent_id,
                    CommentStatus::Pending.as_str(),
                    c.author.trim(),
                    c.email,
                    c.author_url,
                    c.body,
                    c.ip,
                    created_at,
                ],
            )
            .map_err(|e| StoreError::from_insert(e, "comment id already exists"))?;
        Ok(())
    }

    /// Whether a comment with `(site_id, parent_id, post_path)` exists and,
    /// when required, is approved. Prevents cross-thread grafting.
    pub fn parent_exists(
        &self,
        site_id: i64,
        parent_id: &str,
        post_path: &str,
        require_approved: bool,
    ) -> StoreResult<bool> {
        let parent_id = parent_id.trim();
        let post_path = post_path.trim();
        if site_id <= 0 || parent_id.is_empty() || post_path.is_empty() {
            return Err(StoreError::InvalidInput(
                "site_id, parent_id and post_path are required",
            ));
        }

        let sql = if require_approved {
            "SELECT 1 FROM comments WHERE site_id = ?1 AND id = ?2 AND post_path = ?3 \
             AND status = 'approved' LIMIT 1"
        } else {
            "SELECT 1 FROM comments WHERE site_id = ?1 AND id = ?2 AND post_path = ?3 LIMIT 1"
        };

        let found: Option<i64> = self
            .lock()
            .query_row(sql, params![site_id, parent_id, post_path], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_comment(&self, site_id: i64, id: &str) -> StoreResult<Option<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE site_id = ?1 AND id = ?2 LIMIT 1"
        );
        Ok(self
            .lock()
            .query_row(&sql, params![site_id, id], row_to_comment)
            .optional()?)
    }

    /// `pending → approved`; sets `approved_at`, clears `rejected_at`.
    /// Returns true iff exactly one row was updated.
    pub fn approve_comment(&self, site_id: i64, id: &str) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "UPDATE comments SET status = 'approved', approved_at = ?1, rejected_at = NULL \
             WHERE site_id = ?2 AND id = ?3 AND status = 'pending'",
            params![epoch_secs(), site_id, id],
        )?;
        Ok(changed > 0)
    }

    /// `pending → rejected`; sets `rejected_at`, clears `approved_at`.
    pub fn reject_comment(&self, site_id: i64, id: &str) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "UPDATE comments SET status = 'rejected', rejected_at = ?1, approved_at = NULL \
             WHERE site_id = ?2 AND id = ?3 AND status = 'pending'",
            params![epoch_secs(), site_id, id],
        )?;
        Ok(changed > 0)
    }

    /// `{pending, approved} → spam`; clears both decision timestamps. A
    /// previously approved comment flagged as spam disappears from the
    /// generated files on the next pipeline run.
    pub fn spam_comment(&self, site_id: i64, id: &str) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "UPDATE comments SET status = 'spam', approved_at = NULL, rejected_at = NULL \
             WHERE site_id = ?1 AND id = ?2 AND status IN ('pending', 'approved')",
            params![site_id, id],
        )?;
        Ok(changed > 0)
    }

    /// Soft delete from any non-deleted state; clears both timestamps.
    pub fn delete_comment(&self, site_id: i64, id: &str) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "UPDATE comments SET status = 'deleted', approved_at = NULL, rejected_at = NULL \
             WHERE site_id = ?1 AND id = ?2 \
             AND status IN ('pending', 'approved', 'rejected', 'spam')",
            params![site_id, id],
        )?;
        Ok(changed > 0)
    }

    /// All approved comments for a site, ordered by
    /// `(post_path ASC, created_at ASC, id ASC)`.
    ///
    /// The ordering is part of the public contract: it determines filename
    /// numbering in the generator.
    pub fn list_approved_comments(&self, site_id: i64) -> StoreResult<Vec<Comment>> {
        if site_id <= 0 {
            return Err(StoreError::InvalidInput("site_id must be > 0"));
        }
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE site_id = ?1 AND status = 'approved' \
             ORDER BY post_path ASC, created_at ASC, id ASC"
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![site_id], row_to_comment)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_comments(&self, filter: &CommentFilter) -> StoreResult<i64> {
        let (where_clause, args) = filter_clause(filter)?;
        let sql = format!("SELECT COUNT(1) FROM comments WHERE {where_clause}");
        let conn = self.lock();
        let count = conn.query_row(&sql, rusqlite::params_from_iter(args), |row| row.get(0))?;
        Ok(count)
    }

    /// Moderation listing, newest first.
    pub fn list_comments(&self, filter: &CommentFilter) -> StoreResult<Vec<Comment>> {
        let (where_clause, mut args) = filter_clause(filter)?;
        let mut sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {where_clause} \
             ORDER BY created_at DESC, id DESC"
        );
        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
            args.push(i64::from(filter.limit));
            if filter.offset > 0 {
                sql.push_str(" OFFSET ?");
                args.push(i64::from(filter.offset));
            }
        } else if filter.offset > 0 {
            // SQLite requires LIMIT when OFFSET is used.
            sql.push_str(" LIMIT -1 OFFSET ?");
            args.push(i64::from(filter.offset));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_comment)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Build the WHERE clause shared by count and list. Values are collected
/// positionally since the allowed-site set is variable-length.
fn filter_clause(filter: &CommentFilter) -> StoreResult<(String, Vec<i64>)> {
    let allowed: Vec<i64> = filter
        .allowed_site_ids
        .iter()
        .copied()
        .filter(|id| *id > 0)
        .collect();
    if allowed.is_empty() {
        return Err(StoreError::InvalidInput("allowed_site_ids is required"));
    }

    let placeholders = vec!["?"; allowed.len()].join(",");
    let mut clause = format!("site_id IN ({placeholders})");
    let mut args = allowed;

    if let Some(site_id) = filter.site_id {
        if site_id > 0 {
            clause.push_str(" AND site_id = ?");
            args.push(site_id);
        }
    }
    if let StatusFilter::One(status) = filter.status {
        clause.push_str(&format!(" AND status = '{}'", status.as_str()));
    }
    Ok((clause, args))
}
