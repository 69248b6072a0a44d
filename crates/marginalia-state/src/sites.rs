//! Site rows and the startup synchronizer.

use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::store::{epoch_secs, Store};
use crate::types::{Site, SiteStatus};

pub(crate) fn row_to_site(row: &Row<'_>) -> rusqlite::Result<Site> {
    let status: String = row.get(3)?;
    Ok(Site {
        id: row.get(0)?,
        site_key: row.get(1)?,
        title: row.get(2)?,
        status: SiteStatus::parse(&status).unwrap_or(SiteStatus::Disabled),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const SITE_COLUMNS: &str = "id, site_key, title, status, created_at, updated_at";

impl Store {
    pub fn site_id_by_key(&self, site_key: &str) -> StoreResult<Option<i64>> {
        let site_key = site_key.trim();
        if site_key.is_empty() {
            return Err(StoreError::InvalidInput("site_key is required"));
        }
        Ok(self
            .lock()
            .query_row(
                "SELECT id FROM sites WHERE site_key = ?1 LIMIT 1",
                params![site_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_site_by_id(&self, site_id: i64) -> StoreResult<Option<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1 LIMIT 1");
        Ok(self
            .lock()
            .query_row(&sql, params![site_id], row_to_site)
            .optional()?)
    }

    pub fn list_sites(&self) -> StoreResult<Vec<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY id ASC");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_site)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Reconcile configured site keys with persisted rows, inside a single
    /// transaction:
    ///
    /// - configured and currently disabled → re-enable, refresh title
    /// - configured but missing → insert as active
    /// - persisted and active but no longer configured → disable
    /// - everything else untouched; rows are never deleted
    pub fn sync_sites(&self, configured: &BTreeMap<String, String>) -> StoreResult<()> {
        for key in configured.keys() {
            if key.trim().is_empty() || key.trim() != key {
                return Err(StoreError::InvalidInput(
                    "site keys must be non-empty and trimmed",
                ));
            }
        }

        let now = epoch_secs();
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        for (key, title) in configured {
            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, status FROM sites WHERE site_key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO sites (site_key, title, status, created_at, updated_at) \
                         VALUES (?1, ?2, 'active', ?3, ?3)",
                        params![key, title, now],
                    )?;
                    info!(site_key = %key, "site registered");
                }
                Some((id, status)) if status == "disabled" => {
                    tx.execute(
                        "UPDATE sites SET status = 'active', title = ?1, updated_at = ?2 \
                         WHERE id = ?3",
                        params![title, now, id],
                    )?;
                    info!(site_key = %key, "site re-enabled");
                }
                Some(_) => {}
            }
        }

        // Disable active rows that fell out of the config.
        let orphaned: Vec<(i64, String)> = {
            let mut stmt =
                tx.prepare("SELECT id, site_key FROM sites WHERE status = 'active'")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for (id, key) in orphaned {
            if !configured.contains_key(&key) {
                tx.execute(
                    "UPDATE sites SET status = 'disabled', updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                info!(site_key = %key, "site disabled (removed from config)");
            }
        }

        tx.commit()?;
        Ok(())
    }
}
