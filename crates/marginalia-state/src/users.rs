//! Admin users and per-site access grants.
//!
//! The grant set is the only authorization input the moderation endpoints
//! rely on: operations on sites outside a user's grants are rejected.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::store::{epoch_secs, Store};
use crate::types::{Site, User};

const USER_COLUMNS: &str = "id, password, first_name, last_name, email, created_at, updated_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        password: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Store {
    /// Create a user; `password` must already be a PHC-encoded hash.
    /// Duplicate emails surface as [`StoreError::Conflict`].
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> StoreResult<i64> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(StoreError::InvalidInput("email is required"));
        }
        if password_hash.trim().is_empty() {
            return Err(StoreError::InvalidInput("password hash is required"));
        }

        let now = epoch_secs();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (password, first_name, last_name, email, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![password_hash, first_name.trim(), last_name.trim(), email, now],
        )
        .map_err(|e| StoreError::from_insert(e, "email already registered"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 LIMIT 1");
        Ok(self
            .lock()
            .query_row(&sql, params![user_id], row_to_user)
            .optional()?)
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 LIMIT 1");
        Ok(self
            .lock()
            .query_row(&sql, params![email], row_to_user)
            .optional()?)
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_user)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn update_user_password(&self, user_id: i64, password_hash: &str) -> StoreResult<bool> {
        if password_hash.trim().is_empty() {
            return Err(StoreError::InvalidInput("password hash is required"));
        }
        let changed = self.lock().execute(
            "UPDATE users SET password = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, epoch_secs(), user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_user(&self, user_id: i64) -> StoreResult<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(changed > 0)
    }

    // ── Site grants ────────────────────────────────────────────────

    pub fn assign_user_site(&self, user_id: i64, site_id: i64) -> StoreResult<()> {
        self.lock().execute(
            "INSERT INTO user_sites (user_id, site_id) VALUES (?1, ?2) \
             ON CONFLICT (user_id, site_id) DO NOTHING",
            params![user_id, site_id],
        )?;
        Ok(())
    }

    pub fn remove_user_site(&self, user_id: i64, site_id: i64) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "DELETE FROM user_sites WHERE user_id = ?1 AND site_id = ?2",
            params![user_id, site_id],
        )?;
        Ok(changed > 0)
    }

    pub fn user_has_site_access(&self, user_id: i64, site_id: i64) -> StoreResult<bool> {
        let found: Option<i64> = self
            .lock()
            .query_row(
                "SELECT 1 FROM user_sites WHERE user_id = ?1 AND site_id = ?2 LIMIT 1",
                params![user_id, site_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_allowed_site_ids(&self, user_id: i64) -> StoreResult<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT site_id FROM user_sites WHERE user_id = ?1 ORDER BY site_id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_sites_by_user(&self, user_id: i64) -> StoreResult<Vec<Site>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.site_key, s.title, s.status, s.created_at, s.updated_at \
             FROM sites s JOIN user_sites us ON us.site_id = s.id \
             WHERE us.user_id = ?1 ORDER BY s.id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], crate::sites::row_to_site)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::tests::store_with_site;

    #[test]
    fn create_and_look_up_user() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .create_user("Ada@Example.org", "$argon2id$stub", "Ada", "Lovelace")
            .unwrap();

        // Email is normalized to lowercase.
        let user = store.get_user_by_email("ada@example.org").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.first_name, "Ada");

        assert!(store.get_user_by_id(id).unwrap().is_some());
        assert!(store.get_user_by_email("nobody@example.org").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.create_user("a@x.org", "$h", "", "").unwrap();
        let err = store.create_user("A@X.ORG", "$h", "", "").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn password_update_and_delete() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_user("a@x.org", "$old", "", "").unwrap();

        assert!(store.update_user_password(id, "$new").unwrap());
        let user = store.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.password, "$new");

        assert!(store.delete_user(id).unwrap());
        assert!(!store.delete_user(id).unwrap());
    }

    #[test]
    fn site_grants() {
        let (store, site_id) = store_with_site("blog");
        let user_id = store.create_user("a@x.org", "$h", "", "").unwrap();

        assert!(!store.user_has_site_access(user_id, site_id).unwrap());
        store.assign_user_site(user_id, site_id).unwrap();
        // Re-assigning is a no-op, not an error.
        store.assign_user_site(user_id, site_id).unwrap();
        assert!(store.user_has_site_access(user_id, site_id).unwrap());

        assert_eq!(store.list_allowed_site_ids(user_id).unwrap(), vec![site_id]);
        let sites = store.list_sites_by_user(user_id).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].site_key, "blog");

        assert!(store.remove_user_site(user_id, site_id).unwrap());
        assert!(!store.remove_user_site(user_id, site_id).unwrap());
        assert!(store.list_allowed_site_ids(user_id).unwrap().is_empty());
    }

    #[test]
    fn deleting_user_cascades_grants() {
        let (store, site_id) = store_with_site("blog");
        let user_id = store.create_user("a@x.org", "$h", "", "").unwrap();
        store.assign_user_site(user_id, site_id).unwrap();

        store.delete_user(user_id).unwrap();
        assert!(store.list_allowed_site_ids(user_id).unwrap().is_empty());
    }
}
