// User records. The club core only needs profile lookups; signup, login and
// avatar changes are here so the service is usable end to end.
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::models::{UserId, UserProfile};
use crate::db::{is_unique_violation, StoreError, StoreResult};
use crate::state::DbPool;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Profile for one user; `NotFound` if absent.
    async fn get_user(&self, id: UserId) -> StoreResult<UserProfile>;

    /// Profiles for a batch of users, keyed by id. Unknown ids are skipped.
    async fn get_users(&self, ids: &[UserId]) -> StoreResult<HashMap<UserId, UserProfile>>;

    /// Register a new user; `Conflict` if the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password: &str,
        avatar_id: &str,
    ) -> StoreResult<UserProfile>;

    /// Check a username/password pair. `None` on any mismatch.
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<UserProfile>>;

    async fn update_avatar(&self, id: UserId, avatar_id: &str) -> StoreResult<()>;
}

pub struct SqliteIdentityStore {
    pool: DbPool,
    bcrypt_cost: u32,
}

impl SqliteIdentityStore {
    pub fn new(pool: DbPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }
}

/// Load a profile on an existing connection (usable inside a transaction).
pub(crate) fn find_profile(conn: &Connection, id: UserId) -> StoreResult<UserProfile> {
    conn.query_row(
        "SELECT id, username, avatar_id FROM users WHERE id = ?1",
        params![id],
        UserProfile::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(format!("user {id}")))
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn get_user(&self, id: UserId) -> StoreResult<UserProfile> {
        let conn = self.pool.get()?;
        find_profile(&conn, id)
    }

    async fn get_users(&self, ids: &[UserId]) -> StoreResult<HashMap<UserId, UserProfile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, username, avatar_id FROM users WHERE id = ?1")?;

        let mut profiles = HashMap::with_capacity(ids.len());
        for id in ids {
            if profiles.contains_key(id) {
                continue;
            }
            if let Some(profile) = stmt
                .query_row(params![id], UserProfile::from_row)
                .optional()?
            {
                profiles.insert(*id, profile);
            }
        }
        Ok(profiles)
    }

    async fn create_user(
        &self,
        username: &str,
        password: &str,
        avatar_id: &str,
    ) -> StoreResult<UserProfile> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::InvalidInput(
                "username and password are required".into(),
            ));
        }

        let hash = bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| StoreError::Internal(format!("could not hash password: {e}")))?;
        let avatar_id = if avatar_id.trim().is_empty() {
            "default"
        } else {
            avatar_id.trim()
        };

        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, avatar_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, hash, avatar_id, Utc::now()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(format!(
                    "username {username} is already taken"
                )))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(username, "user created");
        Ok(UserProfile {
            id: UserId(conn.last_insert_rowid()),
            username: username.to_string(),
            avatar_id: avatar_id.to_string(),
        })
    }

    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> StoreResult<Option<UserProfile>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, username, avatar_id, password_hash FROM users WHERE username = ?1",
                params![username.trim()],
                |row| Ok((UserProfile::from_row(row)?, row.get::<_, String>("password_hash")?)),
            )
            .optional()?;

        Ok(row.and_then(|(profile, hash)| {
            bcrypt::verify(password, &hash)
                .unwrap_or(false)
                .then_some(profile)
        }))
    }

    async fn update_avatar(&self, id: UserId, avatar_id: &str) -> StoreResult<()> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET avatar_id = ?1 WHERE id = ?2",
            params![avatar_id, id],
        )?;
        if rows == 0 {
            return Err(StoreError::not_found(format!("user {id}")));
        }
        Ok(())
    }
}

pub type DynIdentityStore = Arc<dyn IdentityStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;

    fn store() -> (SqliteIdentityStore, tempfile::TempDir) {
        let (pool, tmp) = test_pool();
        (SqliteIdentityStore::new(pool, 4), tmp)
    }

    #[tokio::test]
    async fn create_and_fetch_user() {
        let (store, _tmp) = store();
        let created = store.create_user("alice", "hunter2", "fox").await.unwrap();
        let fetched = store.get_user(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.avatar_id, "fox");
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let (store, _tmp) = store();
        store.create_user("alice", "pw", "").await.unwrap();
        let err = store.create_user("alice", "other", "").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn hashing_failure_is_internal() {
        let (pool, _tmp) = test_pool();
        // bcrypt only accepts costs 4..=31
        let store = SqliteIdentityStore::new(pool, 99);
        let err = store.create_user("alice", "pw", "").await.unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[tokio::test]
    async fn blank_avatar_defaults() {
        let (store, _tmp) = store();
        let user = store.create_user("bob", "pw", "  ").await.unwrap();
        assert_eq!(user.avatar_id, "default");
    }

    #[tokio::test]
    async fn verify_credentials_checks_password() {
        let (store, _tmp) = store();
        let user = store.create_user("carol", "secret", "").await.unwrap();

        let ok = store.verify_credentials("carol", "secret").await.unwrap();
        assert_eq!(ok, Some(user));
        assert!(store
            .verify_credentials("carol", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .verify_credentials("nobody", "secret")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let (store, _tmp) = store();
        let err = store.get_user(UserId(404)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = store.update_avatar(UserId(404), "cat").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_users_skips_unknown_ids() {
        let (store, _tmp) = store();
        let a = store.create_user("a", "pw", "").await.unwrap();
        let b = store.create_user("b", "pw", "").await.unwrap();
        let found = store
            .get_users(&[a.id, b.id, UserId(999), a.id])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&b.id].username, "b");
    }
}
