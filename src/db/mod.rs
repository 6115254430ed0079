pub mod error;
pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Transaction, TransactionBehavior};
use std::path::Path;

use crate::state::DbPool;

pub use error::{is_unique_violation, StoreError, StoreResult};

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_identity",
        include_str!("../../migrations/001_identity.sql"),
    ),
    ("002_clubs", include_str!("../../migrations/002_clubs.sql")),
    (
        "003_activity_chat",
        include_str!("../../migrations/003_activity_chat.sql"),
    ),
];

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // foreign_keys and busy_timeout are per-connection, so every pooled
    // connection gets them.
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
    });
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Run `f` inside a single `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` returns `Ok`; any error drops the transaction, which
/// rolls every write back.
pub fn with_transaction<T, F>(pool: &DbPool, f: F) -> StoreResult<T>
where
    F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
{
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// Fresh migrated database in a temp dir. Keep the `TempDir` alive for
    /// the duration of the test.
    pub fn test_pool() -> (DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("test.db")).unwrap();
        run_migrations(&pool).unwrap();
        (pool, temp_dir)
    }

    pub fn insert_user(pool: &DbPool, username: &str) -> crate::db::models::UserId {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash, avatar_id, created_at)
             VALUES (?1, 'x', 'default', ?2)",
            params![username, chrono::Utc::now()],
        )
        .unwrap();
        crate::db::models::UserId(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::test_pool;
    use super::*;

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_run_successfully() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for table in [
            "users",
            "sessions",
            "clubs",
            "members",
            "leaderboard",
            "activity_logs",
            "messages",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let (pool, _tmp) = test_pool();
        run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn foreign_keys_enforced_on_every_connection() {
        let (pool, _tmp) = test_pool();

        // Hold one connection so the next one is a fresh pooled connection
        let _held = pool.get().unwrap();
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO members (user_id, club_id, role, joined_at) VALUES (99, 99, 'member', '')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn with_transaction_rolls_back_on_error() {
        let (pool, _tmp) = test_pool();

        let result: StoreResult<()> = with_transaction(&pool, |tx| {
            tx.execute(
                "INSERT INTO users (username, password_hash, created_at) VALUES ('ghost', 'x', '')",
                [],
            )?;
            Err(StoreError::Conflict("abort".into()))
        });
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE username = 'ghost'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
