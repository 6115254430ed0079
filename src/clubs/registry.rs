use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::sync::Arc;

use crate::clubs::code::{generate_code, normalize_code};
use crate::db::models::{Club, ClubId, Role, UserId};
use crate::db::{is_unique_violation, with_transaction, StoreError, StoreResult};
use crate::leaderboard::engine::insert_entry;
use crate::membership::ledger::insert_membership;
use crate::state::DbPool;

/// Attempts at finding an unused invite code before giving up.
const CODE_ATTEMPTS: u32 = 3;

/// Editable club fields, shared by create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct ClubDetails {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    pub action: String,
}

impl ClubDetails {
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("club name is required".into()));
        }
        if self.action.trim().is_empty() {
            return Err(StoreError::InvalidInput("club action is required".into()));
        }
        Ok(())
    }

    fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[async_trait]
pub trait ClubRegistry: Send + Sync {
    /// Create a club and its founding admin membership in one transaction.
    async fn create_club(&self, creator: UserId, details: ClubDetails) -> StoreResult<Club>;

    /// Only the creator may edit. `code` and `created_by` never change.
    async fn update_club(
        &self,
        club_id: ClubId,
        caller: UserId,
        details: ClubDetails,
    ) -> StoreResult<Club>;

    async fn get_club(&self, club_id: ClubId) -> StoreResult<Club>;

    async fn get_club_by_code(&self, code: &str) -> StoreResult<Club>;
}

pub struct SqliteClubRegistry {
    pool: DbPool,
}

impl SqliteClubRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn find_club(conn: &Connection, club_id: ClubId) -> StoreResult<Club> {
    conn.query_row(
        &format!("SELECT {} FROM clubs WHERE id = ?1", Club::COLUMNS),
        params![club_id],
        Club::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(format!("club {club_id}")))
}

pub(crate) fn find_club_by_code(conn: &Connection, code: &str) -> StoreResult<Club> {
    conn.query_row(
        &format!("SELECT {} FROM clubs WHERE code = ?1", Club::COLUMNS),
        params![normalize_code(code)],
        Club::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("club with that code"))
}

/// Insert the club row, regenerating the code on the rare UNIQUE collision.
fn insert_club(
    conn: &Connection,
    creator: UserId,
    details: &ClubDetails,
    now: DateTime<Utc>,
) -> StoreResult<Club> {
    for attempt in 0..CODE_ATTEMPTS {
        let code = generate_code(now, attempt);
        let inserted = conn.execute(
            "INSERT INTO clubs (created_by, is_private, name, description, action, code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                creator,
                details.is_private,
                details.name.trim(),
                details.description(),
                details.action.trim(),
                code,
                now
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::debug!(%code, attempt, "generated club code");
                return find_club(conn, ClubId(conn.last_insert_rowid()));
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(%code, attempt, "club code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::Conflict(
        "could not allocate a unique club code".into(),
    ))
}

#[async_trait]
impl ClubRegistry for SqliteClubRegistry {
    async fn create_club(&self, creator: UserId, details: ClubDetails) -> StoreResult<Club> {
        details.validate()?;
        let now = Utc::now();

        let club = with_transaction(&self.pool, |tx| {
            let club = insert_club(tx, creator, &details, now)?;
            insert_membership(tx, creator, club.id, Role::Admin, now)?;
            insert_entry(tx, creator, club.id)?;
            Ok(club)
        })?;

        tracing::info!(club_id = %club.id, creator = %creator, code = %club.code, "club created");
        Ok(club)
    }

    async fn update_club(
        &self,
        club_id: ClubId,
        caller: UserId,
        details: ClubDetails,
    ) -> StoreResult<Club> {
        details.validate()?;

        with_transaction(&self.pool, |tx| {
            let club = find_club(tx, club_id)?;
            if club.created_by != caller {
                return Err(StoreError::Forbidden(
                    "only the creator can edit this club".into(),
                ));
            }

            tx.execute(
                "UPDATE clubs SET name = ?1, description = ?2, is_private = ?3, action = ?4
                 WHERE id = ?5",
                params![
                    details.name.trim(),
                    details.description(),
                    details.is_private,
                    details.action.trim(),
                    club_id
                ],
            )?;

            find_club(tx, club_id)
        })
    }

    async fn get_club(&self, club_id: ClubId) -> StoreResult<Club> {
        let conn = self.pool.get()?;
        find_club(&conn, club_id)
    }

    async fn get_club_by_code(&self, code: &str) -> StoreResult<Club> {
        let conn = self.pool.get()?;
        find_club_by_code(&conn, code)
    }
}

pub type DynClubRegistry = Arc<dyn ClubRegistry>;
