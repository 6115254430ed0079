use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::clubs::registry::{find_club, find_club_by_code};
use crate::db::models::{Club, ClubId, Membership, Role, UserId};
use crate::db::{is_unique_violation, with_transaction, StoreError, StoreResult};
use crate::journal::activity::record_event;
use crate::journal::{DynNarrator, JournalEvent};
use crate::leaderboard::engine::{delete_entry, insert_entry};
use crate::state::DbPool;

#[async_trait]
pub trait MembershipLedger: Send + Sync {
    /// Join the club behind `code`. Creates the membership, its leaderboard
    /// entry and a "joined" journal entry together.
    async fn join_club(&self, user: UserId, code: &str, role: Role) -> StoreResult<Membership>;

    /// Leave a club, removing the membership and its leaderboard entry.
    async fn leave_club(&self, user: UserId, club_id: ClubId) -> StoreResult<()>;

    /// Clubs the user belongs to, oldest first.
    async fn list_clubs_for_user(&self, user: UserId) -> StoreResult<Vec<Club>>;

    async fn list_members(&self, club_id: ClubId) -> StoreResult<Vec<Membership>>;

    async fn count_members(&self, club_id: ClubId) -> StoreResult<i64>;

    async fn is_member(&self, user: UserId, club_id: ClubId) -> StoreResult<bool>;
}

pub struct SqliteMembershipLedger {
    pool: DbPool,
    narrator: DynNarrator,
}

impl SqliteMembershipLedger {
    pub fn new(pool: DbPool, narrator: DynNarrator) -> Self {
        Self { pool, narrator }
    }
}

pub(crate) fn insert_membership(
    conn: &Connection,
    user: UserId,
    club_id: ClubId,
    role: Role,
    now: DateTime<Utc>,
) -> StoreResult<Membership> {
    conn.execute(
        "INSERT INTO members (user_id, club_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        params![user, club_id, role, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict("user is already a member of the club".into())
        } else {
            e.into()
        }
    })?;

    Ok(Membership {
        id: conn.last_insert_rowid(),
        user_id: user,
        club_id,
        role,
        joined_at: now,
    })
}

pub(crate) fn find_membership(
    conn: &Connection,
    user: UserId,
    club_id: ClubId,
) -> StoreResult<Option<Membership>> {
    let membership = conn
        .query_row(
            &format!(
                "SELECT {} FROM members WHERE user_id = ?1 AND club_id = ?2",
                Membership::COLUMNS
            ),
            params![user, club_id],
            Membership::from_row,
        )
        .optional()?;
    Ok(membership)
}

pub(crate) fn count_members_on(conn: &Connection, club_id: ClubId) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM members WHERE club_id = ?1",
        params![club_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[async_trait]
impl MembershipLedger for SqliteMembershipLedger {
    async fn join_club(&self, user: UserId, code: &str, role: Role) -> StoreResult<Membership> {
        let now = Utc::now();

        let membership = with_transaction(&self.pool, |tx| {
            let club = find_club_by_code(tx, code)?;
            if find_membership(tx, user, club.id)?.is_some() {
                return Err(StoreError::Conflict(
                    "user is already a member of the club".into(),
                ));
            }

            let membership = insert_membership(tx, user, club.id, role, now)?;
            insert_entry(tx, user, club.id)?;
            record_event(tx, self.narrator.as_ref(), user, &club, JournalEvent::Joined, now)?;
            Ok(membership)
        })?;

        tracing::info!(user = %user, club_id = %membership.club_id, "joined club");
        Ok(membership)
    }

    async fn leave_club(&self, user: UserId, club_id: ClubId) -> StoreResult<()> {
        let now = Utc::now();

        with_transaction(&self.pool, |tx| {
            let club = find_club(tx, club_id)?;
            if find_membership(tx, user, club_id)?.is_none() {
                return Err(StoreError::not_found("membership"));
            }
            if club.created_by == user {
                return Err(StoreError::Forbidden(
                    "the club creator cannot leave their own club".into(),
                ));
            }

            record_event(tx, self.narrator.as_ref(), user, &club, JournalEvent::Left, now)?;
            tx.execute(
                "DELETE FROM members WHERE user_id = ?1 AND club_id = ?2",
                params![user, club_id],
            )?;
            delete_entry(tx, user, club_id)?;
            Ok(())
        })?;

        tracing::info!(user = %user, club_id = %club_id, "left club");
        Ok(())
    }

    async fn list_clubs_for_user(&self, user: UserId) -> StoreResult<Vec<Club>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clubs
             WHERE id IN (SELECT club_id FROM members WHERE user_id = ?1)
             ORDER BY created_at ASC, id ASC",
            Club::COLUMNS
        ))?;
        let clubs = stmt
            .query_map(params![user], Club::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clubs)
    }

    async fn list_members(&self, club_id: ClubId) -> StoreResult<Vec<Membership>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM members WHERE club_id = ?1 ORDER BY joined_at ASC, id ASC",
            Membership::COLUMNS
        ))?;
        let members = stmt
            .query_map(params![club_id], Membership::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    async fn count_members(&self, club_id: ClubId) -> StoreResult<i64> {
        let conn = self.pool.get()?;
        count_members_on(&conn, club_id)
    }

    async fn is_member(&self, user: UserId, club_id: ClubId) -> StoreResult<bool> {
        let conn = self.pool.get()?;
        Ok(find_membership(&conn, user, club_id)?.is_some())
    }
}

pub type DynMembershipLedger = Arc<dyn MembershipLedger>;
