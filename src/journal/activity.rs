use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chat::log::insert_message;
use crate::clubs::registry::find_club;
use crate::db::models::{ActivityLogEntry, Club, ClubId, MessageKind, UserId};
use crate::db::{with_transaction, StoreResult};
use crate::identity::find_profile;
use crate::journal::narration::{DynNarrator, NarrationEvent, Narrator};
use crate::state::DbPool;

pub const ACTION_JOINED: &str = "joined";
pub const ACTION_LEFT: &str = "left";

/// Label the caller's own total carries in daily breakdowns.
pub const YOU_LABEL: &str = "You";

/// Contributors shown in a daily breakdown besides the caller.
const DAILY_TOP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEvent {
    Joined,
    Left,
    Scored(i64),
}

/// Append one activity row and narrate it into the club's chat.
///
/// Joins and leaves are recorded as "joined"/"left" with a zero score;
/// scoring rows carry the delta under the club's own action verb.
pub(crate) fn record_event(
    conn: &Connection,
    narrator: &dyn Narrator,
    user: UserId,
    club: &Club,
    event: JournalEvent,
    now: DateTime<Utc>,
) -> StoreResult<ActivityLogEntry> {
    let profile = find_profile(conn, user)?;

    let (action, updated_score, narration) = match event {
        JournalEvent::Joined => (
            ACTION_JOINED,
            0,
            NarrationEvent::Joined {
                username: &profile.username,
                club_name: &club.name,
            },
        ),
        JournalEvent::Left => (
            ACTION_LEFT,
            0,
            NarrationEvent::Left {
                username: &profile.username,
                club_name: &club.name,
            },
        ),
        JournalEvent::Scored(delta) => (
            club.action.as_str(),
            delta,
            NarrationEvent::Scored {
                username: &profile.username,
                delta,
                action: &club.action,
            },
        ),
    };

    conn.execute(
        "INSERT INTO activity_logs (user_id, club_id, action, updated_score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user, club.id, action, updated_score, now],
    )?;
    let entry = ActivityLogEntry {
        id: conn.last_insert_rowid(),
        user_id: user,
        club_id: club.id,
        action: action.to_string(),
        updated_score,
        created_at: now,
    };

    let text = narrator.narrate(&narration);
    insert_message(conn, club.id, user, &text, MessageKind::System, None, now)?;

    tracing::debug!(user = %user, club_id = %club.id, action, updated_score, "activity recorded");
    Ok(entry)
}

/// Another member literally named "You" must not shadow the caller's key.
fn contributor_label(username: String) -> String {
    if username == YOU_LABEL {
        format!("{YOU_LABEL} (@{username})")
    } else {
        username
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[async_trait]
pub trait ActivityJournal: Send + Sync {
    /// Record an event outside the membership and scoring flows.
    async fn record(
        &self,
        user: UserId,
        club_id: ClubId,
        event: JournalEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<ActivityLogEntry>;

    /// Per-user totals for one UTC day: the top contributors plus the
    /// caller, who always appears as "You" (0 when idle that day).
    async fn daily_scores_for_club(
        &self,
        club_id: ClubId,
        day: NaiveDate,
        current_user: UserId,
    ) -> StoreResult<BTreeMap<String, i64>>;

    /// One user's points for each of the 7 days ending on `today`.
    async fn weekly_activity(
        &self,
        club_id: ClubId,
        user: UserId,
        today: NaiveDate,
    ) -> StoreResult<BTreeMap<NaiveDate, i64>>;
}

pub struct SqliteActivityJournal {
    pool: DbPool,
    narrator: DynNarrator,
}

impl SqliteActivityJournal {
    pub fn new(pool: DbPool, narrator: DynNarrator) -> Self {
        Self { pool, narrator }
    }
}

#[async_trait]
impl ActivityJournal for SqliteActivityJournal {
    async fn record(
        &self,
        user: UserId,
        club_id: ClubId,
        event: JournalEvent,
        now: DateTime<Utc>,
    ) -> StoreResult<ActivityLogEntry> {
        with_transaction(&self.pool, |tx| {
            let club = find_club(tx, club_id)?;
            record_event(tx, self.narrator.as_ref(), user, &club, event, now)
        })
    }

    async fn daily_scores_for_club(
        &self,
        club_id: ClubId,
        day: NaiveDate,
        current_user: UserId,
    ) -> StoreResult<BTreeMap<String, i64>> {
        let start = start_of(day);
        let end = start + chrono::Duration::days(1);

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT a.user_id, u.username, SUM(a.updated_score) AS total
             FROM activity_logs a
             JOIN users u ON u.id = a.user_id
             WHERE a.club_id = ?1 AND a.created_at >= ?2 AND a.created_at < ?3
             GROUP BY a.user_id
             ORDER BY total DESC, a.user_id ASC",
        )?;
        let rows = stmt
            .query_map(params![club_id, start, end], |row| {
                Ok((
                    row.get::<_, UserId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scores = BTreeMap::new();
        let mut own_total = 0;

        for (position, (user, username, total)) in rows.into_iter().enumerate() {
            if user == current_user {
                own_total = total;
            } else if position < DAILY_TOP {
                scores.insert(contributor_label(username), total);
            }
        }
        scores.insert(YOU_LABEL.to_string(), own_total);

        Ok(scores)
    }

    async fn weekly_activity(
        &self,
        club_id: ClubId,
        user: UserId,
        today: NaiveDate,
    ) -> StoreResult<BTreeMap<NaiveDate, i64>> {
        let first = today.checked_sub_days(Days::new(6)).unwrap_or(today);
        let mut points: BTreeMap<NaiveDate, i64> = first
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|d| (d, 0))
            .collect();

        let end = start_of(today) + chrono::Duration::days(1);
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT created_at, updated_score FROM activity_logs
             WHERE club_id = ?1 AND user_id = ?2 AND created_at >= ?3 AND created_at < ?4",
        )?;
        let rows = stmt.query_map(params![club_id, user, start_of(first), end], |row| {
            Ok((row.get::<_, DateTime<Utc>>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (at, score) = row?;
            if let Some(total) = points.get_mut(&at.date_naive()) {
                *total += score;
            }
        }

        Ok(points)
    }
}

pub type DynActivityJournal = Arc<dyn ActivityJournal>;
