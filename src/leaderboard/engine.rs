use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::clubs::registry::find_club;
use crate::config::ScoringConfig;
use crate::db::models::{ClubId, LeaderboardEntry, UserId};
use crate::db::{is_unique_violation, with_transaction, StoreError, StoreResult};
use crate::journal::activity::record_event;
use crate::journal::{DynNarrator, JournalEvent};
use crate::leaderboard::ranking::percentile_label;
use crate::leaderboard::streak::Streak;
use crate::membership::ledger::count_members_on;
use crate::state::DbPool;

#[async_trait]
pub trait LeaderboardEngine: Send + Sync {
    /// Add `delta` to the score, advancing the streak. Journals the event and
    /// narrates it into the club chat.
    async fn update_score(
        &self,
        user: UserId,
        club_id: ClubId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<LeaderboardEntry>;

    /// Overwrite the score without touching the streak counters.
    async fn set_score(
        &self,
        user: UserId,
        club_id: ClubId,
        score: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<LeaderboardEntry>;

    async fn get_entry(&self, user: UserId, club_id: ClubId) -> StoreResult<LeaderboardEntry>;

    async fn list_top(&self, club_id: ClubId, limit: u32) -> StoreResult<Vec<LeaderboardEntry>>;

    /// 1-based position, consistent with `list_top`.
    async fn rank(&self, user: UserId, club_id: ClubId) -> StoreResult<i64>;

    async fn percentile(&self, user: UserId, club_id: ClubId) -> StoreResult<String>;

    /// Highest scorer in the club, `None` when the club has no entries.
    async fn leader_id(&self, club_id: ClubId) -> StoreResult<Option<UserId>>;

    fn scoring(&self) -> &ScoringConfig;
}

pub struct SqliteLeaderboardEngine {
    pool: DbPool,
    scoring: ScoringConfig,
    narrator: DynNarrator,
}

impl SqliteLeaderboardEngine {
    pub fn new(pool: DbPool, scoring: ScoringConfig, narrator: DynNarrator) -> Self {
        Self {
            pool,
            scoring,
            narrator,
        }
    }
}

/// When the member is next expected to check in. Informational only, so a
/// cooldown that overflows the calendar yields `None`.
pub fn next_check_in(entry: &LeaderboardEntry, scoring: &ScoringConfig) -> Option<DateTime<Utc>> {
    let cooldown = Duration::try_minutes(scoring.cooldown_minutes)?;
    entry.last_checked_in?.checked_add_signed(cooldown)
}

const STANDING_ORDER: &str = "score DESC, last_checked_in IS NULL, last_checked_in ASC, id ASC";

pub(crate) fn insert_entry(
    conn: &Connection,
    user: UserId,
    club_id: ClubId,
) -> StoreResult<LeaderboardEntry> {
    conn.execute(
        "INSERT INTO leaderboard (user_id, club_id, score, current_streak, longest_streak)
         VALUES (?1, ?2, 0, 0, 0)",
        params![user, club_id],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict("leaderboard entry already exists".into())
        } else {
            e.into()
        }
    })?;

    find_entry(conn, user, club_id)
}

pub(crate) fn delete_entry(conn: &Connection, user: UserId, club_id: ClubId) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM leaderboard WHERE user_id = ?1 AND club_id = ?2",
        params![user, club_id],
    )?;
    Ok(())
}

pub(crate) fn find_entry(
    conn: &Connection,
    user: UserId,
    club_id: ClubId,
) -> StoreResult<LeaderboardEntry> {
    conn.query_row(
        &format!(
            "SELECT {} FROM leaderboard WHERE user_id = ?1 AND club_id = ?2",
            LeaderboardEntry::COLUMNS
        ),
        params![user, club_id],
        LeaderboardEntry::from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(format!("leaderboard entry for user {user} in club {club_id}")))
}

#[async_trait]
impl LeaderboardEngine for SqliteLeaderboardEngine {
    async fn update_score(
        &self,
        user: UserId,
        club_id: ClubId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<LeaderboardEntry> {
        let entry = with_transaction(&self.pool, |tx| {
            let entry = find_entry(tx, user, club_id)?;
            let club = find_club(tx, club_id)?;

            let streak = Streak {
                current: entry.current_streak,
                longest: entry.longest_streak,
                last_checked_in: entry.last_checked_in,
            }
            .check_in(now);

            tx.execute(
                "UPDATE leaderboard
                 SET score = score + ?1, current_streak = ?2, longest_streak = ?3, last_checked_in = ?4
                 WHERE id = ?5",
                params![
                    delta,
                    streak.current,
                    streak.longest,
                    streak.last_checked_in,
                    entry.id
                ],
            )?;

            record_event(
                tx,
                self.narrator.as_ref(),
                user,
                &club,
                JournalEvent::Scored(delta),
                now,
            )?;

            find_entry(tx, user, club_id)
        })?;

        tracing::info!(
            user = %user,
            club_id = %club_id,
            delta,
            score = entry.score,
            streak = entry.current_streak,
            "score updated"
        );
        Ok(entry)
    }

    async fn set_score(
        &self,
        user: UserId,
        club_id: ClubId,
        score: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<LeaderboardEntry> {
        let entry = with_transaction(&self.pool, |tx| {
            let entry = find_entry(tx, user, club_id)?;
            tx.execute(
                "UPDATE leaderboard SET score = ?1, last_checked_in = ?2 WHERE id = ?3",
                params![score, now, entry.id],
            )?;
            find_entry(tx, user, club_id)
        })?;

        tracing::info!(user = %user, club_id = %club_id, score, "score set");
        Ok(entry)
    }

    async fn get_entry(&self, user: UserId, club_id: ClubId) -> StoreResult<LeaderboardEntry> {
        let conn = self.pool.get()?;
        find_entry(&conn, user, club_id)
    }

    async fn list_top(&self, club_id: ClubId, limit: u32) -> StoreResult<Vec<LeaderboardEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM leaderboard WHERE club_id = ?1 ORDER BY {STANDING_ORDER} LIMIT ?2",
            LeaderboardEntry::COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![club_id, limit], LeaderboardEntry::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    async fn rank(&self, user: UserId, club_id: ClubId) -> StoreResult<i64> {
        let conn = self.pool.get()?;
        let entry = find_entry(&conn, user, club_id)?;

        // Count entries that sort ahead of this one under STANDING_ORDER
        let ahead: i64 = conn.query_row(
            "SELECT COUNT(*) FROM leaderboard o
             JOIN leaderboard me ON me.id = ?1
             WHERE o.club_id = me.club_id
               AND o.id != me.id
               AND (
                 o.score > me.score
                 OR (o.score = me.score AND (
                   (o.last_checked_in IS NOT NULL AND me.last_checked_in IS NULL)
                   OR o.last_checked_in < me.last_checked_in
                   OR (o.last_checked_in IS me.last_checked_in AND o.id < me.id)
                 ))
               )",
            params![entry.id],
            |row| row.get(0),
        )?;

        Ok(ahead + 1)
    }

    async fn percentile(&self, user: UserId, club_id: ClubId) -> StoreResult<String> {
        let rank = self.rank(user, club_id).await?;
        let total = {
            let conn = self.pool.get()?;
            count_members_on(&conn, club_id)?
        };
        Ok(percentile_label(rank, total))
    }

    async fn leader_id(&self, club_id: ClubId) -> StoreResult<Option<UserId>> {
        let conn = self.pool.get()?;
        let leader = conn
            .query_row(
                &format!(
                    "SELECT user_id FROM leaderboard WHERE club_id = ?1 ORDER BY {STANDING_ORDER} LIMIT 1"
                ),
                params![club_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(leader)
    }

    fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }
}

pub type DynLeaderboardEngine = Arc<dyn LeaderboardEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clubs::{ClubDetails, ClubRegistry, SqliteClubRegistry};
    use crate::db::models::{Club, Role};
    use crate::db::testing::{insert_user, test_pool};
    use crate::journal::DefaultNarrator;
    use crate::leaderboard::ranking::standing::compare_standing;
    use crate::membership::{MembershipLedger, SqliteMembershipLedger};
    use chrono::TimeZone;

    struct Fixture {
        pool: DbPool,
        engine: SqliteLeaderboardEngine,
        ledger: SqliteMembershipLedger,
        club: Club,
        owner: UserId,
        _tmp: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let (pool, tmp) = test_pool();
        let owner = insert_user(&pool, "owner");
        let club = SqliteClubRegistry::new(pool.clone())
            .create_club(
                owner,
                ClubDetails {
                    name: "Readers".into(),
                    description: None,
                    is_private: false,
                    action: "pages read".into(),
                },
            )
            .await
            .unwrap();
        let narrator: DynNarrator = Arc::new(DefaultNarrator);
        Fixture {
            engine: SqliteLeaderboardEngine::new(
                pool.clone(),
                ScoringConfig::default(),
                narrator.clone(),
            ),
            ledger: SqliteMembershipLedger::new(pool.clone(), narrator),
            pool,
            club,
            owner,
            _tmp: tmp,
        }
    }

    impl Fixture {
        async fn member(&self, name: &str) -> UserId {
            let id = insert_user(&self.pool, name);
            self.ledger
                .join_club(id, &self.club.code, Role::Member)
                .await
                .unwrap();
            id
        }
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn new_entry_starts_empty() {
        let f = fixture().await;
        let entry = f.engine.get_entry(f.owner, f.club.id).await.unwrap();
        assert_eq!(entry.score, 0);
        assert_eq!((entry.current_streak, entry.longest_streak), (0, 0));
        assert_eq!(entry.last_checked_in, None);
    }

    #[tokio::test]
    async fn update_score_adds_delta_and_starts_streak() {
        let f = fixture().await;
        let entry = f
            .engine
            .update_score(f.owner, f.club.id, 10, day(1, 9))
            .await
            .unwrap();
        assert_eq!(entry.score, 10);
        assert_eq!(entry.current_streak, 1);
        assert_eq!(entry.last_checked_in, Some(day(1, 9)));

        let entry = f
            .engine
            .update_score(f.owner, f.club.id, -3, day(2, 9))
            .await
            .unwrap();
        assert_eq!(entry.score, 7);
        assert_eq!(entry.current_streak, 2);
    }

    #[tokio::test]
    async fn streak_sequence_through_engine() {
        let f = fixture().await;
        let e = &f.engine;

        e.update_score(f.owner, f.club.id, 1, day(1, 9)).await.unwrap();
        let d2 = e.update_score(f.owner, f.club.id, 1, day(2, 21)).await.unwrap();
        assert_eq!((d2.current_streak, d2.longest_streak), (2, 2));

        let d4 = e.update_score(f.owner, f.club.id, 1, day(4, 7)).await.unwrap();
        assert_eq!((d4.current_streak, d4.longest_streak), (1, 2));

        // Same day: counters and last_checked_in frozen, score still moves
        let again = e.update_score(f.owner, f.club.id, 1, day(4, 18)).await.unwrap();
        assert_eq!((again.current_streak, again.longest_streak), (1, 2));
        assert_eq!(again.last_checked_in, Some(day(4, 7)));
        assert_eq!(again.score, 4);
    }

    #[tokio::test]
    async fn update_score_without_entry_is_not_found() {
        let f = fixture().await;
        let stranger = insert_user(&f.pool, "stranger");
        let err = f
            .engine
            .update_score(stranger, f.club.id, 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let activity: i64 = f
            .pool
            .get()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM activity_logs WHERE user_id = ?1",
                params![stranger],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(activity, 0);
    }

    #[tokio::test]
    async fn update_score_journals_with_club_action() {
        let f = fixture().await;
        f.engine
            .update_score(f.owner, f.club.id, 10, Utc::now())
            .await
            .unwrap();

        let conn = f.pool.get().unwrap();
        let (action, updated): (String, i64) = conn
            .query_row(
                "SELECT action, updated_score FROM activity_logs WHERE user_id = ?1 AND club_id = ?2",
                params![f.owner, f.club.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((action.as_str(), updated), ("pages read", 10));

        let narration: String = conn
            .query_row(
                "SELECT message FROM messages WHERE club_id = ?1 AND type = 'system'",
                params![f.club.id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(narration, "owner increased their count by 10 pages read");
    }

    #[tokio::test]
    async fn set_score_overwrites_without_streak() {
        let f = fixture().await;
        f.engine
            .update_score(f.owner, f.club.id, 5, day(1, 9))
            .await
            .unwrap();
        let entry = f
            .engine
            .set_score(f.owner, f.club.id, 42, day(5, 9))
            .await
            .unwrap();
        assert_eq!(entry.score, 42);
        assert_eq!(entry.current_streak, 1);
        assert_eq!(entry.last_checked_in, Some(day(5, 9)));
    }

    #[tokio::test]
    async fn rank_agrees_with_list_top() {
        let f = fixture().await;
        let bob = f.member("bob").await;
        let carol = f.member("carol").await;
        let dave = f.member("dave").await;

        f.engine.update_score(bob, f.club.id, 30, day(1, 9)).await.unwrap();
        f.engine.update_score(carol, f.club.id, 20, day(1, 8)).await.unwrap();
        // Same score as carol, later check-in
        f.engine.update_score(dave, f.club.id, 20, day(1, 10)).await.unwrap();

        let top = f.engine.list_top(f.club.id, 10).await.unwrap();
        let order: Vec<UserId> = top.iter().map(|e| e.user_id).collect();
        assert_eq!(order, vec![bob, carol, dave, f.owner]);

        let mut sorted = top.clone();
        sorted.sort_by(compare_standing);
        assert_eq!(sorted, top);

        for (position, entry) in top.iter().enumerate() {
            let rank = f.engine.rank(entry.user_id, f.club.id).await.unwrap();
            assert_eq!(rank, position as i64 + 1);
        }

        let page = f.engine.list_top(f.club.id, 2).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn rank_of_missing_entry_is_not_found() {
        let f = fixture().await;
        let err = f.engine.rank(UserId(999), f.club.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn percentile_and_leader() {
        let f = fixture().await;
        assert_eq!(
            f.engine.percentile(f.owner, f.club.id).await.unwrap(),
            "Top 100%"
        );

        let bob = f.member("bob").await;
        f.engine.update_score(bob, f.club.id, 3, Utc::now()).await.unwrap();

        assert_eq!(f.engine.leader_id(f.club.id).await.unwrap(), Some(bob));
        assert_eq!(f.engine.percentile(bob, f.club.id).await.unwrap(), "Top 50%");
        assert_eq!(
            f.engine.percentile(f.owner, f.club.id).await.unwrap(),
            "Top 100%"
        );
    }

    #[tokio::test]
    async fn leader_of_empty_club_is_none() {
        let f = fixture().await;
        assert_eq!(f.engine.leader_id(ClubId(999)).await.unwrap(), None);
    }

    #[test]
    fn next_check_in_adds_cooldown() {
        let scoring = ScoringConfig {
            increment: 1,
            cooldown_minutes: 90,
        };
        let mut entry = LeaderboardEntry {
            id: 1,
            user_id: UserId(1),
            club_id: ClubId(1),
            score: 0,
            current_streak: 0,
            longest_streak: 0,
            last_checked_in: None,
        };
        assert_eq!(next_check_in(&entry, &scoring), None);

        entry.last_checked_in = Some(day(1, 9));
        assert_eq!(
            next_check_in(&entry, &scoring),
            Some(day(1, 10) + Duration::minutes(30))
        );

        let unbounded = ScoringConfig {
            increment: 1,
            cooldown_minutes: i64::MAX,
        };
        assert_eq!(next_check_in(&entry, &unbounded), None);
    }
}
