use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::models::{ClubId, UserId, UserProfile};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::leaderboard::next_check_in;
use crate::routes::require_member;
use crate::state::AppState;

/// Days shown in the stats graph, today included.
const GRAPH_DAYS: u64 = 7;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clubs/{id}/stats/me", get(my_stats))
        .route("/clubs/{id}/stats/{user_id}", get(user_stats))
}

#[derive(Serialize)]
pub struct GraphPoint {
    pub day: String,
    pub date: NaiveDate,
    pub scores: BTreeMap<String, i64>,
}

#[derive(Serialize)]
pub struct WeeklyPoint {
    pub date: NaiveDate,
    pub points: i64,
}

#[derive(Serialize)]
pub struct UserStats {
    pub user: UserProfile,
    pub score: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_checked_in: Option<DateTime<Utc>>,
    pub next_check_in: Option<DateTime<Utc>>,
    pub rank: i64,
    pub percentile: String,
    pub leader_id: Option<UserId>,
    pub graph_data: Vec<GraphPoint>,
    pub weekly_activity: Vec<WeeklyPoint>,
}

async fn my_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<UserStats>> {
    require_member(&state, user.id, club_id).await?;
    Ok(Json(build_stats(&state, user.id, club_id, Utc::now()).await?))
}

async fn user_stats(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((club_id, target)): Path<(ClubId, UserId)>,
) -> AppResult<Json<UserStats>> {
    require_member(&state, user.id, club_id).await?;
    Ok(Json(build_stats(&state, target, club_id, Utc::now()).await?))
}

async fn build_stats(
    state: &AppState,
    user: UserId,
    club_id: ClubId,
    now: DateTime<Utc>,
) -> AppResult<UserStats> {
    let profile = state.identity.get_user(user).await?;
    let entry = state.leaderboard.get_entry(user, club_id).await?;
    let rank = state.leaderboard.rank(user, club_id).await?;
    let percentile = state.leaderboard.percentile(user, club_id).await?;
    let leader_id = state.leaderboard.leader_id(club_id).await?;

    tracing::debug!(user = %user, club_id = %club_id, rank, "building stats");

    let today = now.date_naive();
    let mut graph_data = Vec::with_capacity(GRAPH_DAYS as usize);
    for back in (0..GRAPH_DAYS).rev() {
        let Some(date) = today.checked_sub_days(Days::new(back)) else {
            continue;
        };
        let scores = state
            .journal
            .daily_scores_for_club(club_id, date, user)
            .await?;
        graph_data.push(GraphPoint {
            day: date.format("%a").to_string(),
            date,
            scores,
        });
    }

    let weekly_activity = state
        .journal
        .weekly_activity(club_id, user, today)
        .await?
        .into_iter()
        .map(|(date, points)| WeeklyPoint { date, points })
        .collect();

    Ok(UserStats {
        user: profile,
        score: entry.score,
        current_streak: entry.current_streak,
        longest_streak: entry.longest_streak,
        last_checked_in: entry.last_checked_in,
        next_check_in: next_check_in(&entry, state.leaderboard.scoring()),
        rank,
        percentile,
        leader_id,
        graph_data,
        weekly_activity,
    })
}
