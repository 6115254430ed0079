use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{ClubId, LeaderboardEntry, UserId, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::{page_size, require_member};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clubs/{id}/leaderboard", get(list_leaderboard))
        .route(
            "/clubs/{id}/leaderboard/score",
            post(update_score).put(set_score),
        )
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct ScoreUpdate {
    pub delta: Option<i64>,
}

#[derive(Deserialize)]
pub struct ScoreSet {
    pub score: i64,
    /// Member whose score is corrected; the caller when absent.
    pub user_id: Option<UserId>,
}

#[derive(Serialize)]
pub struct LeaderboardRow {
    pub rank: i64,
    pub user: UserProfile,
    pub score: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_checked_in: Option<DateTime<Utc>>,
}

async fn list_leaderboard(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Json<Vec<LeaderboardRow>>> {
    require_member(&state, user.id, club_id).await?;

    let limit = page_size(query.limit, state.config.pagination.leaderboard_limit);
    let entries = state.leaderboard.list_top(club_id, limit).await?;
    let ids: Vec<_> = entries.iter().map(|e| e.user_id).collect();
    let mut profiles = state.identity.get_users(&ids).await?;

    let rows = entries
        .into_iter()
        .zip(1..)
        .map(|(entry, rank)| {
            let user = profiles.remove(&entry.user_id).ok_or_else(|| {
                AppError::Internal(format!("entry for unknown user {}", entry.user_id))
            })?;
            Ok(LeaderboardRow {
                rank,
                user,
                score: entry.score,
                current_streak: entry.current_streak,
                longest_streak: entry.longest_streak,
                last_checked_in: entry.last_checked_in,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(rows))
}

async fn update_score(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    body: Option<Json<ScoreUpdate>>,
) -> AppResult<Json<LeaderboardEntry>> {
    require_member(&state, user.id, club_id).await?;

    // A bare POST with no body scores the configured increment.
    let delta = body
        .and_then(|Json(update)| update.delta)
        .unwrap_or(state.leaderboard.scoring().increment);
    let entry = state
        .leaderboard
        .update_score(user.id, club_id, delta, Utc::now())
        .await?;
    Ok(Json(entry))
}

async fn set_score(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    Json(body): Json<ScoreSet>,
) -> AppResult<Json<LeaderboardEntry>> {
    let club = require_member(&state, user.id, club_id).await?;
    if club.created_by != user.id {
        return Err(AppError::Forbidden(
            "only the club creator can set scores".into(),
        ));
    }

    let target = body.user_id.unwrap_or(user.id);
    let entry = state
        .leaderboard
        .set_score(target, club_id, body.score, Utc::now())
        .await?;
    Ok(Json(entry))
}
