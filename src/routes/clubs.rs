use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clubs::ClubDetails;
use crate::db::models::{Club, ClubId, Membership, Role, UserProfile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::leaderboard::next_check_in;
use crate::routes::require_member;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clubs", post(create_club).get(list_clubs))
        .route("/clubs/{id}", put(update_club))
        .route("/clubs/join/{code}", post(join_club))
        .route("/clubs/{id}/members", get(list_members).delete(leave_club))
}

/// A club as seen by one member.
#[derive(Serialize)]
pub struct ClubResponse {
    #[serde(flatten)]
    pub club: Club,
    pub member_count: i64,
    pub rank: i64,
    pub score: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_checked_in: Option<DateTime<Utc>>,
    pub next_check_in: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct MemberResponse {
    pub user: UserProfile,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

async fn club_response(state: &AppState, user: &CurrentUser, club: Club) -> AppResult<ClubResponse> {
    let member_count = state.members.count_members(club.id).await?;
    let entry = state.leaderboard.get_entry(user.id, club.id).await?;
    let rank = state.leaderboard.rank(user.id, club.id).await?;

    Ok(ClubResponse {
        member_count,
        rank,
        score: entry.score,
        current_streak: entry.current_streak,
        longest_streak: entry.longest_streak,
        last_checked_in: entry.last_checked_in,
        next_check_in: next_check_in(&entry, state.leaderboard.scoring()),
        club,
    })
}

async fn create_club(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(details): Json<ClubDetails>,
) -> AppResult<(StatusCode, Json<ClubResponse>)> {
    let club = state.clubs.create_club(user.id, details).await?;
    let response = club_response(&state, &user, club).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_clubs(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ClubResponse>>> {
    let clubs = state.members.list_clubs_for_user(user.id).await?;

    let mut responses = Vec::with_capacity(clubs.len());
    for club in clubs {
        responses.push(club_response(&state, &user, club).await?);
    }
    Ok(Json(responses))
}

async fn update_club(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    Json(details): Json<ClubDetails>,
) -> AppResult<Json<Club>> {
    let club = state.clubs.update_club(club_id, user.id, details).await?;
    Ok(Json(club))
}

async fn join_club(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<String>,
) -> AppResult<(StatusCode, Json<ClubResponse>)> {
    let membership = state.members.join_club(user.id, &code, Role::Member).await?;
    let club = state.clubs.get_club(membership.club_id).await?;
    let response = club_response(&state, &user, club).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<Json<Vec<MemberResponse>>> {
    require_member(&state, user.id, club_id).await?;

    let members = state.members.list_members(club_id).await?;
    let ids: Vec<_> = members.iter().map(|m| m.user_id).collect();
    let mut profiles = state.identity.get_users(&ids).await?;

    let responses = members
        .into_iter()
        .map(|Membership { user_id, role, joined_at, .. }| {
            let user = profiles
                .remove(&user_id)
                .ok_or_else(|| AppError::Internal(format!("member {user_id} has no user record")))?;
            Ok(MemberResponse {
                user,
                role,
                joined_at,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(responses))
}

async fn leave_club(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
) -> AppResult<StatusCode> {
    state.members.leave_club(user.id, club_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
