use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::session;
use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub avatar_id: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct AvatarRequest {
    pub avatar_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

// -- Handlers --

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = state
        .identity
        .create_user(&body.username, &body.password, &body.avatar_id)
        .await?;
    let token = session::create_session(&state.db, user.id, state.config.auth.session_hours)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = state
        .identity
        .verify_credentials(&body.username, &body.password)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let token = session::create_session(&state.db, user.id, state.config.auth.session_hours)?;

    tracing::info!(user = %user.id, "logged in");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    session::delete_session(&state.db, &user.token)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.identity.get_user(user.id).await?))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<AvatarRequest>,
) -> AppResult<Json<UserProfile>> {
    let avatar_id = body.avatar_id.trim();
    if avatar_id.is_empty() {
        return Err(AppError::BadRequest("avatar_id is required".into()));
    }
    state.identity.update_avatar(user.id, avatar_id).await?;
    Ok(Json(state.identity.get_user(user.id).await?))
}
