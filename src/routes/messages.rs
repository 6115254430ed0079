use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{ChatMessage, ClubId, Message, MessageId};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::{page_size, require_member};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/clubs/{id}/messages", get(list_messages).post(post_message))
}

#[derive(Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Deserialize)]
pub struct NewMessage {
    pub message: String,
    pub reply_to_id: Option<MessageId>,
}

async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    Query(query): Query<MessageQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    require_member(&state, user.id, club_id).await?;

    let limit = page_size(query.limit, state.config.pagination.messages_limit);
    let messages = state.chat.list(club_id, limit, query.offset).await?;
    Ok(Json(messages))
}

async fn post_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(club_id): Path<ClubId>,
    Json(body): Json<NewMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    require_member(&state, user.id, club_id).await?;

    let message = state
        .chat
        .post(club_id, user.id, &body.message, body.reply_to_id)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
