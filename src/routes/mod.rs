pub mod auth;
pub mod clubs;
pub mod health;
pub mod leaderboard;
pub mod messages;
pub mod stats;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::models::{Club, ClubId, UserId};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upper bound on any page size a client may request.
pub const MAX_PAGE: u32 = 200;

/// The full HTTP surface, with tracing and CORS applied.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(clubs::router())
        .merge(leaderboard::router())
        .merge(stats::router())
        .merge(messages::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins))
}

/// Load the club and check the caller belongs to it.
pub(crate) async fn require_member(
    state: &AppState,
    user: UserId,
    club_id: ClubId,
) -> AppResult<Club> {
    let club = state.clubs.get_club(club_id).await?;
    if !state.members.is_member(user, club_id).await? {
        return Err(AppError::Forbidden("not a member of this club".into()));
    }
    Ok(club)
}

pub(crate) fn page_size(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_PAGE)
}
