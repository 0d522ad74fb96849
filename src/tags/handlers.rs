use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use crate::auth::jwt::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::tags::dto::{CreateTagRequest, TagRead};
use crate::tags::repo::Tag;

pub fn tag_routes() -> Router<AppState> {
    Router::new().route("/tags", get(list_tags).post(create_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<TagRead>>, ApiError> {
    let tags = Tag::list_by_user(&state.db, user_id).await?;
    Ok(Json(tags.into_iter().map(TagRead::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<TagRead>), ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name", "This field may not be blank."));
    }

    let tag = Tag::create(&state.db, user_id, name).await?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}
