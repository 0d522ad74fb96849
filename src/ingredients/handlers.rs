use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use crate::auth::jwt::AuthUser;
use crate::error::ApiError;
use crate::ingredients::dto::{CreateIngredientRequest, IngredientRead};
use crate::ingredients::repo::Ingredient;
use crate::state::AppState;

pub fn ingredient_routes() -> Router<AppState> {
    Router::new().route("/ingredients", get(list_ingredients).post(create_ingredient))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<IngredientRead>>, ApiError> {
    let ingredients = Ingredient::list_by_user(&state.db, user_id).await?;
    Ok(Json(
        ingredients.into_iter().map(IngredientRead::from).collect(),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<IngredientRead>), ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name", "This field may not be blank."));
    }

    let ingredient = Ingredient::create(&state.db, user_id, name).await?;
    Ok((StatusCode::CREATED, Json(ingredient.into())))
}
