use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod repo;

pub use dto::IngredientRead;

pub fn router() -> Router<AppState> {
    handlers::ingredient_routes()
}
