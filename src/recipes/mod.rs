use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
mod images;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::recipe_routes()
}
