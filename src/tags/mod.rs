use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod repo;

pub use dto::TagRead;

pub fn router() -> Router<AppState> {
    handlers::tag_routes()
}
