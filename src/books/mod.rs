use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod files;
pub mod handlers;
pub mod repo;
pub mod repo_types;

pub fn router() -> Router<AppState> {
    handlers::book_routes()
}
