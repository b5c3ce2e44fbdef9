use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod service;

pub use extractors::{require_auth, AuthUser};
pub use service::AuthService;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
