use crate::state::AppState;
use axum::Router;

pub mod clock;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod memory;
mod password;
pub mod pg;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod store;
mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::user_routes())
}
