pub mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use memory::InMemoryUserRepository;
pub use repo::{PgUserRepository, RepoError, UserRepository};
pub use repo_types::{NewUser, Role, User};
pub use services::UserService;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
