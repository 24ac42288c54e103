//! Application state shared across handlers

use sqlx::PgPool;

use crate::repositories::UserRepository;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub user_repository: UserRepository,
    /// Upper bound for the `limit` query parameter
    pub max_page_size: i64,
}

impl AppState {
    pub fn new(db_pool: PgPool, max_page_size: i64) -> Self {
        Self {
            user_repository: UserRepository::new(db_pool.clone()),
            db_pool,
            max_page_size: max_page_size.max(1),
        }
    }
}
