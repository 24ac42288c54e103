//! User CRUD service over PostgreSQL
//!
//! Users are created, read, listed, updated and soft-deleted over HTTP. The
//! listing path ([`listing`]) validates sort input against allow-lists before
//! building SQL and returns a page together with the total match count.

pub mod config;
pub mod error;
pub mod listing;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use routes::create_router;
pub use state::AppState;
