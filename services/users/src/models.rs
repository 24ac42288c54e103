//! API models for request and response payloads

pub mod user;

pub use user::{User, UserListQuery, UserListResponse, UserPageResponse, UserPayload};
