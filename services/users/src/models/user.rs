//! User model, request payloads and list responses

use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Map a `users` row, failing instead of panicking on a missing or
    /// mistyped column
    pub fn from_row(row: &PgRow) -> DatabaseResult<Self> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            email: column(row, "email")?,
            created_at: column(row, "created_at")?,
            deleted_at: column(row, "deleted_at")?,
        })
    }
}

fn column<'r, T>(row: &'r PgRow, name: &'static str) -> DatabaseResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|source| DatabaseError::Mapping {
            column: name,
            source,
        })
}

/// Body of create and update requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl UserPayload {
    /// Trim both fields; `None` when either one ends up empty
    pub fn normalized(&self) -> Option<UserPayload> {
        let name = self.name.trim();
        let email = self.email.trim();
        if name.is_empty() || email.is_empty() {
            return None;
        }
        Some(UserPayload {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Query parameters for user listing
///
/// Everything is kept as raw text: malformed numbers fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    /// Page number (1-based), page-numbered listing only
    pub page: Option<String>,
    /// Row offset, offset listing only
    pub offset: Option<String>,
    /// Number of items per page
    pub limit: Option<String>,
    /// Case-insensitive substring matched against name and email
    pub search: Option<String>,
    /// Sort column
    #[serde(alias = "sort_by", alias = "sortBy")]
    pub sort: Option<String>,
    /// Sort order (asc or desc)
    pub order: Option<String>,
}

/// Response for the page-numbered listing
#[derive(Debug, Clone, Serialize)]
pub struct UserPageResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub data: Vec<User>,
}

/// Response for the offset listing
#[derive(Debug, Clone, Serialize)]
pub struct UserListResponse {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
    pub total_pages: i64,
    pub sort: String,
    pub order: String,
    pub users: Vec<User>,
}
