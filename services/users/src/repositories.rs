//! Repositories for database operations

use common::error::DatabaseError;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::{
    listing::{self, ListError, ListOptions},
    models::{User, UserPayload},
};

const USER_COLUMNS: &str = "id, name, email, created_at, deleted_at";

/// Errors returned by single-record user operations
#[derive(Error, Debug)]
pub enum UserError {
    /// No active user with that id
    #[error("User not found")]
    NotFound,

    /// Another active user already has the email
    #[error("Email {0} already exists")]
    EmailTaken(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// User repository for database operations
///
/// Soft-deleted rows are invisible to every method.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, payload: &UserPayload) -> Result<User, UserError> {
        info!(email = %payload.email, "Creating new user");

        if self.email_taken(&payload.email, None).await? {
            return Err(UserError::EmailTaken(payload.email.clone()));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(&payload.name)
        .bind(&payload.email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &payload.email))?;

        Ok(User::from_row(&row)?)
    }

    /// Find an active user by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserError> {
        if id <= 0 {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        match row {
            Some(row) => Ok(Some(User::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Get one page of active users and the total number of matches
    pub async fn list(&self, options: &ListOptions) -> Result<(Vec<User>, i64), ListError> {
        let (users, total) = listing::list_users(&self.pool, options).await?;
        info!(returned = users.len(), total, "Listed users");
        Ok((users, total))
    }

    /// Replace the name and email of an active user
    pub async fn update(&self, id: i64, payload: &UserPayload) -> Result<User, UserError> {
        if id <= 0 {
            return Err(UserError::NotFound);
        }
        info!(user_id = id, "Updating user");

        if self.email_taken(&payload.email, Some(id)).await? {
            return Err(UserError::EmailTaken(payload.email.clone()));
        }

        let row = sqlx::query(&format!(
            "UPDATE users SET name = $1, email = $2 \
             WHERE id = $3 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        ))
        .bind(&payload.name)
        .bind(&payload.email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, &payload.email))?
        .ok_or(UserError::NotFound)?;

        Ok(User::from_row(&row)?)
    }

    /// Mark an active user as deleted; the row is kept
    pub async fn soft_delete(&self, id: i64) -> Result<(), UserError> {
        if id <= 0 {
            return Err(UserError::NotFound);
        }
        info!(user_id = id, "Soft-deleting user");

        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    /// Whether an active user other than `except` uses the email
    async fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool, DatabaseError> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE email = $1 AND deleted_at IS NULL
                  AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }
}

/// A concurrent insert can slip past `email_taken`; the partial unique
/// index catches it.
fn write_error(err: sqlx::Error, email: &str) -> UserError {
    let err = DatabaseError::Query(err);
    if err.is_unique_violation() {
        UserError::EmailTaken(email.to_string())
    } else {
        UserError::Storage(err)
    }
}
