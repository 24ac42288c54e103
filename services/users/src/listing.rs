//! Paginated, searchable and sortable listing of active users
//!
//! Raw query parameters are normalized into [`ListOptions`], the sort column
//! and direction are checked against closed allow-lists, and only then is SQL
//! text assembled. `ORDER BY` cannot take bind parameters, so the column and
//! direction written into the query always come from [`SortColumn`] and
//! [`SortOrder`], never from request input.

use std::{fmt, str::FromStr};

use common::error::DatabaseError;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::models::{User, UserListQuery};

/// Page size used when none (or a non-positive one) is requested
pub const DEFAULT_LIMIT: i64 = 10;

/// Upper bound applied to requested page sizes unless configured otherwise
pub const MAX_LIMIT: i64 = 100;

/// Filter shared by the count and page queries; `$1` is the LIKE pattern.
const SEARCH_PREDICATE: &str =
    "deleted_at IS NULL AND (LOWER(name) LIKE LOWER($1) OR LOWER(email) LIKE LOWER($1))";

/// Errors returned by [`list_users`]
#[derive(Error, Debug)]
pub enum ListError {
    /// Sort column outside the allow-list
    #[error("invalid sort field `{0}`")]
    InvalidSort(String),

    /// Sort direction other than ASC or DESC
    #[error("invalid sort order `{0}`")]
    InvalidOrder(String),

    /// Count or page query failed
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Columns a listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Name,
    Email,
    CreatedAt,
}

impl SortColumn {
    pub const ALL: [SortColumn; 4] = [
        SortColumn::Id,
        SortColumn::Name,
        SortColumn::Email,
        SortColumn::CreatedAt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Name => "name",
            SortColumn::Email => "email",
            SortColumn::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortColumn {
    type Err = ListError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.to_ascii_lowercase();
        SortColumn::ALL
            .into_iter()
            .find(|column| column.as_str() == wanted)
            .ok_or_else(|| ListError::InvalidSort(value.to_string()))
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ListError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            _ => Err(ListError::InvalidOrder(value.to_string())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated column/direction pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: SortColumn,
    pub order: SortOrder,
}

impl SortSpec {
    /// `ORDER BY` body. Non-id columns get `id` as tie-break so pages do
    /// not overlap when sort values repeat.
    fn order_by(&self) -> String {
        match self.column {
            SortColumn::Id => format!("id {}", self.order),
            column => format!("{} {}, id {}", column, self.order, self.order),
        }
    }
}

/// Fully defaulted listing options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Trimmed, lower-cased search term; empty matches everything
    pub search: String,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: String,
    pub order: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            search: String::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort_by: SortColumn::Id.as_str().to_string(),
            order: SortOrder::Asc.as_str().to_string(),
        }
    }
}

impl ListOptions {
    /// Normalize a page-numbered request. Returns the options and the
    /// effective page number.
    pub fn paged(query: &UserListQuery, max_limit: i64) -> (Self, i64) {
        let limit = normalize_limit(query.limit.as_deref(), max_limit);
        let page = parse_number(query.page.as_deref())
            .filter(|page| *page >= 1)
            .unwrap_or(1);
        let offset = (page - 1).saturating_mul(limit);

        (Self::with_window(query, limit, offset), page)
    }

    /// Normalize an offset-based request
    pub fn offset(query: &UserListQuery, max_limit: i64) -> Self {
        let limit = normalize_limit(query.limit.as_deref(), max_limit);
        let offset = parse_number(query.offset.as_deref())
            .filter(|offset| *offset >= 0)
            .unwrap_or(0);

        Self::with_window(query, limit, offset)
    }

    fn with_window(query: &UserListQuery, limit: i64, offset: i64) -> Self {
        let defaults = Self::default();
        Self {
            search: query
                .search
                .as_deref()
                .map(|term| term.trim().to_ascii_lowercase())
                .unwrap_or_default(),
            limit,
            offset,
            sort_by: non_empty(query.sort.as_deref()).unwrap_or(defaults.sort_by),
            order: non_empty(query.order.as_deref()).unwrap_or(defaults.order),
        }
    }

    /// Check the sort column and direction against their allow-lists
    pub fn sort_spec(&self) -> Result<SortSpec, ListError> {
        Ok(SortSpec {
            column: self.sort_by.parse()?,
            order: self.order.parse()?,
        })
    }

    /// LIKE pattern for the search term, `%` when there is none
    pub fn search_pattern(&self) -> String {
        // Non-ASCII folding is left to LOWER() in SQL so both sides use the
        // database collation.
        let term = self.search.trim().to_ascii_lowercase();
        if term.is_empty() {
            return "%".to_string();
        }

        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse().ok())
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn normalize_limit(raw: Option<&str>, max_limit: i64) -> i64 {
    let limit = parse_number(raw)
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_LIMIT);
    limit.min(max_limit.max(1))
}

/// `ceil(total / limit)`, zero for an empty result
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 || total <= 0 {
        return 0;
    }
    (total - 1) / limit + 1
}

fn count_sql() -> String {
    format!("SELECT COUNT(*) FROM users WHERE {SEARCH_PREDICATE}")
}

fn page_sql(sort: &SortSpec) -> String {
    format!(
        "SELECT id, name, email, created_at, deleted_at FROM users WHERE {} ORDER BY {} LIMIT $2 OFFSET $3",
        SEARCH_PREDICATE,
        sort.order_by()
    )
}

/// Fetch one page of active users together with the total number of matches
///
/// Validation happens before any connection is taken from the pool. Both
/// queries run in one read-only repeatable-read transaction, so `total`
/// describes the same snapshot as the returned page. Dropping the future
/// rolls the transaction back.
pub async fn list_users(
    pool: &PgPool,
    options: &ListOptions,
) -> Result<(Vec<User>, i64), ListError> {
    let sort = options.sort_spec()?;
    let pattern = options.search_pattern();

    debug!(
        limit = options.limit,
        offset = options.offset,
        sort = %sort.column,
        order = %sort.order,
        "Listing users"
    );

    let mut tx = pool.begin().await.map_err(DatabaseError::Connection)?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

    let total: i64 = sqlx::query_scalar(&count_sql())
        .bind(&pattern)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

    let rows = sqlx::query(&page_sql(&sort))
        .bind(&pattern)
        .bind(options.limit)
        .bind(options.offset)
        .fetch_all(&mut *tx)
        .await
        .map_err(DatabaseError::Query)?;

    tx.commit().await.map_err(DatabaseError::Query)?;

    let users = rows
        .iter()
        .map(User::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((users, total))
}
