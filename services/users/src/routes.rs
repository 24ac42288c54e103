//! Users service routes

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    listing::{ListOptions, total_pages},
    models::{UserListQuery, UserListResponse, UserPageResponse, UserPayload},
};

/// Create the router for the users service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/users", get(get_users).post(create_user))
        .route("/users/list", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match common::database::health_check(&state.db_pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "users-api"
            })),
        ),
        Err(e) => {
            error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "service": "users-api"
                })),
            )
        }
    }
}

/// Create a new user
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let payload = valid_payload(payload)?;
    let user = state.user_repository.create(&payload).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Get users page by page
pub async fn get_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<impl IntoResponse> {
    let (options, page) = ListOptions::paged(&query, state.max_page_size);
    let (users, total) = state.user_repository.list(&options).await?;

    Ok(Json(UserPageResponse {
        page,
        limit: options.limit,
        total,
        total_pages: total_pages(total, options.limit),
        data: users,
    }))
}

/// Get users with an explicit offset
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<impl IntoResponse> {
    let options = ListOptions::offset(&query, state.max_page_size);
    let sort = options.sort_spec()?;
    let (users, total) = state.user_repository.list(&options).await?;

    Ok(Json(UserListResponse {
        limit: options.limit,
        offset: options.offset,
        total,
        total_pages: total_pages(total, options.limit),
        sort: sort.column.as_str().to_string(),
        order: sort.order.as_str().to_string(),
        users,
    }))
}

/// Get a user by ID
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_user_id(&id)?;
    let user = state
        .user_repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Replace a user's name and email
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_user_id(&id)?;
    let payload = valid_payload(payload)?;
    state.user_repository.update(id, &payload).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Soft-delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_user_id(&id)?;
    state.user_repository.soft_delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

fn parse_user_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest("Invalid user ID".to_string()))
}

fn valid_payload(payload: Result<Json<UserPayload>, JsonRejection>) -> ApiResult<UserPayload> {
    let Json(payload) = payload.map_err(|e| {
        debug!(error = %e, "Rejected request body");
        ApiError::BadRequest("Invalid request payload".to_string())
    })?;

    payload
        .normalized()
        .ok_or_else(|| ApiError::BadRequest("Name and email are required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::Value;
    use crate::test_support::unreachable_pool;
    use tower::ServiceExt;

    /// Router over a pool that can never connect: anything reaching storage
    /// answers 500/503.
    fn app() -> Router {
        create_router(AppState::new(unreachable_pool(), 100))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn invalid_sort_is_a_bad_request() {
        let (status, body) = send(get("/users?sort=drop%20table%20users")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid sort: allowed id,name,email,created_at");

        let (status, _) = send(get("/users/list?sort=password")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_order_is_a_bad_request() {
        let (status, body) = send(get("/users/list?order=SIDEWAYS")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid order: allowed ASC,DESC");
    }

    #[tokio::test]
    async fn storage_failure_is_an_internal_error() {
        let (status, body) = send(get("/users?page=2&limit=5&search=ali")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error");
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        for uri in ["/users/abc", "/users/0", "/users/-4"] {
            let (status, body) = send(get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "Invalid user ID");
        }

        let request = Request::builder()
            .method("DELETE")
            .uri("/users/nope")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_requires_name_and_email() {
        let (status, body) = send(with_json("POST", "/users", r#"{"name":"Alice"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Name and email are required");

        let (status, body) = send(with_json("POST", "/users", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request payload");
    }

    #[tokio::test]
    async fn update_validates_before_storage() {
        let (status, _) = send(with_json("PUT", "/users/3", r#"{"name":" ","email":"a@x.com"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(with_json("PUT", "/users/x", r#"{"name":"A","email":"a@x.com"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_unavailable_database() {
        let (status, body) = send(get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["service"], "users-api");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let request = Request::builder()
            .method("PATCH")
            .uri("/users")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
