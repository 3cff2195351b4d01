use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Action, ListOrder, Notification, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::services::notifications::{resolve_recipients, GenerateRequest, NotificationService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/:user/notifications", get(list_notifications))
        .route("/users/:user/notifications/count", get(count_notifications))
        .route(
            "/users/:user/notifications/:id",
            get(get_notification).delete(delete_notification),
        )
        .route("/notifications", delete(delete_matching))
        .route("/notifications/generate", post(generate_notifications))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub since_id: Option<i64>,
    pub limit: Option<i64>,
    pub order: Option<ListOrder>,
    pub app: Option<String>,
    pub object_type_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub app: Option<String>,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMatchingQuery {
    pub app: Option<String>,
    pub user: Option<String>,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub user: Option<String>,
    pub group: Option<String>,
    pub subject: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub app: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub object_type: String,
    pub object_id: String,
    pub subject: String,
    pub subject_parameters: Vec<String>,
    pub message: String,
    pub message_parameters: Vec<String>,
    pub link: String,
    pub actions: Vec<Action>,
}

impl NotificationResponse {
    fn new(id: i64, n: Notification) -> Self {
        NotificationResponse {
            id,
            app: n.app,
            user: n.user,
            timestamp: n.timestamp,
            object_type: n.object_type,
            object_id: n.object_id,
            subject: n.subject,
            subject_parameters: n.subject_parameters,
            message: n.message,
            message_parameters: n.message_parameters,
            link: n.link,
            actions: n.actions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub items: Vec<NotificationResponse>,
    /// Cursor for the next page; absent once the walk is exhausted.
    pub next_since_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub ids: Vec<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Page through a user's notifications with an exclusive id cursor
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let pagination = &state.config.pagination;
    let limit = query.limit.unwrap_or(pagination.default_limit);
    if limit < 1 || limit > pagination.max_limit {
        return Err(AppError::InvalidArgument(format!(
            "limit must be between 1 and {}",
            pagination.max_limit
        )));
    }

    let app = query.app.filter(|a| !a.is_empty());
    let prefix = query.object_type_prefix.filter(|p| !p.is_empty());
    let filter = move |n: Notification| {
        if app.as_deref().is_some_and(|a| n.app != a) {
            return None;
        }
        if prefix
            .as_deref()
            .is_some_and(|p| !n.object_type.starts_with(p))
        {
            return None;
        }
        Some(n)
    };

    let list = NotificationRepository::fetch_list(
        &state.db,
        &user,
        query.since_id,
        limit,
        query.order.unwrap_or_default(),
        filter,
    )
    .await?;

    let next_since_id = if list.len() as i64 == limit {
        list.keys().last().copied()
    } else {
        None
    };

    Ok(Json(NotificationsListResponse {
        items: list
            .into_iter()
            .map(|(id, n)| NotificationResponse::new(id, n))
            .collect(),
        next_since_id,
    }))
}

/// Count a user's notifications, optionally narrowed by app and object
async fn count_notifications(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Query(query): Query<CountQuery>,
) -> AppResult<Json<CountResponse>> {
    let template = Notification::new()
        .with_user(user)
        .with_app(query.app.unwrap_or_default())
        .with_object(
            query.object_type.unwrap_or_default(),
            query.object_id.unwrap_or_default(),
        );

    let count = NotificationRepository::count(&state.db, &template).await?;

    Ok(Json(CountResponse { count }))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, i64)>,
) -> AppResult<Json<NotificationResponse>> {
    let notification = NotificationRepository::get_by_id(&state.db, id, &user)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

    Ok(Json(NotificationResponse::new(id, notification)))
}

/// Always 204: deleting someone else's notification is a silent no-op.
async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, i64)>,
) -> AppResult<StatusCode> {
    NotificationRepository::delete_by_id(&state.db, id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bulk delete by exact match. At least one field must be given.
async fn delete_matching(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteMatchingQuery>,
) -> AppResult<Json<DeletedResponse>> {
    let template = Notification::new()
        .with_app(query.app.unwrap_or_default())
        .with_user(query.user.unwrap_or_default())
        .with_object(
            query.object_type.unwrap_or_default(),
            query.object_id.unwrap_or_default(),
        );

    if template.is_wildcard() {
        return Err(AppError::InvalidArgument(
            "At least one of app, user, object_type or object_id is required".to_string(),
        ));
    }

    let deleted = NotificationRepository::delete(&state.db, &template).await?;
    tracing::info!("Bulk deleted {} notifications", deleted);

    Ok(Json(DeletedResponse { deleted }))
}

/// Create an administrator notification for a user or every member of a group
async fn generate_notifications(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> AppResult<Json<GenerateResponse>> {
    let recipients = resolve_recipients(state.groups.as_ref(), body.user, body.group).await?;

    let service = NotificationService::new(&state);
    let ids = service
        .generate(GenerateRequest {
            recipients,
            subject: body.subject,
            message: body.message,
        })
        .await?;

    Ok(Json(GenerateResponse { ids }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::services::init::connect_in_memory;
    use crate::services::notifications::StaticGroupDirectory;

    async fn test_state() -> Arc<AppState> {
        let pool = connect_in_memory().await.unwrap();
        Arc::new(AppState {
            db: pool,
            config: Config::default(),
            groups: Arc::new(StaticGroupDirectory::parse("admins=alice,bob")),
        })
    }

    async fn send(
        state: &Arc<AppState>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = crate::routes::app(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn generate(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/notifications/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn seed(state: &Arc<AppState>, user: &str, object_types: &[&str]) -> Vec<i64> {
        let mut ids = Vec::new();
        for object_type in object_types {
            let notification = Notification::new()
                .with_app("files")
                .with_user(user)
                .with_object(*object_type, "1");
            ids.push(NotificationRepository::add(&state.db, &notification).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn list_pages_with_cursor_and_prefix_filter() {
        let state = test_state().await;
        let ids = seed(
            &state,
            "alice",
            &["notification", "blondification", "nonefination", "share"],
        )
        .await;

        let (status, body) = send(&state, get("/api/users/alice/notifications?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], ids[3]);
        assert_eq!(items[1]["id"], ids[2]);
        assert_eq!(body["next_since_id"], ids[2]);

        let uri = format!(
            "/api/users/alice/notifications?since_id={}&object_type_prefix=no",
            ids[2]
        );
        let (_, body) = send(&state, get(&uri)).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["object_type"], "notification");
        assert!(body["next_since_id"].is_null());

        let (_, body) = send(&state, get("/api/users/alice/notifications?order=asc&limit=1")).await;
        assert_eq!(body["items"][0]["id"], ids[0]);
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let state = test_state().await;
        for uri in [
            "/api/users/alice/notifications?limit=0",
            "/api/users/alice/notifications?limit=-5",
            "/api/users/alice/notifications?limit=100000",
        ] {
            let (status, body) = send(&state, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
        }
    }

    #[tokio::test]
    async fn single_notification_is_scoped_to_owner() {
        let state = test_state().await;
        let ids = seed(&state, "alice", &["share"]).await;

        let uri = format!("/api/users/alice/notifications/{}", ids[0]);
        let (status, body) = send(&state, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"], "alice");

        let uri = format!("/api/users/bob/notifications/{}", ids[0]);
        let (status, _) = send(&state, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let delete_as_bob = Request::builder()
            .method("DELETE")
            .uri(format!("/api/users/bob/notifications/{}", ids[0]))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, delete_as_bob).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&state, get("/api/users/alice/notifications/count")).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn count_narrows_by_object_type() {
        let state = test_state().await;
        seed(&state, "alice", &["share", "share", "comment"]).await;
        seed(&state, "bob", &["share"]).await;

        let uri = "/api/users/alice/notifications/count?object_type=share";
        let (_, body) = send(&state, get(uri)).await;
        assert_eq!(body["count"], 2);
        let (_, body) = send(&state, get("/api/users/alice/notifications/count")).await;
        assert_eq!(body["count"], 3);
    }

    #[tokio::test]
    async fn bulk_delete_requires_a_constraint() {
        let state = test_state().await;
        seed(&state, "alice", &["share", "comment"]).await;

        let wildcard = Request::builder()
            .method("DELETE")
            .uri("/api/notifications")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, wildcard).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let by_type = Request::builder()
            .method("DELETE")
            .uri("/api/notifications?object_type=share")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, by_type).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);
    }

    #[tokio::test]
    async fn generate_for_group_and_user() {
        let state = test_state().await;

        let (status, body) = send(
            &state,
            generate(serde_json::json!({ "group": "admins", "subject": "Maintenance" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ids"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &state,
            generate(serde_json::json!({ "user": "carol", "subject": "Hi", "message": "There" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ids"].as_array().unwrap().len(), 1);

        let (_, body) = send(&state, get("/api/users/carol/notifications")).await;
        assert_eq!(body["items"][0]["subject_parameters"][0], "Hi");
        assert_eq!(body["items"][0]["message_parameters"][0], "There");
    }

    #[tokio::test]
    async fn generate_rejects_missing_or_unknown_recipients() {
        let state = test_state().await;

        let (status, body) = send(&state, generate(serde_json::json!({ "subject": "Hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Either user or group needs to be given.");

        let (status, _) = send(
            &state,
            generate(serde_json::json!({ "group": "ghosts", "subject": "Hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
