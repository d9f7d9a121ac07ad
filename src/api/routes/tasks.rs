//! Task handlers.

use super::{CreateTaskRequest, CreateTaskResponse, ListTasksQuery, TaskResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{TaskId, TaskStatus};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /tasks - Submit a batch of URLs
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task admitted", body = CreateTaskResponse),
        (status = 400, description = "Invalid URL list", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return Error::Validation(rejection.body_text()).into_response(),
    };

    match state.downloader.create_task(request.urls).await {
        Ok(task) => (
            StatusCode::CREATED,
            Json(CreateTaskResponse { task_id: task.id }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /tasks/:id - Get a single task
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID (UUID)")
    ),
    responses(
        (status = 200, description = "Task state", body = TaskResponse),
        (status = 400, description = "Malformed task ID", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id: TaskId = match id.parse() {
        Ok(id) => id,
        Err(e) => return Error::Validation(format!("invalid task id {id:?}: {e}")).into_response(),
    };

    match state.downloader.get_task(id).await {
        Ok(task) => (StatusCode::OK, Json(TaskResponse::from(task))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /tasks - List tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(
        ("status" = Option<TaskStatus>, Query, description = "Only return tasks with this status")
    ),
    responses(
        (status = 200, description = "Tasks ordered by creation time", body = Vec<TaskResponse>)
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> impl IntoResponse {
    let tasks: Vec<TaskResponse> = state
        .downloader
        .list_tasks(query.status)
        .await
        .into_iter()
        .map(TaskResponse::from)
        .collect();

    (StatusCode::OK, Json(tasks))
}
