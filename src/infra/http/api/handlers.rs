//! Task handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::application::tasks::TaskServiceError;
use crate::domain::error::DomainError;
use crate::domain::tasks::{TaskCreate, TaskStatus, TaskUpdate};

use super::error::ApiError;
use super::models::TaskListQuery;
use super::state::ApiState;

pub async fn list_tasks(
    State(state): State<ApiState>,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let query = TaskListQuery::parse(raw.as_deref());
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|err| ApiError::invalid_input(err.to_string()))?;

    let page = state
        .tasks
        .list(status, query.page, query.limit)
        .await
        .map_err(task_to_api)?;

    Ok(Json(page))
}

pub async fn create_task(
    State(state): State<ApiState>,
    payload: Result<Json<TaskCreate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(body_to_api)?;
    let task = state.tasks.create(payload).await.map_err(task_to_api)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = task_id(id)?;
    let task = state.tasks.get(id).await.map_err(task_to_api)?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TaskUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = task_id(id)?;
    let Json(payload) = payload.map_err(body_to_api)?;
    let task = state
        .tasks
        .update(id, payload)
        .await
        .map_err(task_to_api)?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<ApiState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = task_id(id)?;
    state.tasks.delete(id).await.map_err(task_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn task_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|err| ApiError::bad_request("Invalid task id", Some(err.body_text())))
}

fn body_to_api(err: JsonRejection) -> ApiError {
    ApiError::bad_request("Invalid request body", Some(err.body_text()))
}

pub(crate) fn task_to_api(err: TaskServiceError) -> ApiError {
    match err {
        TaskServiceError::Domain(DomainError::NotFound { .. }) => {
            ApiError::not_found("task not found")
        }
        TaskServiceError::Domain(DomainError::Validation { message }) => {
            ApiError::invalid_input(message)
        }
        TaskServiceError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::Persistence(msg) => ApiError::persistence(msg),
    }
}
