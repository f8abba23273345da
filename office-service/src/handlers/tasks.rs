use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{CreateTask, ListTasksFilter, Task, TaskPriority, TaskStatus, UpdateTask};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub assignee_id: Option<i64>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub assignee_id: Option<i64>,
    pub ticket_id: Option<i64>,
    pub customer_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub assignee_id: Option<i64>,
}

async fn load_task(state: &AppState, task_id: i64) -> Result<Task, AppError> {
    state
        .db
        .get_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Task {} not found", task_id)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state
        .db
        .list_tasks(&ListTasksFilter {
            assignee_id: query.assignee_id,
            status: query.status,
        })
        .await?;

    Ok(Json(tasks))
}

#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state
        .db
        .create_task(&CreateTask {
            title: request.title.trim().to_string(),
            description: request.description,
            priority: request.priority.unwrap_or(TaskPriority::Medium),
            due_date: request.due_date,
            assignee_id: request.assignee_id,
            creator_id: user.id(),
            ticket_id: request.ticket_id,
            customer_id: request.customer_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(load_task(&state, task_id).await?))
}

/// Admins, the creator and the assignee may edit a task.
#[tracing::instrument(skip(state, user, request), fields(user_id = user.id()))]
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let task = load_task(&state, task_id).await?;
    let allowed =
        user.is_admin() || task.creator_id == user.id() || task.assignee_id == Some(user.id());
    if !allowed {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only an administrator, the creator or the assignee can edit this task"
        )));
    }

    let task = state
        .db
        .update_task(
            task_id,
            &UpdateTask {
                title: request.title.map(|t| t.trim().to_string()),
                description: request.description,
                status: request.status,
                priority: request.priority,
                due_date: request.due_date,
                assignee_id: request.assignee_id,
            },
        )
        .await?;

    Ok(Json(task))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id()))]
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let task = load_task(&state, task_id).await?;
    if !user.is_admin() && task.creator_id != user.id() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only an administrator or the creator can delete this task"
        )));
    }

    state.db.delete_task(task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
