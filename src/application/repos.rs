//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::tasks::{NewTask, Task, TaskStatus, TaskUpdate};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueryFilter {
    pub status: Option<TaskStatus>,
    /// One-based page number.
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[async_trait]
pub trait TasksRepo: Send + Sync {
    async fn create_task(&self, task: NewTask) -> Result<Task, RepoError>;

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, RepoError>;

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task, RepoError>;

    async fn delete_task(&self, id: Uuid) -> Result<(), RepoError>;

    /// Tasks ordered by creation time, oldest first.
    async fn list_tasks(&self, filter: TaskQueryFilter) -> Result<TaskPage, RepoError>;
}
