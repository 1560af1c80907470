use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, TaskPage, TaskQueryFilter, TasksRepo};
use crate::domain::error::DomainError;
use crate::domain::tasks::{Task, TaskCreate, TaskStatus, TaskUpdate};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TasksRepo>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TasksRepo>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, payload: TaskCreate) -> Result<Task, TaskServiceError> {
        let task = payload.validate(OffsetDateTime::now_utc())?;
        Ok(self.repo.create_task(task).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Task, TaskServiceError> {
        self.repo
            .find_task(id)
            .await?
            .ok_or_else(|| DomainError::not_found("task").into())
    }

    pub async fn update(&self, id: Uuid, update: TaskUpdate) -> Result<Task, TaskServiceError> {
        update.validate(OffsetDateTime::now_utc())?;
        self.repo
            .update_task(id, update)
            .await
            .map_err(not_found_as_domain)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), TaskServiceError> {
        self.repo.delete_task(id).await.map_err(not_found_as_domain)
    }

    /// Page defaults to 1 and limit to [`DEFAULT_PAGE_LIMIT`]; zero counts as absent.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<TaskPage, TaskServiceError> {
        let filter = TaskQueryFilter {
            status,
            page: page.filter(|page| *page >= 1).unwrap_or(1),
            limit: limit
                .filter(|limit| *limit >= 1)
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .min(MAX_PAGE_LIMIT),
        };
        Ok(self.repo.list_tasks(filter).await?)
    }
}

fn not_found_as_domain(err: RepoError) -> TaskServiceError {
    match err {
        RepoError::NotFound => DomainError::not_found("task").into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::infra::db::InMemoryTasks;

    fn service() -> TaskService {
        TaskService::new(Arc::new(InMemoryTasks::new()))
    }

    fn payload(title: &str) -> TaskCreate {
        TaskCreate {
            title: title.to_string(),
            description: String::new(),
            status: None,
            due_date: Some(OffsetDateTime::now_utc() + Duration::days(7)),
        }
    }

    #[tokio::test]
    async fn missing_task_is_domain_not_found() {
        let err = service().get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            TaskServiceError::Domain(DomainError::NotFound { entity: "task" })
        ));
    }

    #[tokio::test]
    async fn delete_missing_task_is_domain_not_found() {
        let err = service().delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            TaskServiceError::Domain(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_applies_defaults_and_cap() {
        let service = service();
        service.create(payload("one")).await.unwrap();

        let page = service.list(None, Some(0), None).await.unwrap();
        assert_eq!((page.page, page.limit), (1, DEFAULT_PAGE_LIMIT));

        let page = service.list(None, None, Some(10_000)).await.unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn invalid_create_never_reaches_repo() {
        let service = service();
        let err = service.create(payload("")).await.unwrap_err();
        assert!(matches!(err, TaskServiceError::Domain(DomainError::Validation { .. })));
        assert_eq!(service.list(None, None, None).await.unwrap().total, 0);
    }
}
