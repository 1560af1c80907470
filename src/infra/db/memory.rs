use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{RepoError, TaskPage, TaskQueryFilter, TasksRepo};
use crate::domain::tasks::{NewTask, Task, TaskUpdate};

/// Process-local task storage. Tasks are kept in insertion order, which is
/// also creation order.
#[derive(Default)]
pub struct InMemoryTasks {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTasks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TasksRepo for InMemoryTasks {
    async fn create_task(&self, task: NewTask) -> Result<Task, RepoError> {
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4(),
            title: task.title,
            description: task.description,
            status: task.status,
            due_date: task.due_date,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, RepoError> {
        Ok(self
            .tasks
            .read()
            .await
            .iter()
            .find(|task| task.id == id)
            .cloned())
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task, RepoError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(RepoError::NotFound)?;
        task.apply(update, OffsetDateTime::now_utc());
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tasks = self.tasks.write().await;
        let position = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(RepoError::NotFound)?;
        tasks.remove(position);
        Ok(())
    }

    async fn list_tasks(&self, filter: TaskQueryFilter) -> Result<TaskPage, RepoError> {
        let tasks = self.tasks.read().await;
        let matching: Vec<&Task> = tasks
            .iter()
            .filter(|task| filter.status.is_none_or(|status| task.status == status))
            .collect();

        let offset = (filter.page.saturating_sub(1) as usize).saturating_mul(filter.limit as usize);
        let page = matching
            .iter()
            .skip(offset)
            .take(filter.limit as usize)
            .map(|task| (*task).clone())
            .collect();

        Ok(TaskPage {
            tasks: page,
            total: matching.len() as u64,
            page: filter.page,
            limit: filter.limit,
        })
    }
}
