#![forbid(unsafe_code)]

pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TasklistError;
use crate::task::model::{Task, TaskPatch};
use crate::task::user::User;

/// Request body for batch updates and deletes: `{"todos": [...]}`.
#[derive(Debug, Serialize)]
pub struct TaskBatch<'a> {
    pub todos: &'a [Task],
}

/// The remote collaborators: task store, user directory and session.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, TasklistError>;

    /// `None` when nobody is signed in.
    async fn fetch_session(&self) -> Result<Option<User>, TasklistError>;

    async fn fetch_users(&self) -> Result<Vec<User>, TasklistError>;

    /// Creates or updates `tasks`; returns the server's view of each record.
    async fn save_tasks(&self, tasks: &[Task]) -> Result<Vec<TaskPatch>, TasklistError>;

    async fn delete_tasks(&self, tasks: &[Task]) -> Result<(), TasklistError>;
}
