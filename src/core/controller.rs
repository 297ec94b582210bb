#![forbid(unsafe_code)]

use crate::api::TaskBackend;
use crate::core::state::TaskListState;
use crate::error::TasklistError;
use crate::task::model::{Task, TaskId, TaskStatus};
use crate::task::user::User;

const CONFIRM_DELETE_ONE: &str = "Êtes-vous sûr de vouloir supprimer cette tâche ?";
const CONFIRM_DELETE_MANY: &str = "Êtes-vous sûr de vouloir supprimer ces tâches ?";

/// Confirmation prompt for deleting `count` tasks.
#[must_use]
pub fn delete_prompt(count: usize) -> &'static str {
    if count < 2 {
        CONFIRM_DELETE_ONE
    } else {
        CONFIRM_DELETE_MANY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing to delete; no prompt, no request.
    Nothing,
    Declined,
    Deleted(usize),
}

/// Owns the task list state and keeps it in sync with the backend.
#[derive(Debug)]
pub struct TaskListController<B> {
    backend: B,
    state: TaskListState,
}

impl<B: TaskBackend> TaskListController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: TaskListState::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> &TaskListState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TaskListState {
        &mut self.state
    }

    /// Fetches tasks, session and users concurrently. Every source that
    /// loaded is applied; the first failure (in that order) is returned.
    pub async fn load_all(&mut self) -> Result<(), TasklistError> {
        let (tasks, session, users) = tokio::join!(
            self.backend.fetch_tasks(),
            self.backend.fetch_session(),
            self.backend.fetch_users(),
        );

        let mut first_err = None;
        match tasks {
            Ok(tasks) => {
                tracing::info!(count = tasks.len(), "tasks loaded");
                self.state.set_tasks(tasks);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load tasks");
                first_err.get_or_insert(e);
            }
        }
        match session {
            Ok(user) => {
                tracing::info!(user = ?user.as_ref().map(|u| &u.username), "session loaded");
                self.state.set_current_user(user);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load session");
                first_err.get_or_insert(e);
            }
        }
        match users {
            Ok(users) => {
                tracing::info!(count = users.len(), "users loaded");
                self.state.set_users(users);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load users");
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Sends `tasks` as one batch and reconciles the answer. Closes the
    /// editor on success; on failure the editor and local edits are kept.
    pub async fn save(&mut self, tasks: Vec<Task>) -> Result<usize, TasklistError> {
        if tasks.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = tasks.len(), "saving tasks");
        let records = match self.backend.save_tasks(&tasks).await {
            Ok(records) => records,
            Err(e) => {
                if e.is_protocol() {
                    tracing::warn!(error = %e, "save response not reconciled");
                } else {
                    tracing::error!(error = %e, "save failed");
                }
                return Err(e);
            }
        };
        let applied = self.state.reconcile(records);
        self.state.close_editor();
        Ok(applied)
    }

    pub async fn save_selected(&mut self) -> Result<usize, TasklistError> {
        let selected: Vec<Task> = self.state.selected_tasks().into_iter().cloned().collect();
        self.save(selected).await
    }

    /// Saves the editor target. No-op when the editor is closed.
    pub async fn save_editor(&mut self) -> Result<usize, TasklistError> {
        let Some(task) = self.state.editor().cloned() else {
            return Ok(0);
        };
        self.save(vec![task]).await
    }

    /// Assigns every selected task to `user` (`None` unassigns), then saves them.
    pub async fn assign_to(&mut self, user: Option<User>) -> Result<usize, TasklistError> {
        for task in self.state.selected_mut() {
            task.assigned.clone_from(&user);
        }
        self.save_selected().await
    }

    pub async fn change_status(&mut self, status: TaskStatus) -> Result<usize, TasklistError> {
        for task in self.state.selected_mut() {
            task.status = status;
        }
        self.save_selected().await
    }

    /// Deletes `targets` (the current selection when `None`) after asking
    /// `confirm`. Local tasks are removed once the request succeeds. The
    /// editor is closed whatever the outcome, except when there was nothing
    /// to delete.
    pub async fn delete_tasks<F>(
        &mut self,
        targets: Option<Vec<Task>>,
        confirm: F,
    ) -> Result<DeleteOutcome, TasklistError>
    where
        F: FnOnce(&str) -> bool,
    {
        let targets = targets.unwrap_or_else(|| {
            self.state.selected_tasks().into_iter().cloned().collect()
        });
        if targets.is_empty() {
            return Ok(DeleteOutcome::Nothing);
        }

        if !confirm(delete_prompt(targets.len())) {
            tracing::debug!(count = targets.len(), "delete declined");
            self.state.close_editor();
            return Ok(DeleteOutcome::Declined);
        }

        let result = self.backend.delete_tasks(&targets).await;
        self.state.close_editor();
        if let Err(e) = result {
            tracing::error!(error = %e, "delete failed");
            return Err(e);
        }

        let ids: Vec<TaskId> = targets.into_iter().filter_map(|t| t.id).collect();
        let removed = self.state.remove_tasks(&ids);
        tracing::info!(removed, "tasks deleted");
        Ok(DeleteOutcome::Deleted(removed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::task::model::{RecordId, TaskPatch};

    #[derive(Debug, Default)]
    struct FakeBackend {
        tasks: Vec<Task>,
        save_reply: Mutex<Option<Result<Vec<TaskPatch>, TasklistError>>>,
        fail_users: bool,
        fail_delete: bool,
        saved: Mutex<Vec<Vec<Task>>>,
        deleted: Mutex<Vec<Vec<Task>>>,
    }

    #[async_trait]
    impl TaskBackend for FakeBackend {
        async fn fetch_tasks(&self) -> Result<Vec<Task>, TasklistError> {
            Ok(self.tasks.clone())
        }

        async fn fetch_session(&self) -> Result<Option<User>, TasklistError> {
            Ok(Some(serde_json::from_value(json!({"id": 1, "username": "root", "rank": "ADMIN"})).unwrap()))
        }

        async fn fetch_users(&self) -> Result<Vec<User>, TasklistError> {
            if self.fail_users {
                return Err(TasklistError::Transport {
                    endpoint: "users".to_owned(),
                    message: "connection refused".to_owned(),
                });
            }
            Ok(vec![serde_json::from_value(json!({"id": 2, "username": "alice", "rank": "USER"})).unwrap()])
        }

        async fn save_tasks(&self, tasks: &[Task]) -> Result<Vec<TaskPatch>, TasklistError> {
            self.saved.lock().unwrap().push(tasks.to_vec());
            self.save_reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn delete_tasks(&self, tasks: &[Task]) -> Result<(), TasklistError> {
            self.deleted.lock().unwrap().push(tasks.to_vec());
            if self.fail_delete {
                return Err(TasklistError::Status {
                    endpoint: "tasks".to_owned(),
                    status: 500,
                });
            }
            Ok(())
        }
    }

    fn backend_with(tasks: serde_json::Value) -> FakeBackend {
        FakeBackend {
            tasks: serde_json::from_value(tasks).unwrap(),
            ..FakeBackend::default()
        }
    }

    fn patches(v: serde_json::Value) -> Vec<TaskPatch> {
        serde_json::from_value(v).unwrap()
    }

    async fn loaded(backend: FakeBackend) -> TaskListController<FakeBackend> {
        let mut ctl = TaskListController::new(backend);
        ctl.load_all().await.unwrap();
        ctl
    }

    #[tokio::test]
    async fn load_all_populates_every_source() {
        let ctl = loaded(backend_with(json!([{"id": 1}, {"id": 2}]))).await;
        assert_eq!(ctl.state().tasks().len(), 2);
        assert!(ctl.state().is_admin());
        assert_eq!(ctl.state().users().len(), 1);
    }

    #[tokio::test]
    async fn load_all_applies_what_loaded_and_reports_the_failure() {
        let mut backend = backend_with(json!([{"id": 1}]));
        backend.fail_users = true;
        let mut ctl = TaskListController::new(backend);
        let err = ctl.load_all().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(ctl.state().tasks().len(), 1);
        assert!(ctl.state().current_user().is_some());
        assert!(ctl.state().users().is_empty());
    }

    #[tokio::test]
    async fn empty_save_and_delete_make_no_calls() {
        let mut ctl = loaded(backend_with(json!([{"id": 1}]))).await;
        ctl.state_mut().open_editor(None);

        assert_eq!(ctl.save(Vec::new()).await.unwrap(), 0);
        let outcome = ctl
            .delete_tasks(None, |_| panic!("must not prompt"))
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Nothing);
        assert_eq!(ctl.assign_to(None).await.unwrap(), 0);

        assert!(ctl.backend().saved.lock().unwrap().is_empty());
        assert!(ctl.backend().deleted.lock().unwrap().is_empty());
        assert_eq!(ctl.state().tasks().len(), 1);
        assert!(ctl.state().editor().is_some());
    }

    #[tokio::test]
    async fn save_merges_existing_and_appends_created() {
        let backend = backend_with(json!([{"id": 1, "status": "WAITING"}]));
        *backend.save_reply.lock().unwrap() = Some(Ok(patches(json!([
            {"id": 1, "status": "IN_PROGRESS"},
            {"id": 2, "status": "WAITING"}
        ]))));
        let mut ctl = loaded(backend).await;
        ctl.state_mut().open_editor(None);

        let task = ctl.state().tasks()[0].clone();
        assert_eq!(ctl.save(vec![task]).await.unwrap(), 2);

        let got: Vec<_> = ctl
            .state()
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), t.status))
            .collect();
        assert_eq!(
            got,
            [
                (Some(RecordId::Int(1)), TaskStatus::InProgress),
                (Some(RecordId::Int(2)), TaskStatus::Waiting)
            ]
        );
        assert!(ctl.state().editor().is_none());
    }

    #[tokio::test]
    async fn failed_save_keeps_the_editor_open() {
        let backend = backend_with(json!([{"id": 1}]));
        *backend.save_reply.lock().unwrap() = Some(Err(TasklistError::Protocol {
            endpoint: "tasks".to_owned(),
            message: "expected a JSON array of tasks".to_owned(),
        }));
        let mut ctl = loaded(backend).await;
        ctl.state_mut().open_editor(None);
        ctl.state_mut().editor_mut().unwrap().description = "draft".to_owned();

        let err = ctl.save_editor().await.unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(ctl.state().editor().map(|t| t.description.as_str()), Some("draft"));
        assert_eq!(ctl.state().tasks().len(), 1);
    }

    #[tokio::test]
    async fn bulk_actions_touch_only_the_selection() {
        let mut ctl = loaded(backend_with(json!([
            {"id": 1, "status": "WAITING"},
            {"id": 2, "status": "WAITING"},
            {"id": 3, "status": "WAITING"}
        ])))
        .await;
        ctl.state_mut().toggle_selected(&RecordId::Int(1));
        ctl.state_mut().toggle_selected(&RecordId::Int(3));

        ctl.change_status(TaskStatus::Completed).await.unwrap();
        let alice = ctl.state().users()[0].clone();
        ctl.assign_to(Some(alice)).await.unwrap();

        let saved = ctl.backend().saved.lock().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].iter().all(|t| t.status == TaskStatus::Completed));
        assert_eq!(saved[1].len(), 2);
        assert!(saved[1].iter().all(|t| t.assignee_name() == Some("alice")));
        drop(saved);

        assert_eq!(
            ctl.state().task(&RecordId::Int(2)).map(|t| t.status),
            Some(TaskStatus::Waiting)
        );
    }

    #[tokio::test]
    async fn delete_prompts_by_count_and_declining_only_closes_the_editor() {
        let mut ctl = loaded(backend_with(json!([{"id": 1}, {"id": 2}]))).await;
        ctl.state_mut().open_editor(None);

        let one = vec![ctl.state().tasks()[0].clone()];
        let mut prompt = String::new();
        let outcome = ctl
            .delete_tasks(Some(one), |msg| {
                prompt = msg.to_owned();
                false
            })
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Declined);
        assert_eq!(prompt, "Êtes-vous sûr de vouloir supprimer cette tâche ?");
        assert_eq!(ctl.state().tasks().len(), 2);
        assert!(ctl.state().editor().is_none());
        assert!(ctl.backend().deleted.lock().unwrap().is_empty());

        ctl.state_mut().set_all_selected(true);
        let outcome = ctl
            .delete_tasks(None, |msg| {
                prompt = msg.to_owned();
                true
            })
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted(2));
        assert_eq!(prompt, "Êtes-vous sûr de vouloir supprimer ces tâches ?");
        assert!(ctl.state().tasks().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_tasks() {
        let mut backend = backend_with(json!([{"id": 1}]));
        backend.fail_delete = true;
        let mut ctl = loaded(backend).await;
        let targets = Some(ctl.state().tasks().to_vec());
        let err = ctl.delete_tasks(targets, |_| true).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(ctl.state().tasks().len(), 1);
    }

    #[test]
    fn prompt_pluralizes_from_two() {
        assert_eq!(delete_prompt(0), CONFIRM_DELETE_ONE);
        assert_eq!(delete_prompt(1), CONFIRM_DELETE_ONE);
        assert_eq!(delete_prompt(2), CONFIRM_DELETE_MANY);
        assert_eq!(delete_prompt(12), CONFIRM_DELETE_MANY);
    }
}
