#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fmt;

use crate::task::model::{Task, TaskId, TaskPatch};
use crate::task::sort::{self, FieldPath};
use crate::task::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dropdown {
    AssignTo,
    ChangeStatus,
}

impl Dropdown {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AssignTo => "assignTo",
            Self::ChangeStatus => "changeStatus",
        }
    }
}

impl fmt::Display for Dropdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub key: FieldPath,
    pub descending: bool,
}

/// The client-side view of the task list. Owned by the controller; every
/// change goes through one of the methods below.
#[derive(Debug, Default)]
pub struct TaskListState {
    tasks: Vec<Task>,
    sort: Option<SortState>,
    filter: String,
    current_user: Option<User>,
    users: Vec<User>,
    editor: Option<Task>,
    open_dropdown: Option<Dropdown>,
}

impl TaskListState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Replaces the collection. Records without an identifier and repeated
    /// identifiers are dropped so that ids stay unique.
    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        let mut seen = HashSet::new();
        self.tasks = tasks
            .into_iter()
            .filter(|t| match &t.id {
                Some(id) if seen.insert(id.normalized()) => true,
                Some(id) => {
                    tracing::warn!(%id, "dropping task with duplicate id");
                    false
                }
                None => {
                    tracing::warn!(description = %t.description, "dropping task without id");
                    false
                }
            })
            .collect();
    }

    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id.as_ref().is_some_and(|x| x.same(id)))
    }

    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
    }

    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn set_current_user(&mut self, user: Option<User>) {
        self.current_user = user;
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.current_user.as_ref().is_some_and(User::is_admin)
    }

    // Sorting and filtering

    /// A new key sorts ascending; the active key flips direction.
    pub fn sort(&mut self, key: FieldPath) {
        match &mut self.sort {
            Some(active) if active.key == key => active.descending = !active.descending,
            _ => {
                self.sort = Some(SortState {
                    key,
                    descending: false,
                });
            }
        }
    }

    pub fn clear_sort(&mut self) {
        self.sort = None;
    }

    #[must_use]
    pub fn sort_state(&self) -> Option<&SortState> {
        self.sort.as_ref()
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into().trim().to_owned();
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn sorted_view(&self) -> SortedView<'_> {
        let needle = self.filter.to_lowercase();
        let mut order: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| needle.is_empty() || matches_filter(&self.tasks[i], &needle))
            .collect();
        if let Some(active) = &self.sort {
            sort::sort_indices(&self.tasks, &mut order, &active.key, active.descending);
        }
        SortedView {
            tasks: &self.tasks,
            order,
        }
    }

    // Selection

    #[must_use]
    pub fn selected_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.selected).collect()
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.selected).count()
    }

    /// Returns the new flag, or `None` when no task has that id.
    pub fn toggle_selected(&mut self, id: &TaskId) -> Option<bool> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id.as_ref().is_some_and(|x| x.same(id)))?;
        task.selected = !task.selected;
        Some(task.selected)
    }

    pub fn select_only(&mut self, ids: &[TaskId]) {
        for task in &mut self.tasks {
            task.selected = task
                .id
                .as_ref()
                .is_some_and(|id| ids.iter().any(|x| x.same(id)));
        }
    }

    /// True when more than half of the tasks are selected.
    #[must_use]
    pub fn all_selected(&self) -> bool {
        self.selected_count() * 2 > self.tasks.len()
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        for task in &mut self.tasks {
            task.selected = selected;
        }
    }

    pub(crate) fn selected_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut().filter(|t| t.selected)
    }

    // Dropdowns

    /// Closes every other dropdown, then flips `dropdown`.
    pub fn toggle_dropdown(&mut self, dropdown: Dropdown) {
        self.open_dropdown = if self.open_dropdown == Some(dropdown) {
            None
        } else {
            Some(dropdown)
        };
    }

    #[must_use]
    pub fn is_dropdown_open(&self, dropdown: Dropdown) -> bool {
        self.open_dropdown == Some(dropdown)
    }

    #[must_use]
    pub fn open_dropdown(&self) -> Option<Dropdown> {
        self.open_dropdown
    }

    pub fn close_dropdowns(&mut self) {
        self.open_dropdown = None;
    }

    // Editor

    /// Opens the editor on a copy of `task`, or on a fresh draft.
    pub fn open_editor(&mut self, task: Option<&Task>) {
        self.editor = Some(task.cloned().unwrap_or_else(Task::draft));
    }

    #[must_use]
    pub fn editor(&self) -> Option<&Task> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut Task> {
        self.editor.as_mut()
    }

    pub fn close_editor(&mut self) {
        self.editor = None;
    }

    // Reconciliation

    /// Merges server records into the collection by id: known ids are merged
    /// field by field, unknown ids are appended in response order.
    pub fn reconcile(&mut self, records: Vec<TaskPatch>) -> usize {
        let mut applied = 0;
        for patch in records {
            let Some(id) = patch.id.clone() else {
                tracing::warn!("ignoring server task record without id");
                continue;
            };
            match self
                .tasks
                .iter_mut()
                .find(|t| t.id.as_ref().is_some_and(|x| x.same(&id)))
            {
                Some(existing) => existing.merge(patch),
                None => {
                    tracing::debug!(%id, "appending task created by server");
                    self.tasks.push(Task::from(patch));
                }
            }
            applied += 1;
        }
        applied
    }

    pub fn remove_tasks(&mut self, ids: &[TaskId]) -> usize {
        let before = self.tasks.len();
        self.tasks
            .retain(|t| t.id.as_ref().is_none_or(|id| !ids.iter().any(|x| x.same(id))));
        before - self.tasks.len()
    }
}

fn matches_filter(task: &Task, needle: &str) -> bool {
    task.id
        .as_ref()
        .is_some_and(|id| id.to_string().to_lowercase().contains(needle))
        || task.description.to_lowercase().contains(needle)
        || task
            .assignee_name()
            .is_some_and(|n| n.to_lowercase().contains(needle))
        || task.status.as_str().to_lowercase().contains(needle)
        || task.status.label().to_lowercase().contains(needle)
}

/// Tasks in display order. Borrows the collection; iterate it as many times as needed.
#[derive(Debug, Clone)]
pub struct SortedView<'a> {
    tasks: &'a [Task],
    order: Vec<usize>,
}

impl<'a> SortedView<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Task> + '_ {
        self.order.iter().map(|&i| &self.tasks[i])
    }

    #[must_use]
    pub fn get(&self, row: usize) -> Option<&'a Task> {
        self.order.get(row).map(|&i| &self.tasks[i])
    }

    /// Positions in the underlying collection, in display order.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::task::model::{RecordId, TaskStatus};

    fn state_with(tasks: serde_json::Value) -> TaskListState {
        let mut state = TaskListState::new();
        state.set_tasks(serde_json::from_value(tasks).unwrap());
        state
    }

    fn five() -> TaskListState {
        state_with(json!([
            {"id": 1, "description": "one"},
            {"id": 2, "description": "two"},
            {"id": 3, "description": "three"},
            {"id": 4, "description": "four"},
            {"id": 5, "description": "five"}
        ]))
    }

    fn view_ids(state: &TaskListState) -> Vec<i64> {
        state
            .sorted_view()
            .iter()
            .map(|t| match t.id {
                Some(RecordId::Int(n)) => n,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn sort_toggles_direction_on_the_same_key() {
        let mut state = five();
        state.sort(FieldPath::new("description"));
        assert_eq!(view_ids(&state), [5, 4, 1, 3, 2]);
        assert!(!state.sort_state().unwrap().descending);

        state.sort(FieldPath::new("description"));
        assert_eq!(view_ids(&state), [2, 3, 1, 4, 5]);

        state.sort(FieldPath::new("id"));
        assert!(!state.sort_state().unwrap().descending);
        assert_eq!(view_ids(&state), [1, 2, 3, 4, 5]);
    }

    #[test]
    fn unsorted_view_is_insertion_order_and_restartable() {
        let state = state_with(json!([{"id": 9}, {"id": 3}, {"id": 7}]));
        let view = state.sorted_view();
        let first: Vec<_> = view.iter().collect();
        let second: Vec<_> = view.iter().collect();
        assert_eq!(first, second);
        assert_eq!(view_ids(&state), [9, 3, 7]);
    }

    #[test]
    fn select_all_is_derived_from_the_majority() {
        let mut state = five();
        for id in [1, 2, 3] {
            state.toggle_selected(&RecordId::Int(id));
        }
        assert!(state.all_selected());

        state.set_all_selected(false);
        assert_eq!(state.selected_count(), 0);
        assert!(!state.all_selected());

        state.set_all_selected(true);
        assert_eq!(state.selected_count(), 5);

        state.set_all_selected(false);
        state.toggle_selected(&RecordId::Int(1));
        state.toggle_selected(&RecordId::Int(2));
        assert!(!state.all_selected());
    }

    #[test]
    fn dropdowns_are_mutually_exclusive() {
        let mut state = TaskListState::new();
        state.toggle_dropdown(Dropdown::AssignTo);
        state.toggle_dropdown(Dropdown::AssignTo);
        assert_eq!(state.open_dropdown(), None);

        state.toggle_dropdown(Dropdown::AssignTo);
        state.toggle_dropdown(Dropdown::ChangeStatus);
        assert!(state.is_dropdown_open(Dropdown::ChangeStatus));
        assert!(!state.is_dropdown_open(Dropdown::AssignTo));
        assert_eq!(Dropdown::ChangeStatus.to_string(), "changeStatus");
    }

    #[test]
    fn editor_opens_on_a_draft_or_a_copy() {
        let mut state = five();
        state.open_editor(None);
        let draft = state.editor().unwrap();
        assert!(draft.is_new());
        assert_eq!(draft.status, TaskStatus::Waiting);

        let existing = state.task(&RecordId::Int(2)).cloned();
        state.open_editor(existing.as_ref());
        state.editor_mut().unwrap().description = "changed".to_owned();
        assert_eq!(state.task(&RecordId::Int(2)).unwrap().description, "two");
        state.close_editor();
        assert!(state.editor().is_none());
    }

    #[test]
    fn reconcile_merges_existing_and_appends_new() {
        let mut state = state_with(json!([{"id": 1, "status": "WAITING"}]));
        let records: Vec<TaskPatch> = serde_json::from_value(json!([
            {"id": 1, "status": "IN_PROGRESS"},
            {"id": 2, "status": "WAITING"}
        ]))
        .unwrap();
        assert_eq!(state.reconcile(records), 2);

        let got: Vec<_> = state
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
    }

    #[test]
    fn filter_is_a_view_transform() {
        let mut state = state_with(json!([
            {"id": 1, "description": "Buy milk", "status": "WAITING"},
            {"id": 2, "description": "Call Bob", "status": "COMPLETED", "assigned": {"username": "milka"}},
            {"id": 3, "description": "Write report", "status": "IN_PROGRESS"}
        ]));
        state.set_filter("MILK");
        assert_eq!(view_ids(&state), [1, 2]);
        state.set_filter("en cours");
        assert_eq!(view_ids(&state), [3]);
        assert_eq!(state.tasks().len(), 3);
        state.clear_filter();
        assert_eq!(view_ids(&state), [1, 2, 3]);
    }

    #[test]
    fn load_drops_duplicate_and_missing_ids() {
        let state = state_with(json!([{"id": 1}, {"id": 1}, {"description": "no id"}, {"id": "1"}, {"id": "a"}]));
        assert_eq!(state.tasks().len(), 2);
    }

    #[test]
    fn numeric_text_ids_match_numbers() {
        let mut state = state_with(json!([{"id": "1", "status": "WAITING"}, {"id": 2}]));
        let records: Vec<TaskPatch> =
            serde_json::from_value(json!([{"id": 1, "status": "IN_PROGRESS"}])).unwrap();
        assert_eq!(state.reconcile(records), 1);

        assert_eq!(state.tasks().len(), 2);
        assert_eq!(state.tasks()[0].status, TaskStatus::InProgress);
        assert!(state.task(&RecordId::Text("1".to_owned())).is_some());
        assert_eq!(state.toggle_selected(&RecordId::Text("2".to_owned())), Some(true));

        assert_eq!(state.remove_tasks(&[RecordId::Text("2".to_owned())]), 1);
        assert_eq!(state.remove_tasks(&[RecordId::Int(1)]), 1);
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn remove_tasks_by_id() {
        let mut state = five();
        let removed = state.remove_tasks(&[RecordId::Int(2), RecordId::Int(4), RecordId::Int(99)]);
        assert_eq!(removed, 2);
        assert_eq!(view_ids(&state), [1, 3, 5]);
    }
}
