//! View state: filter, sort and the single open overlay.
//!
//! Nothing here talks to the service. Handlers read this state and call
//! into [`crate::client::TaskClient`].

use std::fmt;

use pocket_shared::{TITLE_MAX_CHARS, TaskDto, TaskId, TaskView, check_title};
use tracing::debug;

use crate::cache::{QueryData, QueryKey, QuerySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Identifier descending; the service assigns ids in creation order.
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest",
            SortOrder::OldestFirst => "oldest",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "newest" | "new" | "desc" => Some(SortOrder::NewestFirst),
            "oldest" | "old" | "asc" => Some(SortOrder::OldestFirst),
            _ => None,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn sort_tasks(tasks: &mut [TaskDto], order: SortOrder) {
    match order {
        SortOrder::NewestFirst => tasks.sort_by(|a, b| b.id.cmp(&a.id)),
        SortOrder::OldestFirst => tasks.sort_by(|a, b| a.id.cmp(&b.id)),
    }
}

pub fn sorted(tasks: &[TaskDto], order: SortOrder) -> Vec<TaskDto> {
    let mut out = tasks.to_vec();
    sort_tasks(&mut out, order);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Details(TaskId),
    Edit(TaskId),
    DeleteConfirm(TaskId),
    Composer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    SelectFilter(TaskView),
    SelectSort(SortOrder),
    /// Row tap or "View Details".
    OpenDetails(TaskId),
    OpenEdit(TaskId),
    OpenDelete(TaskId),
    OpenComposer,
    /// Cancel button, close gesture.
    Dismiss,
    /// The overlay's mutation was confirmed by the service.
    MutationConfirmed,
    /// The overlay stays open so the user can retry or cancel.
    MutationFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub filter: TaskView,
    pub sort: SortOrder,
    pub overlay: Overlay,
}

impl ViewState {
    pub fn new(filter: TaskView, sort: SortOrder) -> Self {
        Self {
            filter,
            sort,
            overlay: Overlay::None,
        }
    }

    pub fn apply(&mut self, action: ViewAction) {
        let before = self.overlay;
        match action {
            ViewAction::SelectFilter(filter) => self.filter = filter,
            ViewAction::SelectSort(sort) => self.sort = sort,
            ViewAction::OpenDetails(id) => self.overlay = Overlay::Details(id),
            ViewAction::OpenEdit(id) => self.overlay = Overlay::Edit(id),
            ViewAction::OpenDelete(id) => self.overlay = Overlay::DeleteConfirm(id),
            ViewAction::OpenComposer => self.overlay = Overlay::Composer,
            ViewAction::Dismiss | ViewAction::MutationConfirmed => self.overlay = Overlay::None,
            ViewAction::MutationFailed => {}
        }
        debug!(?action, ?before, after = ?self.overlay, "view state transition");
    }

    /// Task the open overlay is about, if any.
    pub fn target(&self) -> Option<TaskId> {
        match self.overlay {
            Overlay::Details(id) | Overlay::Edit(id) | Overlay::DeleteConfirm(id) => Some(id),
            Overlay::None | Overlay::Composer => None,
        }
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::Tasks(self.filter)
    }

    pub fn list_state(&self, snapshot: &QuerySnapshot, connected: bool) -> TaskListState {
        TaskListState::project(self.filter, self.sort, snapshot, connected)
    }
}

/// What the task list shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskListState {
    /// No remote channel; no query is issued.
    Disabled,
    Loading,
    Failed { message: String },
    Empty { heading: &'static str, hint: &'static str },
    Tasks(Vec<TaskDto>),
}

impl TaskListState {
    pub fn project(
        filter: TaskView,
        sort: SortOrder,
        snapshot: &QuerySnapshot,
        connected: bool,
    ) -> Self {
        if !connected {
            return TaskListState::Disabled;
        }
        if let Some(err) = &snapshot.error {
            return TaskListState::Failed {
                message: err.to_string(),
            };
        }
        match &snapshot.data {
            Some(QueryData::Tasks(tasks)) if tasks.is_empty() => {
                let (heading, hint) = empty_copy(filter);
                TaskListState::Empty { heading, hint }
            }
            Some(QueryData::Tasks(tasks)) => TaskListState::Tasks(sorted(tasks, sort)),
            _ => TaskListState::Loading,
        }
    }
}

fn empty_copy(filter: TaskView) -> (&'static str, &'static str) {
    match filter {
        TaskView::All => ("No tasks yet", "Create your first task to get started"),
        TaskView::Active => ("No active tasks", "All your tasks are completed!"),
        TaskView::Completed => (
            "No completed tasks",
            "Complete some tasks to see them here",
        ),
    }
}

/// Form state of the composer and the edit sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
}

impl TaskDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_task(task: &TaskDto) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
        }
    }

    pub fn title_chars(&self) -> usize {
        self.title.chars().count()
    }

    pub fn counter_label(&self) -> String {
        format!("{}/{TITLE_MAX_CHARS} characters", self.title_chars())
    }

    pub fn can_submit(&self) -> bool {
        check_title(&self.title).is_ok()
    }

    /// `task` with this draft's trimmed text.
    pub fn apply_to(&self, task: &TaskDto) -> TaskDto {
        TaskDto {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            ..task.clone()
        }
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.description.clear();
    }
}

#[cfg(test)]
mod tests {
    use pocket_shared::Principal;

    use super::*;
    use crate::error::ClientError;

    fn task(id: TaskId) -> TaskDto {
        TaskDto {
            id,
            title: format!("task {id}"),
            description: String::new(),
            owner: Principal::new("ann"),
            is_done: false,
        }
    }

    fn ids(tasks: &[TaskDto]) -> Vec<TaskId> {
        tasks.iter().map(|task| task.id).collect()
    }

    #[test]
    fn newest_first_is_non_increasing() {
        let tasks = vec![task(3), task(9), task(1), task(4)];
        let out = sorted(&tasks, SortOrder::NewestFirst);
        assert_eq!(ids(&out), vec![9, 4, 3, 1]);
        assert!(out.windows(2).all(|pair| pair[0].id >= pair[1].id));
    }

    #[test]
    fn oldest_first_is_non_decreasing() {
        let tasks = vec![task(3), task(9), task(1), task(4)];
        let out = sorted(&tasks, SortOrder::OldestFirst);
        assert_eq!(ids(&out), vec![1, 3, 4, 9]);
    }

    #[test]
    fn resorting_an_unchanged_list_is_stable() {
        let tasks = vec![task(2), task(7), task(5)];
        for order in [SortOrder::NewestFirst, SortOrder::OldestFirst] {
            let once = sorted(&tasks, order);
            let twice = sorted(&once, order);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn sort_parse_accepts_menu_values() {
        assert_eq!(SortOrder::parse("Newest"), Some(SortOrder::NewestFirst));
        assert_eq!(SortOrder::parse("oldest"), Some(SortOrder::OldestFirst));
        assert_eq!(SortOrder::parse("random"), None);
    }

    #[test]
    fn one_overlay_at_a_time() {
        let mut state = ViewState::default();
        state.apply(ViewAction::OpenDetails(4));
        assert_eq!(state.overlay, Overlay::Details(4));
        assert_eq!(state.target(), Some(4));

        state.apply(ViewAction::OpenEdit(4));
        assert_eq!(state.overlay, Overlay::Edit(4));

        state.apply(ViewAction::MutationFailed);
        assert_eq!(state.overlay, Overlay::Edit(4));

        state.apply(ViewAction::MutationConfirmed);
        assert_eq!(state.overlay, Overlay::None);
        assert_eq!(state.target(), None);

        state.apply(ViewAction::OpenComposer);
        assert_eq!(state.target(), None);
        state.apply(ViewAction::Dismiss);
        assert_eq!(state.overlay, Overlay::None);
    }

    #[test]
    fn filter_and_sort_do_not_touch_the_overlay() {
        let mut state = ViewState::default();
        state.apply(ViewAction::OpenDelete(2));
        state.apply(ViewAction::SelectFilter(TaskView::Completed));
        state.apply(ViewAction::SelectSort(SortOrder::OldestFirst));

        assert_eq!(state.overlay, Overlay::DeleteConfirm(2));
        assert_eq!(state.query_key(), QueryKey::Tasks(TaskView::Completed));
        assert_eq!(state.sort, SortOrder::OldestFirst);
    }

    #[test]
    fn list_state_separates_loading_failure_and_empty() {
        let state = ViewState::new(TaskView::Active, SortOrder::NewestFirst);

        assert_eq!(
            state.list_state(&QuerySnapshot::default(), false),
            TaskListState::Disabled
        );

        let loading = QuerySnapshot {
            is_fetching: true,
            ..QuerySnapshot::default()
        };
        assert_eq!(state.list_state(&loading, true), TaskListState::Loading);

        let failed = QuerySnapshot {
            error: Some(ClientError::Remote {
                message: "network down".to_string(),
            }),
            ..QuerySnapshot::default()
        };
        assert_eq!(
            state.list_state(&failed, true),
            TaskListState::Failed {
                message: "network down".to_string()
            }
        );

        let empty = QuerySnapshot {
            data: Some(QueryData::Tasks(vec![])),
            ..QuerySnapshot::default()
        };
        assert_eq!(
            state.list_state(&empty, true),
            TaskListState::Empty {
                heading: "No active tasks",
                hint: "All your tasks are completed!"
            }
        );

        let filled = QuerySnapshot {
            data: Some(QueryData::Tasks(vec![task(1), task(2)])),
            is_stale: true,
            ..QuerySnapshot::default()
        };
        let TaskListState::Tasks(tasks) = state.list_state(&filled, true) else {
            panic!("expected tasks");
        };
        assert_eq!(ids(&tasks), vec![2, 1]);
    }

    #[test]
    fn drafts_count_and_validate_titles() {
        let mut draft = TaskDraft::new();
        assert!(!draft.can_submit());

        draft.title = "  Buy milk ".to_string();
        assert!(draft.can_submit());
        assert_eq!(draft.counter_label(), "11/80 characters");

        draft.title = "x".repeat(81);
        assert!(!draft.can_submit());

        let original = task(5);
        let mut edit = TaskDraft::for_task(&original);
        assert_eq!(edit.title, "task 5");
        edit.title = " renamed ".to_string();
        edit.description = " notes ".to_string();
        let updated = edit.apply_to(&original);
        assert_eq!(updated.id, 5);
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.description, "notes");

        edit.clear();
        assert_eq!(edit, TaskDraft::default());
    }
}
