//! Remote task service boundary.
//!
//! A [`TaskService`] is a channel already bound to the caller's
//! identity: every operation is scoped to that caller's own tasks and
//! profile, and ownership is enforced on the service side.

pub mod book;
pub mod local;
pub mod memory;

use async_trait::async_trait;
use pocket_shared::{TaskDto, TaskId, TaskView, UserProfile};

pub use local::LocalTaskService;
pub use memory::MemoryTaskService;

#[async_trait]
pub trait TaskService: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn create_task(&self, title: String, description: String) -> anyhow::Result<TaskDto>;

    /// Replaces title and description of the task with `task_id`.
    async fn edit_task(&self, task_id: TaskId, updated: TaskDto) -> anyhow::Result<TaskDto>;

    async fn toggle_task(&self, task_id: TaskId, is_done: bool) -> anyhow::Result<TaskDto>;

    async fn delete_task(&self, task_id: TaskId) -> anyhow::Result<()>;

    async fn get_task(&self, task_id: TaskId) -> anyhow::Result<TaskDto>;

    async fn get_all_tasks(&self) -> anyhow::Result<Vec<TaskDto>>;

    async fn get_active_tasks(&self) -> anyhow::Result<Vec<TaskDto>>;

    async fn get_completed_tasks(&self) -> anyhow::Result<Vec<TaskDto>>;

    async fn get_caller_user_profile(&self) -> anyhow::Result<Option<UserProfile>>;

    async fn save_caller_user_profile(&self, profile: UserProfile) -> anyhow::Result<()>;
}

/// Dispatches a view to its dedicated query.
pub async fn fetch_view(service: &dyn TaskService, view: TaskView) -> anyhow::Result<Vec<TaskDto>> {
    match view {
        TaskView::All => service.get_all_tasks().await,
        TaskView::Active => service.get_active_tasks().await,
        TaskView::Completed => service.get_completed_tasks().await,
    }
}
