//! Task client: cached queries and confirm-then-invalidate mutations
//! over the connected [`TaskService`].

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use pocket_shared::{TaskDto, TaskId, TaskView, UserProfile, check_title};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::cache::{KeyScope, QueryCache, QueryData, QueryKey, QuerySnapshot};
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};
use crate::service::{TaskService, fetch_view};

/// What a mutation is aimed at. At most one mutation per target runs at
/// a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationTarget {
    NewTask,
    Task(TaskId),
    Profile,
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::NewTask => f.write_str("new task"),
            MutationTarget::Task(id) => write!(f, "task {id}"),
            MutationTarget::Profile => f.write_str("profile"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Edit,
    Toggle,
    Delete,
    SaveProfile,
}

impl MutationKind {
    /// Keys made stale by a confirmed mutation of this kind. Any task
    /// change can move a task between views, so task mutations take all
    /// three views with them.
    pub fn invalidates(self) -> KeyScope {
        match self {
            MutationKind::SaveProfile => KeyScope::Profile,
            MutationKind::Create
            | MutationKind::Edit
            | MutationKind::Toggle
            | MutationKind::Delete => KeyScope::AllTasks,
        }
    }

    fn success_text(self) -> Option<&'static str> {
        match self {
            MutationKind::Create => Some("Task created successfully"),
            MutationKind::Edit => Some("Task updated successfully"),
            MutationKind::Delete => Some("Task deleted successfully"),
            MutationKind::Toggle | MutationKind::SaveProfile => None,
        }
    }

    fn failure_text(self) -> &'static str {
        match self {
            MutationKind::Create => "Failed to create task",
            MutationKind::Edit | MutationKind::Toggle => "Failed to update task",
            MutationKind::Delete => "Failed to delete task",
            MutationKind::SaveProfile => "Failed to save profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: Option<String>,
}

struct PendingGuard {
    pending: Arc<Mutex<BTreeSet<MutationTarget>>>,
    target: MutationTarget,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.target);
    }
}

#[derive(Debug, Clone)]
pub struct TaskClient {
    connection: Connection,
    cache: Arc<QueryCache>,
    pending: Arc<Mutex<BTreeSet<MutationTarget>>>,
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl TaskClient {
    pub fn new(connection: Connection, cache: Arc<QueryCache>) -> Self {
        Self {
            connection,
            cache,
            pending: Arc::new(Mutex::new(BTreeSet::new())),
            notices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Render state of `key`; empty while the channel is not ready.
    pub fn snapshot(&self, key: QueryKey) -> QuerySnapshot {
        if !self.connection.is_ready() {
            return QuerySnapshot::default();
        }
        self.cache.snapshot(key)
    }

    pub fn is_pending(&self, target: MutationTarget) -> bool {
        self.pending.lock().contains(&target)
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }

    // Queries

    pub async fn tasks(&self, view: TaskView) -> ClientResult<Vec<TaskDto>> {
        let service = self.connection.service()?;
        self.cache
            .query(QueryKey::Tasks(view), move || async move {
                let request_id = Uuid::new_v4();
                debug!(%request_id, %view, backend = service.name(), "fetching task view");
                fetch_view(service.as_ref(), view)
                    .await
                    .map(QueryData::Tasks)
                    .map_err(|err| ClientError::remote(&err))
            })
            .await?
            .into_tasks()
    }

    /// Fetches the three views concurrently.
    pub async fn all_views(&self) -> [ClientResult<Vec<TaskDto>>; 3] {
        let (all, active, completed) = tokio::join!(
            self.tasks(TaskView::All),
            self.tasks(TaskView::Active),
            self.tasks(TaskView::Completed),
        );
        [all, active, completed]
    }

    pub async fn task(&self, task_id: TaskId) -> ClientResult<TaskDto> {
        let service = self.connection.service()?;
        self.cache
            .query(QueryKey::Task(task_id), move || async move {
                service
                    .get_task(task_id)
                    .await
                    .map(QueryData::Task)
                    .map_err(|err| ClientError::remote(&err))
            })
            .await?
            .into_task()
    }

    pub async fn caller_profile(&self) -> ClientResult<Option<UserProfile>> {
        let service = self.connection.service()?;
        self.cache
            .query(QueryKey::Profile, move || async move {
                service
                    .get_caller_user_profile()
                    .await
                    .map(QueryData::Profile)
                    .map_err(|err| ClientError::remote(&err))
            })
            .await?
            .into_profile()
    }

    // Mutations

    #[instrument(skip(self, description))]
    pub async fn create_task(&self, title: &str, description: &str) -> ClientResult<TaskDto> {
        let title = checked_title(title)?;
        let description = description.trim().to_string();
        self.mutate(
            MutationKind::Create,
            MutationTarget::NewTask,
            move |service| async move { service.create_task(title, description).await },
        )
        .await
    }

    #[instrument(skip(self, updated))]
    pub async fn edit_task(&self, task_id: TaskId, updated: TaskDto) -> ClientResult<TaskDto> {
        let updated = TaskDto {
            title: checked_title(&updated.title)?,
            description: updated.description.trim().to_string(),
            ..updated
        };
        self.mutate(
            MutationKind::Edit,
            MutationTarget::Task(task_id),
            move |service| async move { service.edit_task(task_id, updated).await },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn toggle_task(&self, task_id: TaskId, is_done: bool) -> ClientResult<TaskDto> {
        self.mutate(
            MutationKind::Toggle,
            MutationTarget::Task(task_id),
            move |service| async move { service.toggle_task(task_id, is_done).await },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: TaskId) -> ClientResult<()> {
        self.mutate(
            MutationKind::Delete,
            MutationTarget::Task(task_id),
            move |service| async move { service.delete_task(task_id).await },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn save_caller_profile(&self, name: &str) -> ClientResult<UserProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::invalid("profile name cannot be empty"));
        }
        let profile = UserProfile {
            name: name.to_string(),
        };
        let saved = profile.clone();
        self.mutate(
            MutationKind::SaveProfile,
            MutationTarget::Profile,
            move |service| async move { service.save_caller_user_profile(profile).await },
        )
        .await?;
        Ok(saved)
    }

    async fn mutate<T, F, Fut>(
        &self,
        kind: MutationKind,
        target: MutationTarget,
        call: F,
    ) -> ClientResult<T>
    where
        F: FnOnce(Arc<dyn TaskService>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let service = self.connection.service()?;
        let _guard = self.claim(target)?;
        let request_id = Uuid::new_v4();
        info!(%request_id, ?kind, %target, backend = service.name(), "mutation issued");

        match call(service).await {
            Ok(value) => {
                let invalidated = self.cache.invalidate(kind.invalidates());
                info!(%request_id, ?kind, %target, invalidated, "mutation confirmed");
                if let Some(text) = kind.success_text() {
                    self.notify(NoticeLevel::Success, text, None);
                }
                Ok(value)
            }
            Err(err) => {
                let failure = ClientError::remote(&err);
                error!(%request_id, ?kind, %target, error = %failure, "mutation failed");
                self.notify(
                    NoticeLevel::Error,
                    kind.failure_text(),
                    Some(failure.to_string()),
                );
                Err(failure)
            }
        }
    }

    fn claim(&self, target: MutationTarget) -> ClientResult<PendingGuard> {
        let mut pending = self.pending.lock();
        if !pending.insert(target) {
            debug!(%target, "rejecting duplicate mutation");
            return Err(ClientError::MutationPending { target });
        }
        Ok(PendingGuard {
            pending: Arc::clone(&self.pending),
            target,
        })
    }

    fn notify(&self, level: NoticeLevel, title: &str, detail: Option<String>) {
        self.notices.lock().push(Notice {
            level,
            title: title.to_string(),
            detail,
        });
    }
}

fn checked_title(raw: &str) -> ClientResult<String> {
    let title = raw.trim();
    check_title(title).map_err(|problem| ClientError::invalid(problem.to_string()))?;
    Ok(title.to_string())
}
