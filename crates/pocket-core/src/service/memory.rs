use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use pocket_shared::{Principal, TaskDto, TaskId, TaskView, UserProfile};
use tracing::{debug, instrument};

use super::TaskService;
use super::book::TaskBook;

#[derive(Debug, Default)]
struct Backing {
    book: TaskBook,
    calls: BTreeMap<&'static str, usize>,
    fail_next: Option<String>,
}

/// In-process task service.
///
/// Clones made with [`MemoryTaskService::as_caller`] share one backing
/// book, so several identities can be exercised against the same data.
#[derive(Debug, Clone)]
pub struct MemoryTaskService {
    backing: Arc<Mutex<Backing>>,
    caller: Principal,
    latency: Option<Duration>,
}

impl MemoryTaskService {
    pub fn new(caller: Principal) -> Self {
        Self {
            backing: Arc::new(Mutex::new(Backing::default())),
            caller,
            latency: None,
        }
    }

    /// Every call sleeps for `latency` before touching the book.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn as_caller(&self, caller: Principal) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
            caller,
            latency: self.latency,
        }
    }

    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    /// Number of times `op` reached the service.
    pub fn calls(&self, op: &str) -> usize {
        self.backing.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.backing.lock().calls.values().sum()
    }

    /// The next call of any kind fails with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.backing.lock().fail_next = Some(message.into());
    }

    async fn enter(&self, op: &'static str) -> anyhow::Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut backing = self.backing.lock();
        *backing.calls.entry(op).or_insert(0) += 1;
        debug!(op, caller = %self.caller, "memory service call");
        if let Some(message) = backing.fail_next.take() {
            return Err(anyhow!(message));
        }
        Ok(())
    }

    fn with_book<T>(&self, apply: impl FnOnce(&mut TaskBook, &Principal) -> T) -> T {
        let mut backing = self.backing.lock();
        apply(&mut backing.book, &self.caller)
    }
}

#[async_trait]
impl TaskService for MemoryTaskService {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, description))]
    async fn create_task(&self, title: String, description: String) -> anyhow::Result<TaskDto> {
        self.enter("create_task").await?;
        self.with_book(|book, caller| book.create(caller, &title, &description))
    }

    #[instrument(skip(self, updated))]
    async fn edit_task(&self, task_id: TaskId, updated: TaskDto) -> anyhow::Result<TaskDto> {
        self.enter("edit_task").await?;
        self.with_book(|book, caller| book.edit(caller, task_id, &updated))
    }

    #[instrument(skip(self))]
    async fn toggle_task(&self, task_id: TaskId, is_done: bool) -> anyhow::Result<TaskDto> {
        self.enter("toggle_task").await?;
        self.with_book(|book, caller| book.toggle(caller, task_id, is_done))
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, task_id: TaskId) -> anyhow::Result<()> {
        self.enter("delete_task").await?;
        self.with_book(|book, caller| book.delete(caller, task_id))
    }

    #[instrument(skip(self))]
    async fn get_task(&self, task_id: TaskId) -> anyhow::Result<TaskDto> {
        self.enter("get_task").await?;
        self.with_book(|book, caller| book.get(caller, task_id))
    }

    async fn get_all_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.enter("get_all_tasks").await?;
        Ok(self.with_book(|book, caller| book.view(caller, TaskView::All)))
    }

    async fn get_active_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.enter("get_active_tasks").await?;
        Ok(self.with_book(|book, caller| book.view(caller, TaskView::Active)))
    }

    async fn get_completed_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.enter("get_completed_tasks").await?;
        Ok(self.with_book(|book, caller| book.view(caller, TaskView::Completed)))
    }

    async fn get_caller_user_profile(&self) -> anyhow::Result<Option<UserProfile>> {
        self.enter("get_caller_user_profile").await?;
        Ok(self.with_book(|book, caller| book.profile(caller)))
    }

    #[instrument(skip(self))]
    async fn save_caller_user_profile(&self, profile: UserProfile) -> anyhow::Result<()> {
        self.enter("save_caller_user_profile").await?;
        self.with_book(|book, caller| book.save_profile(caller, profile))
    }
}
