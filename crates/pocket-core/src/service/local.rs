use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use pocket_shared::{Principal, TaskDto, TaskId, TaskView, UserProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::TaskService;
use super::book::TaskBook;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRecord {
    owner: Principal,
    name: String,
}

/// Directory of JSONL files backing a [`LocalTaskService`].
#[derive(Debug)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub profiles_path: PathBuf,
    pub counter_path: PathBuf,
}

impl LocalStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let profiles_path = data_dir.join("profiles.data");
        let counter_path = data_dir.join("counter.data");

        for path in [&tasks_path, &profiles_path, &counter_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            profiles = %profiles_path.display(),
            "opened local task store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            profiles_path,
            counter_path,
        })
    }

    #[instrument(skip(self))]
    pub fn load_book(&self) -> anyhow::Result<TaskBook> {
        let tasks: Vec<TaskDto> =
            load_jsonl(&self.tasks_path).context("failed to load tasks.data")?;
        let profiles = load_jsonl::<ProfileRecord>(&self.profiles_path)
            .context("failed to load profiles.data")?
            .into_iter()
            .map(|record| (record.owner, UserProfile { name: record.name }))
            .collect::<BTreeMap<_, _>>();

        let raw_counter = fs::read_to_string(&self.counter_path)
            .with_context(|| format!("failed reading {}", self.counter_path.display()))?;
        let trimmed = raw_counter.trim();
        let last_id = if trimmed.is_empty() {
            0
        } else {
            trimmed
                .parse::<TaskId>()
                .with_context(|| format!("invalid id counter: {trimmed}"))?
        };

        Ok(TaskBook::from_parts(tasks, last_id, profiles))
    }

    #[instrument(skip(self, book))]
    pub fn save_book(&self, book: &TaskBook) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, book.tasks()).context("failed to save tasks.data")?;

        let records: Vec<ProfileRecord> = book
            .profiles()
            .iter()
            .map(|(owner, profile)| ProfileRecord {
                owner: owner.clone(),
                name: profile.name.clone(),
            })
            .collect();
        save_jsonl_atomic(&self.profiles_path, &records).context("failed to save profiles.data")?;

        write_atomic(&self.counter_path, book.last_id().to_string().as_bytes())
            .context("failed to save counter.data")
    }
}

/// Task service over a [`LocalStore`].
///
/// Every call reloads the store, so several processes sharing a data
/// directory observe each other's confirmed writes.
#[derive(Debug, Clone)]
pub struct LocalTaskService {
    store: Arc<Mutex<LocalStore>>,
    caller: Principal,
}

impl LocalTaskService {
    pub fn open(data_dir: &Path, caller: Principal) -> anyhow::Result<Self> {
        let store = LocalStore::open(data_dir)?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            caller,
        })
    }

    pub fn as_caller(&self, caller: Principal) -> Self {
        Self {
            store: Arc::clone(&self.store),
            caller,
        }
    }

    fn read<T>(&self, apply: impl FnOnce(&TaskBook, &Principal) -> T) -> anyhow::Result<T> {
        let store = self.store.lock();
        let book = store.load_book()?;
        Ok(apply(&book, &self.caller))
    }

    fn write<T>(
        &self,
        apply: impl FnOnce(&mut TaskBook, &Principal) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let store = self.store.lock();
        let mut book = store.load_book()?;
        let out = apply(&mut book, &self.caller)?;
        store.save_book(&book)?;
        Ok(out)
    }
}

#[async_trait]
impl TaskService for LocalTaskService {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, description))]
    async fn create_task(&self, title: String, description: String) -> anyhow::Result<TaskDto> {
        self.write(|book, caller| book.create(caller, &title, &description))
    }

    #[instrument(skip(self, updated))]
    async fn edit_task(&self, task_id: TaskId, updated: TaskDto) -> anyhow::Result<TaskDto> {
        self.write(|book, caller| book.edit(caller, task_id, &updated))
    }

    #[instrument(skip(self))]
    async fn toggle_task(&self, task_id: TaskId, is_done: bool) -> anyhow::Result<TaskDto> {
        self.write(|book, caller| book.toggle(caller, task_id, is_done))
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, task_id: TaskId) -> anyhow::Result<()> {
        self.write(|book, caller| book.delete(caller, task_id))
    }

    #[instrument(skip(self))]
    async fn get_task(&self, task_id: TaskId) -> anyhow::Result<TaskDto> {
        self.read(|book, caller| book.get(caller, task_id))?
    }

    async fn get_all_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.read(|book, caller| book.view(caller, TaskView::All))
    }

    async fn get_active_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.read(|book, caller| book.view(caller, TaskView::Active))
    }

    async fn get_completed_tasks(&self) -> anyhow::Result<Vec<TaskDto>> {
        self.read(|book, caller| book.view(caller, TaskView::Completed))
    }

    async fn get_caller_user_profile(&self) -> anyhow::Result<Option<UserProfile>> {
        self.read(|book, caller| book.profile(caller))
    }

    #[instrument(skip(self))]
    async fn save_caller_user_profile(&self, profile: UserProfile) -> anyhow::Result<()> {
        self.write(|book, caller| book.save_profile(caller, profile))
    }
}

#[instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let mut payload = Vec::new();
    for record in records {
        serde_json::to_writer(&mut payload, record)?;
        payload.push(b'\n');
    }
    write_atomic(path, &payload)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
