use std::collections::BTreeMap;

use anyhow::anyhow;
use pocket_shared::{Principal, TaskDto, TaskId, TaskView, UserProfile, check_title};
use tracing::debug;

/// Service-side task and profile records shared by the in-process
/// backends. Every operation takes the caller explicitly.
#[derive(Debug, Clone, Default)]
pub struct TaskBook {
    tasks: Vec<TaskDto>,
    last_id: TaskId,
    profiles: BTreeMap<Principal, UserProfile>,
}

impl TaskBook {
    pub fn from_parts(
        tasks: Vec<TaskDto>,
        last_id: TaskId,
        profiles: BTreeMap<Principal, UserProfile>,
    ) -> Self {
        let highest = tasks.iter().map(|task| task.id).max().unwrap_or(0);
        Self {
            tasks,
            last_id: last_id.max(highest),
            profiles,
        }
    }

    pub fn tasks(&self) -> &[TaskDto] {
        &self.tasks
    }

    pub fn last_id(&self) -> TaskId {
        self.last_id
    }

    pub fn profiles(&self) -> &BTreeMap<Principal, UserProfile> {
        &self.profiles
    }

    pub fn create(
        &mut self,
        caller: &Principal,
        title: &str,
        description: &str,
    ) -> anyhow::Result<TaskDto> {
        check_title(title).map_err(|problem| anyhow!("{problem}"))?;

        self.last_id += 1;
        let task = TaskDto {
            id: self.last_id,
            title: title.to_string(),
            description: description.to_string(),
            owner: caller.clone(),
            is_done: false,
        };
        self.tasks.push(task.clone());
        debug!(id = task.id, owner = %caller, "task created");
        Ok(task)
    }

    pub fn edit(
        &mut self,
        caller: &Principal,
        task_id: TaskId,
        updated: &TaskDto,
    ) -> anyhow::Result<TaskDto> {
        check_title(&updated.title).map_err(|problem| anyhow!("{problem}"))?;

        let task = self.owned_mut(caller, task_id)?;
        task.title = updated.title.clone();
        task.description = updated.description.clone();
        Ok(task.clone())
    }

    pub fn toggle(
        &mut self,
        caller: &Principal,
        task_id: TaskId,
        is_done: bool,
    ) -> anyhow::Result<TaskDto> {
        let task = self.owned_mut(caller, task_id)?;
        task.is_done = is_done;
        Ok(task.clone())
    }

    pub fn delete(&mut self, caller: &Principal, task_id: TaskId) -> anyhow::Result<()> {
        self.owned_mut(caller, task_id)?;
        self.tasks.retain(|task| task.id != task_id);
        debug!(id = task_id, owner = %caller, "task deleted");
        Ok(())
    }

    pub fn get(&self, caller: &Principal, task_id: TaskId) -> anyhow::Result<TaskDto> {
        self.tasks
            .iter()
            .find(|task| task.id == task_id && &task.owner == caller)
            .cloned()
            .ok_or_else(|| anyhow!("task {task_id} not found"))
    }

    pub fn view(&self, caller: &Principal, view: TaskView) -> Vec<TaskDto> {
        self.tasks
            .iter()
            .filter(|task| &task.owner == caller && view.admits(task))
            .cloned()
            .collect()
    }

    pub fn profile(&self, caller: &Principal) -> Option<UserProfile> {
        self.profiles.get(caller).cloned()
    }

    pub fn save_profile(&mut self, caller: &Principal, profile: UserProfile) -> anyhow::Result<()> {
        if profile.name.trim().is_empty() {
            return Err(anyhow!("profile name cannot be empty"));
        }
        self.profiles.insert(caller.clone(), profile);
        Ok(())
    }

    fn owned_mut(&mut self, caller: &Principal, task_id: TaskId) -> anyhow::Result<&mut TaskDto> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| anyhow!("task {task_id} not found"))?;
        if &task.owner != caller {
            return Err(anyhow!("not authorized to modify task {task_id}"));
        }
        Ok(task)
    }
}
