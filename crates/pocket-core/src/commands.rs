use std::sync::Arc;

use anyhow::{Context, anyhow};
use pocket_shared::{Principal, TaskId, TaskView};
use tracing::{debug, info, instrument};

use crate::cli::{Command, ProfileAction};
use crate::client::TaskClient;
use crate::config::Config;
use crate::render::Renderer;
use crate::service::TaskService;
use crate::session::{AppGate, Session};
use crate::view::{SortOrder, TaskDraft, ViewAction, ViewState};

/// One login lifetime around a single command. The session is logged out
/// whether or not the command succeeds.
#[instrument(skip(session, identity, service, cfg, renderer, command), fields(identity = %identity))]
pub async fn run_session(
    session: &Session,
    identity: Principal,
    service: Arc<dyn TaskService>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    session.begin_login();
    session.connect(identity, service);

    let outcome = dispatch(session, cfg, renderer, command).await;

    session.logout();
    outcome
}

#[instrument(skip(session, cfg, renderer, command))]
pub async fn dispatch(
    session: &Session,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");
    let client = session.client();

    let gate = session.resolve_gate().await;
    if gate == AppGate::ProfileSetup && !matches!(command, Command::Profile { .. }) {
        info!("no profile for caller; suggesting setup");
        eprintln!("Welcome to Pocket Tasks! Set your name with `pocket profile set <name>`.");
    }

    let result = match command {
        Command::List { view, sort } => cmd_list(client, cfg, renderer, view, sort).await,
        Command::Add { title, description } => cmd_add(client, &title, &description).await,
        Command::Edit {
            id,
            title,
            description,
        } => cmd_edit(client, id, title, description).await,
        Command::Done { id } => cmd_toggle(client, id, true).await,
        Command::Undone { id } => cmd_toggle(client, id, false).await,
        Command::Delete { id } => cmd_delete(client, id).await,
        Command::Show { id } => cmd_show(client, renderer, id).await,
        Command::Profile { action } => cmd_profile(session, renderer, action).await,
    };

    renderer.print_notices(&client.take_notices())?;
    result
}

#[instrument(skip(client, cfg, renderer))]
async fn cmd_list(
    client: &TaskClient,
    cfg: &Config,
    renderer: &mut Renderer,
    view: Option<String>,
    sort: Option<String>,
) -> anyhow::Result<()> {
    let filter = match view {
        Some(raw) => TaskView::parse(&raw).ok_or_else(|| anyhow!("unknown view: {raw}"))?,
        None => cfg.default_filter()?,
    };
    let sort = match sort {
        Some(raw) => SortOrder::parse(&raw).ok_or_else(|| anyhow!("unknown sort: {raw}"))?,
        None => cfg.default_sort()?,
    };

    let mut state = ViewState::default();
    state.apply(ViewAction::SelectFilter(filter));
    state.apply(ViewAction::SelectSort(sort));

    // Failures are carried by the snapshot and rendered as a list state.
    if let Err(err) = client.tasks(state.filter).await {
        debug!(error = %err, "task view query failed");
    }
    let snapshot = client.snapshot(state.query_key());
    let list = state.list_state(&snapshot, client.connection().is_ready());
    renderer.print_task_list(&list)
}

async fn cmd_add(client: &TaskClient, title: &str, description: &str) -> anyhow::Result<()> {
    let mut draft = TaskDraft::new();
    draft.title = title.to_string();
    draft.description = description.to_string();
    if !draft.can_submit() {
        return Err(anyhow!(
            "a title of 1 to {} characters is required ({})",
            pocket_shared::TITLE_MAX_CHARS,
            draft.counter_label()
        ));
    }

    let task = client
        .create_task(&draft.title, &draft.description)
        .await
        .context("create failed")?;
    println!("Created task {}.", task.id);
    Ok(())
}

async fn cmd_edit(
    client: &TaskClient,
    id: TaskId,
    title: Option<String>,
    description: Option<String>,
) -> anyhow::Result<()> {
    if title.is_none() && description.is_none() {
        return Err(anyhow!("nothing to change; pass --title and/or --description"));
    }

    let task = client.task(id).await.context("task lookup failed")?;
    let mut draft = TaskDraft::for_task(&task);
    if let Some(title) = title {
        draft.title = title;
    }
    if let Some(description) = description {
        draft.description = description;
    }

    let saved = client
        .edit_task(id, draft.apply_to(&task))
        .await
        .context("edit failed")?;
    println!("Modified task {}.", saved.id);
    Ok(())
}

async fn cmd_toggle(client: &TaskClient, id: TaskId, is_done: bool) -> anyhow::Result<()> {
    let task = client
        .toggle_task(id, is_done)
        .await
        .context("update failed")?;
    if task.is_done {
        println!("Completed task {} '{}'.", task.id, task.title);
    } else {
        println!("Reopened task {} '{}'.", task.id, task.title);
    }
    Ok(())
}

async fn cmd_delete(client: &TaskClient, id: TaskId) -> anyhow::Result<()> {
    client.delete_task(id).await.context("delete failed")?;
    println!("Deleted task {id}.");
    Ok(())
}

async fn cmd_show(client: &TaskClient, renderer: &mut Renderer, id: TaskId) -> anyhow::Result<()> {
    let task = client.task(id).await?;
    renderer.print_task_info(&task)
}

async fn cmd_profile(
    session: &Session,
    renderer: &mut Renderer,
    action: Option<ProfileAction>,
) -> anyhow::Result<()> {
    let client = session.client();
    match action {
        Some(ProfileAction::Set { name }) => {
            let profile = client
                .save_caller_profile(&name)
                .await
                .context("failed to save profile")?;
            println!("Saved profile '{}'.", profile.name);
        }
        None => {
            let profile = client.caller_profile().await?;
            renderer.print_profile(profile.as_ref())?;
        }
    }

    debug!(gate = ?session.gate(), "profile command finished");
    Ok(())
}
