use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pocket_core::service::{MemoryTaskService, TaskService};
use pocket_core::{ClientError, MutationTarget, NoticeLevel, QueryKey, Session};
use pocket_shared::{Principal, TaskDto, TaskId, TaskView};

fn ann() -> Principal {
    Principal::new("ann")
}

fn connected(service: &MemoryTaskService) -> Session {
    let session = Session::new();
    session.begin_login();
    session.connect(service.caller().clone(), Arc::new(service.clone()));
    session
}

async fn seed(service: &MemoryTaskService, count: usize) {
    for n in 1..=count {
        service
            .create_task(format!("seed {n}"), String::new())
            .await
            .expect("seed task");
    }
}

fn ids(tasks: &[TaskDto]) -> BTreeSet<TaskId> {
    tasks.iter().map(|task| task.id).collect()
}

async fn view_ids(session: &Session) -> [BTreeSet<TaskId>; 3] {
    let [all, active, completed] = session.client().all_views().await;
    [
        ids(&all.expect("all")),
        ids(&active.expect("active")),
        ids(&completed.expect("completed")),
    ]
}

#[tokio::test]
async fn created_task_appears_in_all_and_active() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 6).await;
    let session = connected(&service);
    let client = session.client();

    let [all, _, _] = view_ids(&session).await;
    assert_eq!(all.len(), 6);

    let task = client
        .create_task("  Buy milk ", "2 litres")
        .await
        .expect("create");
    assert_eq!(task.id, 7);
    assert_eq!(task.title, "Buy milk");
    assert!(!task.is_done);
    assert_eq!(task.owner, ann());

    let [all, active, completed] = view_ids(&session).await;
    assert!(all.contains(&7));
    assert!(active.contains(&7));
    assert!(!completed.contains(&7));
    assert_eq!(service.calls("get_all_tasks"), 2);

    let notices = client.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Success);
    assert_eq!(notices[0].title, "Task created successfully");
    assert!(client.take_notices().is_empty());
}

#[tokio::test]
async fn toggling_moves_a_task_between_views() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 6).await;
    let session = connected(&service);
    let client = session.client();

    let created = client.create_task("Buy milk", "").await.expect("create");
    view_ids(&session).await;

    let toggled = client.toggle_task(created.id, true).await.expect("toggle");
    assert!(toggled.is_done);

    let [all, active, completed] = view_ids(&session).await;
    assert!(all.contains(&7));
    assert!(!active.contains(&7));
    assert!(completed.contains(&7));

    client.toggle_task(7, false).await.expect("reopen");
    let [_, active, completed] = view_ids(&session).await;
    assert!(active.contains(&7));
    assert!(!completed.contains(&7));
}

#[tokio::test]
async fn deleted_task_is_gone_everywhere() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 6).await;
    let session = connected(&service);
    let client = session.client();

    client.create_task("Buy milk", "").await.expect("create");
    client.task(7).await.expect("single task cached");
    view_ids(&session).await;

    client.delete_task(7).await.expect("delete");

    let [all, active, completed] = view_ids(&session).await;
    assert!(!all.contains(&7));
    assert!(!active.contains(&7));
    assert!(!completed.contains(&7));

    let err = client.task(7).await.expect_err("task should be gone");
    assert!(err.is_remote());
    assert!(err.to_string().contains("task 7 not found"), "{err}");
}

#[tokio::test]
async fn back_to_back_mutations_on_one_task_target_its_id() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 6).await;
    let session = connected(&service);
    let client = session.client();

    client.create_task("Buy milk", "").await.expect("create");
    view_ids(&session).await;

    client.toggle_task(7, true).await.expect("toggle");
    assert!(client.snapshot(QueryKey::Tasks(TaskView::Active)).is_stale);
    client.delete_task(7).await.expect("delete while views are stale");

    let [all, active, completed] = view_ids(&session).await;
    assert!(!all.contains(&7));
    assert!(!active.contains(&7));
    assert!(!completed.contains(&7));
    // Two invalidations before the next read still cost one refetch per view.
    assert_eq!(service.calls("get_all_tasks"), 2);
    assert_eq!(service.calls("get_completed_tasks"), 2);
}

#[tokio::test]
async fn deleting_an_unknown_task_fails() {
    let service = MemoryTaskService::new(ann());
    let session = connected(&service);
    let client = session.client();

    let err = client.delete_task(42).await.expect_err("unknown id");
    assert!(err.is_remote());

    let notices = client.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].title, "Failed to delete task");
}

#[tokio::test]
async fn saved_profile_is_returned_by_the_next_query() {
    let service = MemoryTaskService::new(ann());
    let session = connected(&service);
    let client = session.client();

    assert_eq!(client.caller_profile().await.expect("profile"), None);

    let saved = client.save_caller_profile(" Ann ").await.expect("save");
    assert_eq!(saved.name, "Ann");

    let profile = client.caller_profile().await.expect("profile");
    assert_eq!(profile.map(|p| p.name), Some("Ann".to_string()));
    assert_eq!(service.calls("get_caller_user_profile"), 2);
}

#[tokio::test]
async fn profile_save_leaves_task_views_cached() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 2).await;
    let session = connected(&service);
    let client = session.client();

    view_ids(&session).await;
    client.save_caller_profile("Ann").await.expect("save");
    view_ids(&session).await;

    assert_eq!(service.calls("get_all_tasks"), 1);
    assert_eq!(service.calls("get_active_tasks"), 1);
    assert_eq!(service.calls("get_completed_tasks"), 1);
}

#[tokio::test]
async fn views_partition_the_full_list() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 5).await;
    let session = connected(&service);
    let client = session.client();

    client.toggle_task(2, true).await.expect("toggle 2");
    client.toggle_task(4, true).await.expect("toggle 4");
    client.delete_task(5).await.expect("delete 5");
    client.create_task("later", "").await.expect("create");

    let [all, active, completed] = view_ids(&session).await;
    assert!(active.is_disjoint(&completed));
    let union: BTreeSet<TaskId> = active.union(&completed).copied().collect();
    assert_eq!(union, all);
    assert_eq!(completed, BTreeSet::from([2, 4]));
    assert_eq!(active, BTreeSet::from([1, 3, 6]));
}

#[tokio::test]
async fn edit_replaces_text_and_refreshes_the_single_task() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 1).await;
    let session = connected(&service);
    let client = session.client();

    let before = client.task(1).await.expect("task");
    client.toggle_task(1, true).await.expect("toggle");

    let edited = client
        .edit_task(
            1,
            TaskDto {
                title: " Buy oat milk ".to_string(),
                description: "barista".to_string(),
                ..before.clone()
            },
        )
        .await
        .expect("edit");
    assert_eq!(edited.title, "Buy oat milk");
    // Only text fields change; completion comes from the service.
    assert!(edited.is_done);

    let after = client.task(1).await.expect("task");
    assert_eq!(after.title, "Buy oat milk");
    assert_eq!(after.description, "barista");
    assert_eq!(service.calls("get_task"), 2);
}

#[tokio::test]
async fn failed_mutation_leaves_the_cache_untouched() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 3).await;
    let session = connected(&service);
    let client = session.client();

    view_ids(&session).await;
    let before = client.snapshot(QueryKey::Tasks(TaskView::All));

    service.fail_next("backend unavailable");
    let err = client
        .create_task("Buy milk", "")
        .await
        .expect_err("create should fail");
    assert!(matches!(err, ClientError::Remote { .. }));

    assert_eq!(client.snapshot(QueryKey::Tasks(TaskView::All)), before);
    view_ids(&session).await;
    assert_eq!(service.calls("get_all_tasks"), 1);

    let notices = client.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].title, "Failed to create task");
    assert!(
        notices[0]
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains("backend unavailable"))
    );
}

#[tokio::test]
async fn invalid_titles_never_reach_the_service() {
    let service = MemoryTaskService::new(ann());
    let session = connected(&service);
    let client = session.client();

    let blank = client.create_task("   ", "").await.expect_err("blank");
    assert!(matches!(blank, ClientError::Invalid { .. }));

    let long = client
        .create_task(&"x".repeat(81), "")
        .await
        .expect_err("too long");
    assert!(matches!(long, ClientError::Invalid { .. }));

    client
        .create_task(&"x".repeat(80), "")
        .await
        .expect("80 characters is allowed");
    assert_eq!(service.calls("create_task"), 1);

    let nameless = client.save_caller_profile("  ").await.expect_err("blank name");
    assert!(matches!(nameless, ClientError::Invalid { .. }));
    assert_eq!(service.calls("save_caller_user_profile"), 0);
}

#[tokio::test]
async fn other_callers_cannot_touch_a_task() {
    let service = MemoryTaskService::new(ann());
    seed(&service, 1).await;
    let bob = service.as_caller(Principal::new("bob"));
    let session = connected(&bob);
    let client = session.client();

    let err = client.toggle_task(1, true).await.expect_err("not owner");
    assert!(err.to_string().contains("not authorized"), "{err}");

    let [all, _, _] = view_ids(&session).await;
    assert!(all.is_empty());
}

#[tokio::test]
async fn nothing_is_issued_before_the_channel_is_ready() {
    let service = MemoryTaskService::new(ann());
    let session = Session::new();
    let client = session.client();

    assert_eq!(client.tasks(TaskView::All).await, Err(ClientError::NotReady));
    assert_eq!(client.task(1).await, Err(ClientError::NotReady));
    assert_eq!(
        client.create_task("Buy milk", "").await,
        Err(ClientError::NotReady)
    );

    session.begin_login();
    assert_eq!(client.caller_profile().await, Err(ClientError::NotReady));
    assert!(!client.snapshot(QueryKey::Profile).is_loading());
    assert!(client.take_notices().is_empty());
    assert_eq!(service.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_view_reads_hit_the_service_once() {
    let service = MemoryTaskService::new(ann()).with_latency(Duration::from_millis(30));
    let session = connected(&service);
    let client = session.client();

    let (a, b, c) = tokio::join!(
        client.tasks(TaskView::Active),
        client.tasks(TaskView::Active),
        client.tasks(TaskView::Active),
    );
    assert_eq!(a.expect("a"), b.expect("b"));
    assert!(c.expect("c").is_empty());
    assert_eq!(service.calls("get_active_tasks"), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_submissions_are_rejected_while_pending() {
    let service = MemoryTaskService::new(ann()).with_latency(Duration::from_millis(30));
    seed(&service, 2).await;
    let session = connected(&service);
    let client = session.client();

    let (first, second, other) = tokio::join!(
        client.toggle_task(1, true),
        client.toggle_task(1, true),
        client.toggle_task(2, true),
    );
    assert!(first.expect("first").is_done);
    assert_eq!(
        second,
        Err(ClientError::MutationPending {
            target: MutationTarget::Task(1)
        })
    );
    assert!(other.expect("other target").is_done);

    assert!(!client.is_pending(MutationTarget::Task(1)));
    assert_eq!(service.calls("toggle_task"), 2);
}
