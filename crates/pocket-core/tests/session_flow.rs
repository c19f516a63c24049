use std::sync::Arc;
use std::time::Duration;

use pocket_core::service::{MemoryTaskService, TaskService};
use pocket_core::{AppGate, ClientError, ConnectionState, QueryKey, Session};
use pocket_shared::{Principal, TaskView, UserProfile};

fn ann() -> Principal {
    Principal::new("ann")
}

fn bob() -> Principal {
    Principal::new("bob")
}

#[tokio::test]
async fn gate_walks_from_sign_in_to_ready() {
    let service = MemoryTaskService::new(ann());
    let session = Session::new();
    assert_eq!(session.gate(), AppGate::SignedOut);

    session.begin_login();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.gate(), AppGate::Initializing);
    assert_eq!(session.resolve_gate().await, AppGate::Initializing);

    session.connect(ann(), Arc::new(service.clone()));
    assert_eq!(session.gate(), AppGate::LoadingProfile);
    assert_eq!(session.resolve_gate().await, AppGate::ProfileSetup);

    session
        .client()
        .save_caller_profile("Ann")
        .await
        .expect("save profile");
    assert_eq!(
        session.resolve_gate().await,
        AppGate::Ready {
            profile: Some(UserProfile {
                name: "Ann".to_string()
            })
        }
    );
    assert_eq!(service.calls("get_caller_user_profile"), 2);
}

#[tokio::test]
async fn profile_failure_still_opens_the_task_views() {
    let service = MemoryTaskService::new(ann());
    service
        .create_task("Buy milk".to_string(), String::new())
        .await
        .expect("seed");
    let session = Session::new();
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));

    service.fail_next("profile lookup timed out");
    assert_eq!(session.resolve_gate().await, AppGate::Ready { profile: None });

    let tasks = session
        .client()
        .tasks(TaskView::All)
        .await
        .expect("tasks still load");
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn switching_identity_drops_cached_entries() {
    let service = MemoryTaskService::new(ann());
    service
        .create_task("ann's task".to_string(), String::new())
        .await
        .expect("seed");
    let session = Session::new();
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));

    let seen = session.client().tasks(TaskView::All).await.expect("ann tasks");
    assert_eq!(seen.len(), 1);
    assert!(!session.client().cache().keys().is_empty());

    session.begin_login();
    session.connect(bob(), Arc::new(service.as_caller(bob())));
    assert!(session.client().cache().keys().is_empty());
    assert_eq!(session.identity(), Some(bob()));

    let seen = session.client().tasks(TaskView::All).await.expect("bob tasks");
    assert!(seen.is_empty());
    assert_eq!(service.calls("get_all_tasks"), 2);
}

#[tokio::test]
async fn reconnecting_the_same_identity_keeps_the_cache() {
    let service = MemoryTaskService::new(ann());
    let session = Session::new();
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));
    session.client().tasks(TaskView::All).await.expect("tasks");

    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));
    session.client().tasks(TaskView::All).await.expect("tasks");

    assert_eq!(service.calls("get_all_tasks"), 1);
}

#[tokio::test]
async fn logout_clears_everything_and_disables_queries() {
    let service = MemoryTaskService::new(ann());
    let session = Session::new();
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));
    session.resolve_gate().await;
    let _ = session.client().all_views().await;

    session.logout();
    assert_eq!(session.gate(), AppGate::SignedOut);
    assert_eq!(session.identity(), None);
    assert!(session.client().cache().keys().is_empty());
    assert_eq!(
        session.client().tasks(TaskView::All).await,
        Err(ClientError::NotReady)
    );

    // Signing back in as the same user starts from an empty cache.
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));
    session.client().tasks(TaskView::All).await.expect("tasks");
    assert_eq!(service.calls("get_all_tasks"), 2);
}

#[tokio::test(start_paused = true)]
async fn fetch_finishing_after_logout_is_discarded() {
    let service = MemoryTaskService::new(ann()).with_latency(Duration::from_millis(40));
    let session = Session::new();
    session.begin_login();
    session.connect(ann(), Arc::new(service.clone()));

    let client = session.client().clone();
    let late = tokio::spawn(async move { client.tasks(TaskView::All).await });
    let key = QueryKey::Tasks(TaskView::All);
    while !session.client().cache().snapshot(key).is_fetching {
        tokio::task::yield_now().await;
    }

    session.logout();
    late.await.expect("join").expect("fetch itself succeeds");

    assert!(session.client().cache().keys().is_empty());
    assert_eq!(session.client().snapshot(key).data, None);
}
