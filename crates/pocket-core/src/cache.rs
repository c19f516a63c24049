//! Keyed query cache with per-key single-flight fetches.
//!
//! Entries are only ever filled from a completed fetch. Mutations never
//! write into the cache; they mark key sets stale with
//! [`QueryCache::invalidate`] and the next read refetches.
//!
//! Fetches run on spawned tokio tasks, so a caller that stops waiting does
//! not cancel the fetch: its result still lands in the cache.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use pocket_shared::{TaskDto, TaskId, TaskView, UserProfile};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Tasks(TaskView),
    Task(TaskId),
    Profile,
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Tasks(view) => write!(f, "tasks/{view}"),
            QueryKey::Task(id) => write!(f, "task/{id}"),
            QueryKey::Profile => f.write_str("currentUserProfile"),
        }
    }
}

/// A set of keys, used for invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// Every view list and every single-task entry.
    AllTasks,
    Profile,
    Exact(QueryKey),
    Everything,
}

impl KeyScope {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyScope::AllTasks => matches!(key, QueryKey::Tasks(_) | QueryKey::Task(_)),
            KeyScope::Profile => *key == QueryKey::Profile,
            KeyScope::Exact(exact) => exact == key,
            KeyScope::Everything => true,
        }
    }
}

/// Result payload of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    Tasks(Vec<TaskDto>),
    Task(TaskDto),
    Profile(Option<UserProfile>),
}

impl QueryData {
    pub fn into_tasks(self) -> ClientResult<Vec<TaskDto>> {
        match self {
            QueryData::Tasks(tasks) => Ok(tasks),
            other => Err(mismatch("task list", &other)),
        }
    }

    pub fn into_task(self) -> ClientResult<TaskDto> {
        match self {
            QueryData::Task(task) => Ok(task),
            other => Err(mismatch("task", &other)),
        }
    }

    pub fn into_profile(self) -> ClientResult<Option<UserProfile>> {
        match self {
            QueryData::Profile(profile) => Ok(profile),
            other => Err(mismatch("profile", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &QueryData) -> ClientError {
    ClientError::Remote {
        message: format!("cached value is not a {expected}: {got:?}"),
    }
}

/// Non-blocking view of one key, for rendering.
///
/// Loading, failed and empty are distinct: `is_loading` has neither data
/// nor error, `is_error` carries the failure, and an empty list is `data`
/// holding zero items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySnapshot {
    pub data: Option<QueryData>,
    pub error: Option<ClientError>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl QuerySnapshot {
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none() && self.is_fetching
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Fetched(QueryKey),
    Failed(QueryKey),
    Invalidated(QueryKey),
    Cleared,
}

type SharedFetch = Shared<BoxFuture<'static, ClientResult<QueryData>>>;

struct InFlight {
    fetch_id: u64,
    generation: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct Entry {
    data: Option<QueryData>,
    error: Option<ClientError>,
    stale: bool,
    /// Bumped by every invalidation of this key.
    generation: u64,
    /// Newest fetch whose result has been recorded.
    settled_fetch: u64,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn fresh_data(&self) -> Option<QueryData> {
        if self.stale || self.error.is_some() {
            return None;
        }
        self.data.clone()
    }

    fn joinable(&self) -> Option<&InFlight> {
        self.in_flight
            .as_ref()
            .filter(|in_flight| in_flight.generation == self.generation)
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, Entry>,
    next_fetch_id: u64,
    /// Bumped by `clear`; fetches started under an older epoch are dropped.
    epoch: u64,
}

pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("QueryCache")
            .field("entries", &inner.entries.len())
            .field("epoch", &inner.epoch)
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(CacheInner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Returns the cached value for `key` when present and fresh.
    /// Otherwise joins the fetch already in flight for the key's current
    /// generation, or starts one by calling `fetch`.
    ///
    /// `fetch` is invoked with the cache lock held and must only build
    /// the future; all work belongs inside the future. Must be called from
    /// within a tokio runtime.
    pub async fn query<F, Fut>(&self, key: QueryKey, fetch: F) -> ClientResult<QueryData>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<QueryData>> + Send + 'static,
    {
        let pending = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let epoch = inner.epoch;
            let entry = inner.entries.entry(key).or_default();

            if let Some(data) = entry.fresh_data() {
                debug!(%key, "query cache hit");
                return Ok(data);
            }

            if let Some(in_flight) = entry.joinable() {
                debug!(%key, fetch_id = in_flight.fetch_id, "joining in-flight fetch");
                in_flight.future.clone()
            } else {
                inner.next_fetch_id += 1;
                let fetch_id = inner.next_fetch_id;
                let generation = entry.generation;
                debug!(%key, fetch_id, generation, "starting fetch");

                let store = Arc::clone(&self.inner);
                let events = self.events.clone();
                let fut = fetch();
                let handle = tokio::spawn(async move {
                    let result = fut.await;
                    settle(&store, &events, key, fetch_id, generation, epoch, &result);
                    result
                });

                let future = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(err) => Err(ClientError::Remote {
                            message: format!("fetch for {key} did not complete: {err}"),
                        }),
                    }
                }
                .boxed()
                .shared();

                entry.in_flight = Some(InFlight {
                    fetch_id,
                    generation,
                    future: future.clone(),
                });
                future
            }
        };

        pending.await
    }

    pub fn snapshot(&self, key: QueryKey) -> QuerySnapshot {
        let inner = self.inner.lock();
        let Some(entry) = inner.entries.get(&key) else {
            return QuerySnapshot::default();
        };
        QuerySnapshot {
            data: entry.data.clone(),
            error: entry.error.clone(),
            is_fetching: entry.in_flight.is_some(),
            is_stale: entry.stale,
        }
    }

    /// Marks every matching entry stale and returns how many matched.
    /// Repeating an invalidation costs nothing beyond the single refetch
    /// the next read performs.
    pub fn invalidate(&self, scope: KeyScope) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for (key, entry) in inner.entries.iter_mut().filter(|(key, _)| scope.matches(key)) {
            entry.generation += 1;
            entry.stale = true;
            count += 1;
            let _ = self.events.send(CacheEvent::Invalidated(*key));
        }
        debug!(?scope, count, "invalidated queries");
        count
    }

    /// Drops every entry. Fetches still running complete into nothing.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        let dropped = inner.entries.len();
        inner.entries.clear();
        debug!(dropped, epoch = inner.epoch, "query cache cleared");
        let _ = self.events.send(CacheEvent::Cleared);
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let inner = self.inner.lock();
        let mut keys: Vec<QueryKey> = inner.entries.keys().copied().collect();
        keys.sort();
        keys
    }
}

fn settle(
    store: &Mutex<CacheInner>,
    events: &broadcast::Sender<CacheEvent>,
    key: QueryKey,
    fetch_id: u64,
    generation: u64,
    epoch: u64,
    result: &ClientResult<QueryData>,
) {
    let mut inner = store.lock();
    if inner.epoch != epoch {
        debug!(%key, fetch_id, "discarding fetch started before cache clear");
        return;
    }

    let Some(entry) = inner.entries.get_mut(&key) else {
        return;
    };
    if entry
        .in_flight
        .as_ref()
        .is_some_and(|in_flight| in_flight.fetch_id == fetch_id)
    {
        entry.in_flight = None;
    }
    if fetch_id < entry.settled_fetch {
        debug!(%key, fetch_id, settled = entry.settled_fetch, "ignoring superseded fetch");
        return;
    }
    entry.settled_fetch = fetch_id;

    match result {
        Ok(data) => {
            entry.data = Some(data.clone());
            entry.error = None;
            entry.stale = entry.generation != generation;
            debug!(%key, fetch_id, stale = entry.stale, "fetch settled");
            let _ = events.send(CacheEvent::Fetched(key));
        }
        Err(err) => {
            warn!(%key, fetch_id, error = %err, "fetch failed");
            entry.error = Some(err.clone());
            let _ = events.send(CacheEvent::Failed(key));
        }
    }
}
