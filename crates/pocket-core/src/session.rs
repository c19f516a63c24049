use std::sync::Arc;

use parking_lot::Mutex;
use pocket_shared::{Principal, UserProfile};
use tracing::{info, instrument, warn};

use crate::cache::{QueryCache, QueryData, QueryKey};
use crate::client::TaskClient;
use crate::connection::{Connection, ConnectionState};
use crate::service::TaskService;

/// Top-level screen selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppGate {
    Initializing,
    SignedOut,
    LoadingProfile,
    /// Signed in and the service reports no profile for the caller.
    ProfileSetup,
    /// `profile` is `None` when the profile query failed; the task views
    /// stay usable in that case.
    Ready { profile: Option<UserProfile> },
}

/// Owns the connection and the query cache for one login lifetime. A
/// logout or a change of identity drops every cached entry.
#[derive(Debug, Clone)]
pub struct Session {
    client: TaskClient,
    /// Identity the cached entries belong to. Survives `begin_login`.
    bound: Arc<Mutex<Option<Principal>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let connection = Connection::new();
        let cache = Arc::new(QueryCache::new());
        Self {
            client: TaskClient::new(connection, cache),
            bound: Arc::new(Mutex::new(None)),
        }
    }

    pub fn client(&self) -> &TaskClient {
        &self.client
    }

    pub fn identity(&self) -> Option<Principal> {
        self.client.connection().identity()
    }

    pub fn state(&self) -> ConnectionState {
        self.client.connection().state()
    }

    pub fn begin_login(&self) {
        self.client.connection().begin();
    }

    #[instrument(skip(self, service), fields(identity = %identity))]
    pub fn connect(&self, identity: Principal, service: Arc<dyn TaskService>) {
        let mut bound = self.bound.lock();
        if let Some(previous) = bound.as_ref()
            && *previous != identity
        {
            warn!(previous = %previous, "identity changed; dropping cached queries");
            self.client.cache().clear();
        }
        *bound = Some(identity.clone());
        self.client.connection().establish(identity, service);
    }

    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.client.connection().drop_channel();
        self.client.cache().clear();
        *self.bound.lock() = None;
        info!("logged out");
    }

    /// Screen implied by the current connection state and the cached
    /// profile query. Does not fetch.
    pub fn gate(&self) -> AppGate {
        match self.state() {
            ConnectionState::Disconnected => AppGate::SignedOut,
            ConnectionState::Connecting => AppGate::Initializing,
            ConnectionState::Ready => {
                let snapshot = self.client.snapshot(QueryKey::Profile);
                match snapshot.data {
                    Some(QueryData::Profile(Some(profile))) => AppGate::Ready {
                        profile: Some(profile),
                    },
                    Some(QueryData::Profile(None)) => AppGate::ProfileSetup,
                    _ if snapshot.error.is_some() => AppGate::Ready { profile: None },
                    _ => AppGate::LoadingProfile,
                }
            }
        }
    }

    /// Fetches the profile when connected, then reports the gate.
    pub async fn resolve_gate(&self) -> AppGate {
        if self.state() == ConnectionState::Ready
            && let Err(err) = self.client.caller_profile().await
        {
            warn!(error = %err, "profile query failed");
        }
        self.gate()
    }
}
