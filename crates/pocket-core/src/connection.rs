use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use pocket_shared::Principal;
use tracing::info;

use crate::error::{ClientError, ClientResult};
use crate::service::TaskService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
        };
        f.write_str(label)
    }
}

enum Channel {
    Disconnected,
    Connecting,
    Ready {
        identity: Principal,
        service: Arc<dyn TaskService>,
    },
}

/// Gate in front of the remote channel. Queries and mutations only see a
/// service once the state is `Ready`.
#[derive(Clone)]
pub struct Connection {
    channel: Arc<RwLock<Channel>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(RwLock::new(Channel::Disconnected)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.channel.read() {
            Channel::Disconnected => ConnectionState::Disconnected,
            Channel::Connecting => ConnectionState::Connecting,
            Channel::Ready { .. } => ConnectionState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn identity(&self) -> Option<Principal> {
        match &*self.channel.read() {
            Channel::Ready { identity, .. } => Some(identity.clone()),
            _ => None,
        }
    }

    pub fn begin(&self) {
        *self.channel.write() = Channel::Connecting;
        info!("remote channel connecting");
    }

    pub fn establish(&self, identity: Principal, service: Arc<dyn TaskService>) {
        info!(identity = %identity, backend = service.name(), "remote channel ready");
        *self.channel.write() = Channel::Ready { identity, service };
    }

    pub fn drop_channel(&self) {
        *self.channel.write() = Channel::Disconnected;
        info!("remote channel disconnected");
    }

    /// The bound service, or `NotReady` while not connected.
    pub fn service(&self) -> ClientResult<Arc<dyn TaskService>> {
        match &*self.channel.read() {
            Channel::Ready { service, .. } => Ok(Arc::clone(service)),
            _ => Err(ClientError::NotReady),
        }
    }
}
