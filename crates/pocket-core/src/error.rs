//! Error surface of the task client.

use thiserror::Error;

use crate::client::MutationTarget;

/// Failure of a query or mutation.
///
/// `Clone` because one in-flight fetch is
/// shared by every caller waiting on the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The remote channel is not established yet.
    #[error("remote service is not connected")]
    NotReady,

    /// Any failed remote call: transport, validation or authorization.
    #[error("{message}")]
    Remote { message: String },

    /// Rejected before any remote call was issued.
    #[error("invalid input: {message}")]
    Invalid { message: String },

    /// A mutation for the same target has not completed yet.
    #[error("a {target} change is already in progress")]
    MutationPending { target: MutationTarget },
}

impl ClientError {
    pub fn remote(err: &anyhow::Error) -> Self {
        Self::Remote {
            message: format!("{err:#}"),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
