#![forbid(unsafe_code)]

use async_trait::async_trait;
use gaspump_auth::{EaclTable, SessionHandle};
use gaspump_core::{ContainerId, NetworkInfo};

pub mod consistency;
pub mod issue;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use consistency::{await_condition, await_container, set_eacl_and_wait, PollPolicy};
pub use issue::{
    build_bearer_token, create_session, issue_session_token, with_timeout, BearerOutcome,
    BearerRequest, Expiry, IssueError, SigningMode,
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("network transport error: {0}")]
    Transport(String),
    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),
    #[error("condition not met after {attempts} attempts")]
    ConsistencyTimeout { attempts: u32 },
}

/// The storage network as seen by token issuance. Implementations wrap a
/// real client; they must be safe to share across tasks.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Fresh network clock; never cached by callers.
    async fn network_info(&self) -> Result<NetworkInfo, NetworkError>;
    /// Opens a session valid until `expiry_epoch`.
    async fn create_session(&self, expiry_epoch: u64) -> Result<SessionHandle, NetworkError>;
    /// Submits `table` for its container. An ack does not mean the table is
    /// readable yet.
    async fn submit_eacl(&self, table: &EaclTable) -> Result<(), NetworkError>;
    async fn read_eacl(&self, container: &ContainerId) -> Result<EaclTable, NetworkError>;
    async fn container_exists(&self, container: &ContainerId) -> Result<bool, NetworkError>;
}
