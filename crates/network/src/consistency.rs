#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use gaspump_auth::{equal_tables, EaclTable};
use gaspump_core::ContainerId;

use crate::{NetworkClient, NetworkError};

pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Runs `check` up to `policy.attempts` times, sleeping `policy.interval`
/// between attempts, until it reports `true`. Errors from `check` count as
/// a failed attempt.
pub async fn await_condition<F, Fut>(policy: PollPolicy, mut check: F) -> Result<(), NetworkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, NetworkError>>,
{
    for attempt in 1..=policy.attempts {
        match check().await {
            Ok(true) => {
                tracing::debug!(attempt, "condition met");
                return Ok(());
            }
            Ok(false) => tracing::debug!(attempt, "condition not met yet"),
            Err(error) => tracing::debug!(attempt, %error, "poll read failed; retrying"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(NetworkError::ConsistencyTimeout {
        attempts: policy.attempts,
    })
}

/// Submits `table` and waits until the network returns an identical table
/// for the container. Submission errors are returned immediately. Nothing is
/// rolled back on timeout.
pub async fn set_eacl_and_wait(
    client: &dyn NetworkClient,
    table: &EaclTable,
    policy: PollPolicy,
) -> Result<(), NetworkError> {
    let container = table.container_id();
    client.submit_eacl(table).await?;
    tracing::info!(%container, records = table.len(), "EACL submitted; waiting for confirmation");

    let result = await_condition(policy, || async move {
        let stored = client.read_eacl(&container).await?;
        Ok::<_, NetworkError>(equal_tables(&stored, table))
    })
    .await;

    match &result {
        Ok(()) => tracing::info!(%container, "EACL confirmed"),
        Err(error) => tracing::warn!(%container, %error, "EACL not confirmed"),
    }
    result
}

/// Waits until `container` is visible on the network.
pub async fn await_container(
    client: &dyn NetworkClient,
    container: &ContainerId,
    policy: PollPolicy,
) -> Result<(), NetworkError> {
    await_condition(policy, || client.container_exists(container)).await
}
