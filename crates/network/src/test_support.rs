#![forbid(unsafe_code)]

//! In-memory [`NetworkClient`] for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gaspump_auth::{EaclTable, SessionHandle, SignerKey};
use gaspump_core::{ContainerId, NetworkInfo};
use uuid::Uuid;

use crate::{NetworkClient, NetworkError};

#[derive(Debug, Default)]
struct State {
    stored: HashMap<ContainerId, EaclTable>,
    // Submitted tables become readable after the given number of reads.
    lagging: HashMap<ContainerId, (EaclTable, u32)>,
    containers: HashMap<ContainerId, u32>,
    sessions: Vec<(Uuid, u64)>,
    read_failures: u32,
    reads: u32,
}

#[derive(Debug)]
pub struct MemoryNetwork {
    info: Mutex<NetworkInfo>,
    state: Mutex<State>,
    eacl_lag: u32,
    reorder_on_store: bool,
    latency: Option<Duration>,
    offline: bool,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new(info: NetworkInfo) -> Self {
        Self {
            info: Mutex::new(info),
            state: Mutex::new(State::default()),
            eacl_lag: 0,
            reorder_on_store: false,
            latency: None,
            offline: false,
        }
    }

    /// Epoch 1000, 15 s blocks, 240 blocks per epoch (one hour).
    #[must_use]
    pub fn testnet() -> Self {
        Self::new(NetworkInfo {
            current_epoch: 1_000,
            ms_per_block: 15_000,
            epoch_duration_blocks: Some(240),
        })
    }

    /// Submitted tables stay invisible for `reads` reads.
    #[must_use]
    pub fn with_eacl_lag(mut self, reads: u32) -> Self {
        self.eacl_lag = reads;
        self
    }

    /// The first `count` EACL reads fail with a transport error.
    #[must_use]
    pub fn with_read_failures(self, count: u32) -> Self {
        lock(&self.state).read_failures = count;
        self
    }

    /// Stores submitted tables with their records reversed, so readback
    /// never matches a table with two or more distinct records.
    #[must_use]
    pub fn with_reordering_store(mut self) -> Self {
        self.reorder_on_store = true;
        self
    }

    /// Every network-info query waits `latency` first.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All calls fail with a transport error.
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn set_epoch(&self, epoch: u64) {
        lock(&self.info).current_epoch = epoch;
    }

    /// Registers a container that becomes visible after `reads` existence
    /// checks.
    pub fn add_container(&self, container: ContainerId, reads: u32) {
        lock(&self.state).containers.insert(container, reads);
    }

    #[must_use]
    pub fn stored_eacl(&self, container: &ContainerId) -> Option<EaclTable> {
        lock(&self.state).stored.get(container).cloned()
    }

    /// Sessions opened so far as `(id, expiry epoch)`.
    #[must_use]
    pub fn sessions(&self) -> Vec<(Uuid, u64)> {
        lock(&self.state).sessions.clone()
    }

    #[must_use]
    pub fn eacl_reads(&self) -> u32 {
        lock(&self.state).reads
    }

    fn check_online(&self) -> Result<(), NetworkError> {
        if self.offline {
            return Err(NetworkError::Transport("connection refused".to_owned()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl NetworkClient for MemoryNetwork {
    async fn network_info(&self) -> Result<NetworkInfo, NetworkError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.check_online()?;
        Ok(*lock(&self.info))
    }

    async fn create_session(&self, expiry_epoch: u64) -> Result<SessionHandle, NetworkError> {
        self.check_online()?;
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            session_key: SignerKey::generate().public_key_bytes().to_vec(),
        };
        lock(&self.state).sessions.push((handle.id, expiry_epoch));
        Ok(handle)
    }

    async fn submit_eacl(&self, table: &EaclTable) -> Result<(), NetworkError> {
        self.check_online()?;
        let stored = if self.reorder_on_store {
            let mut reordered = EaclTable::new(table.container_id());
            for record in table.records().iter().rev() {
                reordered.push(record.clone());
            }
            reordered
        } else {
            table.clone()
        };

        let mut state = lock(&self.state);
        if self.eacl_lag == 0 {
            state.stored.insert(table.container_id(), stored);
        } else {
            state
                .lagging
                .insert(table.container_id(), (stored, self.eacl_lag));
        }
        Ok(())
    }

    async fn read_eacl(&self, container: &ContainerId) -> Result<EaclTable, NetworkError> {
        self.check_online()?;
        let mut state = lock(&self.state);
        state.reads += 1;
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(NetworkError::Transport("EACL read timed out".to_owned()));
        }

        let visible = match state.lagging.get_mut(container) {
            Some((_, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if visible {
            if let Some((table, _)) = state.lagging.remove(container) {
                state.stored.insert(*container, table);
            }
        }

        Ok(state
            .stored
            .get(container)
            .cloned()
            .unwrap_or_else(|| EaclTable::new(*container)))
    }

    async fn container_exists(&self, container: &ContainerId) -> Result<bool, NetworkError> {
        self.check_online()?;
        let mut state = lock(&self.state);
        match state.containers.get_mut(container) {
            Some(0) => Ok(true),
            Some(remaining) => {
                *remaining -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
