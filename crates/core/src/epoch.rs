use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Network configuration key holding the number of blocks per epoch.
pub const EPOCH_DURATION_PARAMETER: &[u8] = b"EpochDuration";

/// Snapshot of the network clock. Always query a fresh one before computing
/// an expiry; a stale epoch yields a wrong lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub current_epoch: u64,
    pub ms_per_block: i64,
    pub epoch_duration_blocks: Option<u64>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EpochError {
    #[error("network did not report the EpochDuration parameter")]
    MissingEpochDuration,
    #[error("invalid block time: {0} ms")]
    InvalidBlockTime(i64),
    #[error("epoch arithmetic overflow")]
    Overflow,
}

impl NetworkInfo {
    /// Builds a snapshot from raw network configuration parameters, picking
    /// out the little-endian `EpochDuration` value. A zero value counts as
    /// absent.
    pub fn from_parameters<'a, I>(current_epoch: u64, ms_per_block: i64, parameters: I) -> Self
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let epoch_duration_blocks = parameters
            .into_iter()
            .find(|(key, _)| *key == EPOCH_DURATION_PARAMETER)
            .map(|(_, value)| decode_le_u64(value))
            .filter(|blocks| *blocks > 0);

        Self {
            current_epoch,
            ms_per_block,
            epoch_duration_blocks,
        }
    }

    /// Wall-clock length of one epoch.
    pub fn epoch_length(&self) -> Result<Duration, EpochError> {
        let millis = epoch_length_ms(self)?;
        let millis = u64::try_from(millis).map_err(|_| EpochError::Overflow)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Number of whole epochs that fit in `duration`:
/// `floor(duration_ms / (ms_per_block * blocks_per_epoch))`.
pub fn epochs_for_duration(info: &NetworkInfo, duration: Duration) -> Result<u64, EpochError> {
    let epoch_ms = epoch_length_ms(info)?;
    let epochs = duration.as_millis() / epoch_ms;
    u64::try_from(epochs).map_err(|_| EpochError::Overflow)
}

/// Absolute expiry epoch for a token that should live for `duration`.
pub fn expiry_for_duration(info: &NetworkInfo, duration: Duration) -> Result<u64, EpochError> {
    epoch_expiry(info.current_epoch, epochs_for_duration(info, duration)?)
}

pub fn epoch_expiry(current_epoch: u64, epochs_ahead: u64) -> Result<u64, EpochError> {
    current_epoch
        .checked_add(epochs_ahead)
        .ok_or(EpochError::Overflow)
}

fn epoch_length_ms(info: &NetworkInfo) -> Result<u128, EpochError> {
    if info.ms_per_block <= 0 {
        return Err(EpochError::InvalidBlockTime(info.ms_per_block));
    }
    let blocks = match info.epoch_duration_blocks {
        Some(blocks) if blocks > 0 => blocks,
        _ => return Err(EpochError::MissingEpochDuration),
    };
    Ok(u128::from(info.ms_per_block.unsigned_abs()) * u128::from(blocks))
}

fn decode_le_u64(value: &[u8]) -> u64 {
    let mut data = [0_u8; 8];
    let len = value.len().min(8);
    data[..len].copy_from_slice(&value[..len]);
    u64::from_le_bytes(data)
}
