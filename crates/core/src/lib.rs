#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod epoch;
pub mod expiration;

pub use epoch::{
    epoch_expiry, epochs_for_duration, expiry_for_duration, EpochError, NetworkInfo,
    EPOCH_DURATION_PARAMETER,
};
pub use expiration::{prepare_expiration_headers, ExpirationError};

pub const ID_LENGTH: usize = 32;
pub const OWNER_ID_LENGTH: usize = 25;
pub const NEO3_ADDRESS_PREFIX: u8 = 0x35;
pub const COMPRESSED_KEY_LENGTH: usize = 33;

// PUSHDATA1 0x21 <key> SYSCALL System.Crypto.CheckSig
const VERIFICATION_SCRIPT_PREFIX: [u8; 2] = [0x0c, 0x21];
const VERIFICATION_SCRIPT_SUFFIX: [u8; 5] = [0x41, 0x56, 0xe7, 0xb3, 0x27];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid identifier: base58 decode failed")]
    Base58,
    #[error("invalid identifier: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("invalid owner ID: expected prefix 0x{expected:02x}, got 0x{actual:02x}")]
    WrongPrefix { expected: u8, actual: u8 },
    #[error("invalid owner ID: checksum mismatch")]
    ChecksumMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId([u8; ID_LENGTH]);

impl ContainerId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Content-addresses a container definition the way the network does.
    #[must_use]
    pub fn from_definition(definition: &[u8]) -> Self {
        Self(Sha256::digest(definition).into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for ContainerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_digest(s).map(Self)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContainerId> for String {
    fn from(value: ContainerId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; ID_LENGTH]);

impl ObjectId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for ObjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_digest(s).map(Self)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.to_string()
    }
}

/// OwnerId is the NEO3 wallet address of a principal: version byte, script
/// hash of the single-key verification script, and a 4-byte checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId([u8; OWNER_ID_LENGTH]);

impl OwnerId {
    /// Derives the owner ID for a SEC1 compressed P-256 public key.
    #[must_use]
    pub fn from_compressed_key(compressed: &[u8; COMPRESSED_KEY_LENGTH]) -> Self {
        let mut script = Vec::with_capacity(
            VERIFICATION_SCRIPT_PREFIX.len()
                + COMPRESSED_KEY_LENGTH
                + VERIFICATION_SCRIPT_SUFFIX.len(),
        );
        script.extend_from_slice(&VERIFICATION_SCRIPT_PREFIX);
        script.extend_from_slice(compressed);
        script.extend_from_slice(&VERIFICATION_SCRIPT_SUFFIX);

        let script_hash = Ripemd160::digest(Sha256::digest(&script));
        let mut out = [0_u8; OWNER_ID_LENGTH];
        out[0] = NEO3_ADDRESS_PREFIX;
        out[1..21].copy_from_slice(&script_hash);
        let sum = checksum(&out[..21]);
        out[21..].copy_from_slice(&sum);
        Self(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != OWNER_ID_LENGTH {
            return Err(CoreError::WrongLength {
                expected: OWNER_ID_LENGTH,
                actual: bytes.len(),
            });
        }
        if bytes[0] != NEO3_ADDRESS_PREFIX {
            return Err(CoreError::WrongPrefix {
                expected: NEO3_ADDRESS_PREFIX,
                actual: bytes[0],
            });
        }
        if checksum(&bytes[..21]) != bytes[21..] {
            return Err(CoreError::ChecksumMismatch);
        }

        let mut out = [0_u8; OWNER_ID_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; OWNER_ID_LENGTH] {
        &self.0
    }

    #[must_use]
    pub fn script_hash(&self) -> &[u8] {
        &self.0[1..21]
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for OwnerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|_| CoreError::Base58)?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.to_string()
    }
}

/// Address names either a whole container or one object inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub container: ContainerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectId>,
}

impl Address {
    #[must_use]
    pub fn container(container: ContainerId) -> Self {
        Self {
            container,
            object: None,
        }
    }

    #[must_use]
    pub fn object(container: ContainerId, object: ObjectId) -> Self {
        Self {
            container,
            object: Some(object),
        }
    }

    /// Reports whether `other` falls under this address. A container-wide
    /// address covers every object in the container.
    #[must_use]
    pub fn covers(&self, other: &Address) -> bool {
        if self.container != other.container {
            return false;
        }
        match self.object {
            None => true,
            Some(object) => other.object == Some(object),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.object {
            Some(object) => write!(f, "{}/{}", self.container, object),
            None => self.container.fmt(f),
        }
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((container, object)) => Ok(Self::object(container.parse()?, object.parse()?)),
            None => Ok(Self::container(s.parse()?)),
        }
    }
}

fn decode_digest(s: &str) -> Result<[u8; ID_LENGTH], CoreError> {
    let bytes = bs58::decode(s).into_vec().map_err(|_| CoreError::Base58)?;
    if bytes.len() != ID_LENGTH {
        return Err(CoreError::WrongLength {
            expected: ID_LENGTH,
            actual: bytes.len(),
        });
    }
    let mut out = [0_u8; ID_LENGTH];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut out = [0_u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}
