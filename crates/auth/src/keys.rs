#![forbid(unsafe_code)]

use std::fmt;

use gaspump_core::OwnerId;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;

pub const COMPRESSED_KEY_LENGTH: usize = 33;
pub const UNCOMPRESSED_KEY_LENGTH: usize = 65;
pub const SECRET_KEY_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key: expected 33 or 65 bytes, got {0}")]
    WrongKeyLength(usize),
    #[error("invalid public key: point not on P-256 curve")]
    InvalidPoint,
    #[error("invalid private key: expected 32 bytes, got {0}")]
    WrongSecretLength(usize),
    #[error("invalid private key: scalar out of range")]
    InvalidScalar,
    #[error("invalid private key: hex decode failed")]
    Hex,
}

/// Parses a SEC1 public key in compressed or uncompressed form.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    if bytes.len() != COMPRESSED_KEY_LENGTH && bytes.len() != UNCOMPRESSED_KEY_LENGTH {
        return Err(KeyError::WrongKeyLength(bytes.len()));
    }

    PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidPoint)
}

#[must_use]
pub fn compress_public_key(public_key: &PublicKey) -> [u8; COMPRESSED_KEY_LENGTH] {
    let encoded = public_key.to_encoded_point(true);
    let bytes = encoded.as_bytes();
    let mut out = [0_u8; COMPRESSED_KEY_LENGTH];
    out.copy_from_slice(bytes);
    out
}

#[must_use]
pub fn owner_id_from_public_key(public_key: &PublicKey) -> OwnerId {
    OwnerId::from_compressed_key(&compress_public_key(public_key))
}

/// Compares two encoded public keys by curve point, so a compressed and an
/// uncompressed encoding of the same key are equal.
#[must_use]
pub fn same_public_key(left: &[u8], right: &[u8]) -> bool {
    if left == right {
        return true;
    }
    match (decode_public_key(left), decode_public_key(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// SignerKey holds a P-256 private key. Its `Debug` output never includes the
/// scalar.
#[derive(Clone)]
pub struct SignerKey {
    secret: SecretKey,
}

impl SignerKey {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::WrongSecretLength(bytes.len()));
        }

        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidScalar)?;
        Ok(Self { secret })
    }

    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| KeyError::Hex)?;
        Self::from_bytes(&bytes)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; COMPRESSED_KEY_LENGTH] {
        compress_public_key(&self.public_key())
    }

    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        owner_id_from_public_key(&self.public_key())
    }

    pub(crate) fn signing_key(&self) -> SigningKey {
        SigningKey::from(&self.secret)
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKey")
            .field("owner", &self.owner_id().to_string())
            .finish_non_exhaustive()
    }
}
