#![forbid(unsafe_code)]

use gaspump_core::OwnerId;
use serde::{Deserialize, Serialize};

use crate::eacl::EaclTable;
use crate::encoding::{marshal_envelope, unmarshal_envelope, EnvelopeError};
use crate::keys::SignerKey;
use crate::lifetime::{Lifetime, Validity};
use crate::signature::{
    sign_bytes_on_behalf, verify_payload, Rejection, SignatureError, TokenSignature,
};
use crate::stable::{StableMarshal, StableWriter};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BearerError {
    #[error("bearer token needs at least one EACL record")]
    EmptyTable,
    #[error("bearer token already expired: exp {exp} <= current epoch {current_epoch}")]
    AlreadyExpired { exp: u64, current_epoch: u64 },
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// The signed part of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BearerBody {
    owner_id: OwnerId,
    eacl_table: EaclTable,
    lifetime: Lifetime,
}

impl StableMarshal for BearerBody {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .message(1, &self.eacl_table)
            .message(2, &self.owner_id)
            .message(3, &self.lifetime);
    }
}

/// A bearer token body awaiting a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedBearer {
    body: BearerBody,
}

impl UnsignedBearer {
    /// `owner` is the principal allowed to present the token.
    pub fn new(
        owner: OwnerId,
        table: EaclTable,
        lifetime: Lifetime,
        current_epoch: u64,
    ) -> Result<Self, BearerError> {
        if table.is_empty() {
            return Err(BearerError::EmptyTable);
        }
        if lifetime.is_expired(current_epoch) {
            return Err(BearerError::AlreadyExpired {
                exp: lifetime.exp,
                current_epoch,
            });
        }

        Ok(Self {
            body: BearerBody {
                owner_id: owner,
                eacl_table: table,
                lifetime,
            },
        })
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.body.owner_id
    }

    #[must_use]
    pub fn table(&self) -> &EaclTable {
        &self.body.eacl_table
    }

    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.body.lifetime
    }

    /// The signing pre-image.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.body.stable_bytes()
    }

    pub fn sign(self, key: &SignerKey) -> Result<BearerToken, BearerError> {
        let signature = sign_bytes_on_behalf(&self.canonical_bytes(), key)?;
        tracing::debug!(
            owner = %self.body.owner_id,
            container = %self.body.eacl_table.container_id(),
            exp = self.body.lifetime.exp,
            "signed bearer token"
        );
        Ok(self.attach_signature(signature))
    }

    /// Binds signature material produced elsewhere. Nothing is checked here;
    /// call [`BearerToken::verify`] before use.
    #[must_use]
    pub fn attach_signature(self, signature: TokenSignature) -> BearerToken {
        BearerToken {
            body: self.body,
            signature: Some(signature),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    #[serde(flatten)]
    body: BearerBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<TokenSignature>,
}

impl BearerToken {
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.body.owner_id
    }

    #[must_use]
    pub fn table(&self) -> &EaclTable {
        &self.body.eacl_table
    }

    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.body.lifetime
    }

    #[must_use]
    pub fn signature(&self) -> Option<&TokenSignature> {
        self.signature.as_ref()
    }

    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.body.stable_bytes()
    }

    /// Recomputes the canonical body bytes and checks the signature.
    pub fn verify(&self) -> Result<(), Rejection> {
        let result = match &self.signature {
            Some(signature) => verify_payload(&self.canonical_bytes(), signature),
            None => Err(Rejection::Unsigned),
        };
        if let Err(reason) = &result {
            tracing::warn!(owner = %self.body.owner_id, %reason, "bearer token rejected");
        }
        result
    }

    /// Like [`verify`](Self::verify), but first requires the signing key to
    /// belong to `expected_issuer`, so a mismatch after that point can only
    /// mean an altered body.
    pub fn verify_issuer(&self, expected_issuer: &OwnerId) -> Result<(), Rejection> {
        let signature = self.signature.as_ref().ok_or(Rejection::Unsigned)?;
        let actual = signature.signer()?;
        if actual != *expected_issuer {
            tracing::warn!(owner = %self.body.owner_id, expected = %expected_issuer, %actual, "bearer token from wrong signer");
            return Err(Rejection::WrongSigner {
                expected: *expected_issuer,
                actual,
            });
        }
        self.verify()
    }

    #[must_use]
    pub fn validity_at(&self, epoch: u64) -> Validity {
        self.body.lifetime.validity_at(epoch)
    }

    #[must_use]
    pub fn is_expired(&self, current_epoch: u64) -> bool {
        self.body.lifetime.is_expired(current_epoch)
    }

    pub fn marshal(&self) -> Result<Vec<u8>, BearerError> {
        Ok(marshal_envelope(self)?)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, BearerError> {
        Ok(unmarshal_envelope(bytes)?)
    }
}
