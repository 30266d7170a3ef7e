#![forbid(unsafe_code)]

//! Gateway side of the two-party bearer signing exchange.
//!
//! The gateway builds the token body and sends only its canonical bytes to
//! the container owner. The owner signs them with
//! [`sign_bytes_on_behalf`](crate::signature::sign_bytes_on_behalf) and
//! returns an [`OwnerSignature`], which the gateway binds back to the body it
//! kept. The owner's private key never leaves the owner.

use gaspump_core::OwnerId;
use serde::{Deserialize, Serialize};

use crate::bearer::{BearerToken, UnsignedBearer};
use crate::signature::{Rejection, TokenSignature};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("owner signature rejected: {0}")]
    Rejected(#[from] Rejection),
}

/// What the owner sends back: its public key and the signature over the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSignature {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub signature: Vec<u8>,
}

impl From<TokenSignature> for OwnerSignature {
    fn from(signature: TokenSignature) -> Self {
        Self {
            public_key: signature.public_key,
            signature: signature.signature,
        }
    }
}

/// An unsigned bearer body together with the exact bytes handed to the
/// owner. The body cannot change while the payload is outstanding.
#[derive(Debug, Clone)]
pub struct PendingBearer {
    unsigned: UnsignedBearer,
    payload: Vec<u8>,
}

impl PendingBearer {
    #[must_use]
    pub fn new(unsigned: UnsignedBearer) -> Self {
        let payload = unsigned.canonical_bytes();
        Self { unsigned, payload }
    }

    /// Bytes to transmit to the owner for signing.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn unsigned(&self) -> &UnsignedBearer {
        &self.unsigned
    }

    /// Gives the body back and drops the outstanding payload; any signature
    /// already made over it will no longer complete a token built from a
    /// changed body.
    #[must_use]
    pub fn into_unsigned(self) -> UnsignedBearer {
        self.unsigned
    }

    /// Attaches the owner's signature and verifies the result. A rejected
    /// signature consumes the pending token.
    pub fn complete(self, owner: OwnerSignature) -> Result<BearerToken, HandshakeError> {
        let token = self.attach(owner);
        token.verify()?;
        tracing::info!(owner = %token.owner(), exp = token.lifetime().exp, "bearer handshake completed");
        Ok(token)
    }

    /// Like [`complete`](Self::complete), also requiring the signature to
    /// come from `expected_issuer`.
    pub fn complete_from(
        self,
        owner: OwnerSignature,
        expected_issuer: &OwnerId,
    ) -> Result<BearerToken, HandshakeError> {
        let token = self.attach(owner);
        token.verify_issuer(expected_issuer)?;
        tracing::info!(owner = %token.owner(), issuer = %expected_issuer, exp = token.lifetime().exp, "bearer handshake completed");
        Ok(token)
    }

    fn attach(self, owner: OwnerSignature) -> BearerToken {
        self.unsigned
            .attach_signature(TokenSignature::new(owner.public_key, owner.signature))
    }
}
