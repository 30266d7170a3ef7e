#![forbid(unsafe_code)]

use std::fmt;

use gaspump_core::OwnerId;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::keys::{decode_public_key, owner_id_from_public_key, KeyError, SignerKey};

/// Encoded signatures carry this prefix in front of `r || s`.
pub const SIGNATURE_PREFIX: u8 = 0x04;
pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureScheme {
    /// ECDSA P-256 over a SHA-512 digest of the payload.
    EcdsaSha512,
    /// Deterministic ECDSA over SHA-256, used by wallet-connect signers.
    /// Recognized when decoding but not accepted for tokens.
    EcdsaRfc6979Sha256,
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EcdsaSha512 => "ECDSA_SHA512",
            Self::EcdsaRfc6979Sha256 => "ECDSA_RFC6979_SHA256",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSignature {
    pub scheme: SignatureScheme,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub signature: Vec<u8>,
}

impl TokenSignature {
    /// Wraps externally produced material under the default scheme.
    #[must_use]
    pub fn new(public_key: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            scheme: SignatureScheme::EcdsaSha512,
            public_key,
            signature,
        }
    }

    /// Owner ID of the signing key, if the key decodes.
    pub fn signer(&self) -> Result<OwnerId, Rejection> {
        let public_key =
            decode_public_key(&self.public_key).map_err(Rejection::MalformedPublicKey)?;
        Ok(owner_id_from_public_key(&public_key))
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("ECDSA signing failed")]
    SigningFailed,
}

/// Why a token failed verification. Every variant is terminal for the token.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("token carries no signature")]
    Unsigned,
    #[error("unsupported signature scheme {0}")]
    UnsupportedScheme(SignatureScheme),
    #[error("malformed public key: {0}")]
    MalformedPublicKey(KeyError),
    #[error("malformed signature bytes")]
    MalformedSignature,
    #[error("signature does not match token body and key")]
    BodyOrKeyMismatch,
    #[error("token signed by {actual}, expected {expected}")]
    WrongSigner { expected: OwnerId, actual: OwnerId },
    #[error("declared owner {declared} does not derive from signing key ({derived})")]
    OwnerMismatch { declared: OwnerId, derived: OwnerId },
}

/// Signs arbitrary bytes with `key`: ECDSA P-256 over `SHA-512(payload)`.
/// This is the owner-side half of the two-party handshake; the caller never
/// learns anything about the key beyond its public half.
pub fn sign_bytes_on_behalf(
    payload: &[u8],
    key: &SignerKey,
) -> Result<TokenSignature, SignatureError> {
    let digest = Sha512::digest(payload);
    let signature: Signature = key
        .signing_key()
        .sign_prehash(&digest)
        .map_err(|_| SignatureError::SigningFailed)?;

    let mut encoded = Vec::with_capacity(SIGNATURE_LENGTH);
    encoded.push(SIGNATURE_PREFIX);
    encoded.extend_from_slice(&signature.to_bytes());

    Ok(TokenSignature::new(key.public_key_bytes().to_vec(), encoded))
}

/// Checks `signature` against `payload`.
pub fn verify_payload(payload: &[u8], signature: &TokenSignature) -> Result<(), Rejection> {
    if signature.scheme != SignatureScheme::EcdsaSha512 {
        return Err(Rejection::UnsupportedScheme(signature.scheme));
    }

    let public_key =
        decode_public_key(&signature.public_key).map_err(Rejection::MalformedPublicKey)?;

    let raw = &signature.signature;
    if raw.len() != SIGNATURE_LENGTH || raw[0] != SIGNATURE_PREFIX {
        return Err(Rejection::MalformedSignature);
    }
    let parsed = Signature::from_slice(&raw[1..]).map_err(|_| Rejection::MalformedSignature)?;

    let digest = Sha512::digest(payload);
    VerifyingKey::from(&public_key)
        .verify_prehash(&digest, &parsed)
        .map_err(|_| Rejection::BodyOrKeyMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_prefix_and_length() {
        let key = SignerKey::generate();
        let signed = sign_bytes_on_behalf(b"payload", &key).expect("sign");

        assert_eq!(signed.scheme, SignatureScheme::EcdsaSha512);
        assert_eq!(signed.signature.len(), SIGNATURE_LENGTH);
        assert_eq!(signed.signature[0], SIGNATURE_PREFIX);
        assert_eq!(signed.public_key, key.public_key_bytes().to_vec());
        assert_eq!(signed.signer().expect("signer"), key.owner_id());
    }

    #[test]
    fn verify_accepts_own_signature() {
        let key = SignerKey::generate();
        let signed = sign_bytes_on_behalf(b"payload", &key).expect("sign");
        verify_payload(b"payload", &signed).expect("verify");
    }

    #[test]
    fn verify_rejects_other_payload_and_key() {
        let key = SignerKey::generate();
        let signed = sign_bytes_on_behalf(b"payload", &key).expect("sign");
        assert_eq!(
            verify_payload(b"payloae", &signed),
            Err(Rejection::BodyOrKeyMismatch)
        );

        let other = SignerKey::generate();
        let swapped = TokenSignature {
            public_key: other.public_key_bytes().to_vec(),
            ..signed
        };
        assert_eq!(
            verify_payload(b"payload", &swapped),
            Err(Rejection::BodyOrKeyMismatch)
        );
    }

    #[test]
    fn verify_names_malformed_inputs() {
        let key = SignerKey::generate();
        let signed = sign_bytes_on_behalf(b"payload", &key).expect("sign");

        let mut short = signed.clone();
        short.signature.truncate(64);
        assert_eq!(
            verify_payload(b"payload", &short),
            Err(Rejection::MalformedSignature)
        );

        let mut no_prefix = signed.clone();
        no_prefix.signature[0] = 0x00;
        assert_eq!(
            verify_payload(b"payload", &no_prefix),
            Err(Rejection::MalformedSignature)
        );

        let mut bad_key = signed.clone();
        bad_key.public_key.truncate(10);
        assert_eq!(
            verify_payload(b"payload", &bad_key),
            Err(Rejection::MalformedPublicKey(KeyError::WrongKeyLength(10)))
        );

        let other_scheme = TokenSignature {
            scheme: SignatureScheme::EcdsaRfc6979Sha256,
            ..signed
        };
        assert_eq!(
            verify_payload(b"payload", &other_scheme),
            Err(Rejection::UnsupportedScheme(
                SignatureScheme::EcdsaRfc6979Sha256
            ))
        );
    }

    #[test]
    fn scheme_serializes_in_network_form() {
        let json = serde_json::to_string(&SignatureScheme::EcdsaSha512).expect("serialize");
        assert_eq!(json, "\"ECDSA_SHA512\"");
    }
}
