#![forbid(unsafe_code)]

use gaspump_core::{Address, ContainerId, OwnerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoding::{marshal_envelope, unmarshal_envelope, EnvelopeError};
use crate::keys::SignerKey;
use crate::lifetime::{Lifetime, Validity};
use crate::signature::{
    sign_bytes_on_behalf, verify_payload, Rejection, SignatureError, TokenSignature,
};
use crate::stable::{StableMarshal, StableWriter};

/// Network-issued session identity. Each handle backs exactly one token, so
/// it is consumed by value and cannot be cloned.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: Uuid,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub session_key: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ObjectVerb {
    Put = 1,
    Get = 2,
    Delete = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ContainerVerb {
    Delete = 2,
}

/// The single verb and target a session token is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionContext {
    Object { verb: ObjectVerb, address: Address },
    Container { verb: ContainerVerb, container: ContainerId },
}

impl SessionContext {
    /// A container-wide object context covers every object in the
    /// container; everything else must match exactly.
    #[must_use]
    pub fn covers(&self, requested: &SessionContext) -> bool {
        match (self, requested) {
            (
                Self::Object { verb, address },
                Self::Object {
                    verb: requested_verb,
                    address: requested_address,
                },
            ) => verb == requested_verb && address.covers(requested_address),
            (
                Self::Container { verb, container },
                Self::Container {
                    verb: requested_verb,
                    container: requested_container,
                },
            ) => verb == requested_verb && container == requested_container,
            _ => false,
        }
    }
}

struct ObjectContext<'a> {
    verb: ObjectVerb,
    address: &'a Address,
}

impl StableMarshal for ObjectContext<'_> {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .enumeration(1, self.verb as u8)
            .message(2, self.address);
    }
}

struct ContainerContext<'a> {
    verb: ContainerVerb,
    container: &'a ContainerId,
}

impl StableMarshal for ContainerContext<'_> {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .enumeration(1, self.verb as u8)
            .boolean(2, false)
            .message(3, self.container);
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("declared owner {declared} does not match signer {signer}")]
    OwnerMismatch { declared: OwnerId, signer: OwnerId },
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SessionBody {
    id: Uuid,
    owner_id: OwnerId,
    lifetime: Lifetime,
    #[serde(with = "crate::encoding::base64_bytes")]
    session_key: Vec<u8>,
    context: SessionContext,
}

impl StableMarshal for SessionBody {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .bytes(1, self.id.as_bytes())
            .message(2, &self.owner_id)
            .message(3, &self.lifetime)
            .bytes(4, &self.session_key);
        match &self.context {
            SessionContext::Object { verb, address } => {
                writer.message(
                    5,
                    &ObjectContext {
                        verb: *verb,
                        address,
                    },
                );
            }
            SessionContext::Container { verb, container } => {
                writer.message(
                    6,
                    &ContainerContext {
                        verb: *verb,
                        container,
                    },
                );
            }
        }
    }
}

pub struct SessionBuilder {
    handle: SessionHandle,
    lifetime: Lifetime,
    owner: Option<OwnerId>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(handle: SessionHandle, expiry_epoch: u64) -> Self {
        Self {
            handle,
            lifetime: Lifetime::new(expiry_epoch, 0, 0),
            owner: None,
        }
    }

    /// Sets `nbf` and `iat` to `epoch`.
    #[must_use]
    pub fn valid_from(mut self, epoch: u64) -> Self {
        self.lifetime.nbf = epoch;
        self.lifetime.iat = epoch;
        self
    }

    /// Declares the owner up front. Signing fails if the signer's key does
    /// not derive to it.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn object_get(self, address: Address) -> UnsignedSession {
        self.object(ObjectVerb::Get, address)
    }

    #[must_use]
    pub fn object_put(self, address: Address) -> UnsignedSession {
        self.object(ObjectVerb::Put, address)
    }

    #[must_use]
    pub fn object_delete(self, address: Address) -> UnsignedSession {
        self.object(ObjectVerb::Delete, address)
    }

    #[must_use]
    pub fn container_delete(self, container: ContainerId) -> UnsignedSession {
        self.finish(SessionContext::Container {
            verb: ContainerVerb::Delete,
            container,
        })
    }

    fn object(self, verb: ObjectVerb, address: Address) -> UnsignedSession {
        self.finish(SessionContext::Object { verb, address })
    }

    fn finish(self, context: SessionContext) -> UnsignedSession {
        UnsignedSession {
            id: self.handle.id,
            session_key: self.handle.session_key,
            owner: self.owner,
            lifetime: self.lifetime,
            context,
        }
    }
}

#[derive(Debug)]
pub struct UnsignedSession {
    id: Uuid,
    session_key: Vec<u8>,
    owner: Option<OwnerId>,
    lifetime: Lifetime,
    context: SessionContext,
}

impl UnsignedSession {
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Signs the body with the caller's key. A missing owner is derived from
    /// that key before the body is encoded.
    pub fn sign(self, key: &SignerKey) -> Result<SessionToken, SessionError> {
        let signer = key.owner_id();
        let owner_id = match self.owner {
            Some(declared) if declared != signer => {
                return Err(SessionError::OwnerMismatch { declared, signer });
            }
            Some(declared) => declared,
            None => signer,
        };

        let body = SessionBody {
            id: self.id,
            owner_id,
            lifetime: self.lifetime,
            session_key: self.session_key,
            context: self.context,
        };
        let signature = sign_bytes_on_behalf(&body.stable_bytes(), key)?;
        tracing::debug!(session = %body.id, owner = %owner_id, exp = body.lifetime.exp, "signed session token");

        Ok(SessionToken {
            body,
            signature: Some(signature),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    #[serde(flatten)]
    body: SessionBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<TokenSignature>,
}

impl SessionToken {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.body.id
    }

    #[must_use]
    pub fn session_key(&self) -> &[u8] {
        &self.body.session_key
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.body.owner_id
    }

    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        self.body.lifetime
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.body.context
    }

    #[must_use]
    pub fn signature(&self) -> Option<&TokenSignature> {
        self.signature.as_ref()
    }

    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.body.stable_bytes()
    }

    /// Checks the signature and that the declared owner derives from the
    /// signing key.
    pub fn verify(&self) -> Result<(), Rejection> {
        let result = self.check_signature();
        if let Err(reason) = &result {
            tracing::warn!(session = %self.body.id, owner = %self.body.owner_id, %reason, "session token rejected");
        }
        result
    }

    fn check_signature(&self) -> Result<(), Rejection> {
        let signature = self.signature.as_ref().ok_or(Rejection::Unsigned)?;
        let derived = signature.signer()?;
        if derived != self.body.owner_id {
            return Err(Rejection::OwnerMismatch {
                declared: self.body.owner_id,
                derived,
            });
        }
        verify_payload(&self.canonical_bytes(), signature)
    }

    /// Whether this token permits `requested`: same verb, and a target the
    /// token's context covers.
    #[must_use]
    pub fn authorizes(&self, requested: &SessionContext) -> bool {
        self.body.context.covers(requested)
    }

    #[must_use]
    pub fn validity_at(&self, epoch: u64) -> Validity {
        self.body.lifetime.validity_at(epoch)
    }

    #[must_use]
    pub fn is_expired(&self, current_epoch: u64) -> bool {
        self.body.lifetime.is_expired(current_epoch)
    }

    pub fn marshal(&self) -> Result<Vec<u8>, SessionError> {
        Ok(marshal_envelope(self)?)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, SessionError> {
        Ok(unmarshal_envelope(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use gaspump_core::ObjectId;

    use super::*;

    fn handle() -> SessionHandle {
        SessionHandle {
            id: Uuid::new_v4(),
            session_key: SignerKey::generate().public_key_bytes().to_vec(),
        }
    }

    fn container() -> ContainerId {
        ContainerId::from_definition(b"session tests")
    }

    #[test]
    fn sign_derives_missing_owner() {
        let key = SignerKey::generate();
        let token = SessionBuilder::new(handle(), 50)
            .object_put(Address::container(container()))
            .sign(&key)
            .expect("sign");

        assert_eq!(token.owner(), key.owner_id());
        assert_eq!(token.lifetime(), Lifetime::new(50, 0, 0));
        token.verify().expect("verify");
    }

    #[test]
    fn declared_owner_must_match_signer() {
        let key = SignerKey::generate();
        let other = SignerKey::generate();

        let token = SessionBuilder::new(handle(), 50)
            .with_owner(key.owner_id())
            .object_get(Address::container(container()))
            .sign(&key)
            .expect("matching owner");
        token.verify().expect("verify");

        let error = SessionBuilder::new(handle(), 50)
            .with_owner(other.owner_id())
            .object_get(Address::container(container()))
            .sign(&key)
            .expect_err("mismatched owner");
        assert_eq!(
            error,
            SessionError::OwnerMismatch {
                declared: other.owner_id(),
                signer: key.owner_id()
            }
        );
    }

    #[test]
    fn verify_detects_owner_not_derived_from_key() {
        let key = SignerKey::generate();
        let token = SessionBuilder::new(handle(), 50)
            .container_delete(container())
            .sign(&key)
            .expect("sign");

        let mut value: serde_json::Value =
            serde_json::from_slice(&token.marshal().expect("marshal")).expect("json");
        let stranger = SignerKey::generate().owner_id();
        value["owner_id"] = serde_json::json!(stranger);
        let forged = SessionToken::unmarshal(value.to_string().as_bytes()).expect("unmarshal");

        assert_eq!(
            forged.verify(),
            Err(Rejection::OwnerMismatch {
                declared: stranger,
                derived: key.owner_id()
            })
        );
    }

    #[test]
    fn one_verb_one_target() {
        let key = SignerKey::generate();
        let object = ObjectId::from_bytes([9; 32]);
        let address = Address::object(container(), object);
        let token = SessionBuilder::new(handle(), 50)
            .object_delete(address)
            .sign(&key)
            .expect("sign");

        assert!(token.authorizes(&SessionContext::Object {
            verb: ObjectVerb::Delete,
            address,
        }));
        assert!(!token.authorizes(&SessionContext::Object {
            verb: ObjectVerb::Get,
            address,
        }));
        assert!(!token.authorizes(&SessionContext::Object {
            verb: ObjectVerb::Delete,
            address: Address::object(container(), ObjectId::from_bytes([1; 32])),
        }));
        assert!(!token.authorizes(&SessionContext::Container {
            verb: ContainerVerb::Delete,
            container: container(),
        }));
    }

    #[test]
    fn container_wide_put_covers_new_objects() {
        let key = SignerKey::generate();
        let token = SessionBuilder::new(handle(), 50)
            .object_put(Address::container(container()))
            .sign(&key)
            .expect("sign");

        assert!(token.authorizes(&SessionContext::Object {
            verb: ObjectVerb::Put,
            address: Address::object(container(), ObjectId::from_bytes([3; 32])),
        }));
    }

    #[test]
    fn contexts_encode_in_distinct_fields() {
        let key = SignerKey::generate();
        let object_token = SessionBuilder::new(handle(), 50)
            .object_get(Address::container(container()))
            .sign(&key)
            .expect("sign object");
        let container_token = SessionBuilder::new(handle(), 50)
            .container_delete(container())
            .sign(&key)
            .expect("sign container");

        let object_bytes = object_token.canonical_bytes();
        let container_bytes = container_token.canonical_bytes();
        // id (18) + owner (29) + lifetime (4) + session key (35) precede the context.
        assert_eq!(object_bytes[86], 0x2a);
        assert_eq!(container_bytes[86], 0x32);
    }

    #[test]
    fn marshal_roundtrip() {
        let key = SignerKey::generate();
        let token = SessionBuilder::new(handle(), 77)
            .valid_from(70)
            .object_get(Address::object(container(), ObjectId::from_bytes([4; 32])))
            .sign(&key)
            .expect("sign");

        let back = SessionToken::unmarshal(&token.marshal().expect("marshal")).expect("unmarshal");
        assert_eq!(back, token);
        back.verify().expect("verify after roundtrip");
        assert_eq!(back.validity_at(69), Validity::NotYetValid);
        assert_eq!(back.validity_at(70), Validity::Valid);
        assert!(back.is_expired(77));
    }

    #[test]
    fn altered_context_is_rejected() {
        let key = SignerKey::generate();
        let token = SessionBuilder::new(handle(), 50)
            .object_get(Address::container(container()))
            .sign(&key)
            .expect("sign");

        let mut value: serde_json::Value =
            serde_json::from_slice(&token.marshal().expect("marshal")).expect("json");
        value["context"]["verb"] = serde_json::json!("DELETE");
        let forged = SessionToken::unmarshal(value.to_string().as_bytes()).expect("unmarshal");

        assert_eq!(forged.verify(), Err(Rejection::BodyOrKeyMismatch));
    }
}
