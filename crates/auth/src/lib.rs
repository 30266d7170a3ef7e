#![forbid(unsafe_code)]

pub mod bearer;
pub mod eacl;
pub mod encoding;
pub mod handshake;
pub mod keys;
pub mod lifetime;
pub mod session;
pub mod signature;
pub mod stable;

pub use bearer::{BearerError, BearerToken, UnsignedBearer};
pub use eacl::{
    allow_get_put, equal_records, equal_tables, put_allow_deny_others, Action, Decision,
    EaclError, EaclRequest, EaclTable, Filter, HeaderType, MatchType, Operation, Record, Role,
    Target,
};
pub use encoding::{EnvelopeError, ENVELOPE_VERSION};
pub use handshake::{HandshakeError, OwnerSignature, PendingBearer};
pub use keys::{
    compress_public_key, decode_public_key, owner_id_from_public_key, KeyError, SignerKey,
};
pub use lifetime::{Lifetime, Validity};
pub use session::{
    ContainerVerb, ObjectVerb, SessionBuilder, SessionContext, SessionError, SessionHandle,
    SessionToken, UnsignedSession,
};
pub use signature::{
    sign_bytes_on_behalf, verify_payload, Rejection, SignatureError, SignatureScheme,
    TokenSignature,
};
pub use stable::{StableMarshal, StableWriter};
