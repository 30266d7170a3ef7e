#![forbid(unsafe_code)]

//! JSON transport encoding for tokens: a versioned envelope and serde
//! helpers rendering byte fields as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed token encoding: {0}")]
    Malformed(String),
    #[error("unsupported token envelope version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    #[serde(flatten)]
    token: T,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

pub(crate) fn marshal_envelope<T: Serialize>(token: &T) -> Result<Vec<u8>, EnvelopeError> {
    serde_json::to_vec(&Envelope {
        version: ENVELOPE_VERSION,
        token,
    })
    .map_err(|error| EnvelopeError::Malformed(error.to_string()))
}

pub(crate) fn unmarshal_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EnvelopeError> {
    let probe: VersionProbe = serde_json::from_slice(bytes)
        .map_err(|error| EnvelopeError::Malformed(error.to_string()))?;
    if probe.version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(probe.version));
    }

    let envelope: Envelope<T> = serde_json::from_slice(bytes)
        .map_err(|error| EnvelopeError::Malformed(error.to_string()))?;
    Ok(envelope.token)
}

pub(crate) mod base64_bytes {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) mod base64_list {
    use serde::ser::SerializeSeq;

    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        values: &[Vec<u8>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&STANDARD.encode(value))?;
        }
        seq.end()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|value| STANDARD.decode(value.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom)
    }
}
