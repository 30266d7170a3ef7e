#![forbid(unsafe_code)]

use std::fmt;

use gaspump_core::ContainerId;
use serde::{Deserialize, Serialize};

use crate::keys::{decode_public_key, same_public_key, KeyError};
use crate::stable::{StableMarshal, StableWriter};

/// EACL format version written into every table.
pub const EACL_VERSION_MAJOR: u64 = 2;
pub const EACL_VERSION_MINOR: u64 = 11;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EaclError {
    #[error("unknown EACL operation value {0}")]
    UnknownOperation(u8),
    #[error("unknown EACL operation {0:?}")]
    UnknownOperationName(String),
    #[error("target key set is empty")]
    EmptyKeySet,
    #[error("invalid target key: {0}")]
    InvalidKey(#[from] KeyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Operation {
    Get = 1,
    Head = 2,
    Put = 3,
    Delete = 4,
    Search = 5,
    GetRange = 6,
    GetRangeHash = 7,
}

impl Operation {
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Head,
        Self::Put,
        Self::Delete,
        Self::Search,
        Self::GetRange,
        Self::GetRangeHash,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Search => "SEARCH",
            Self::GetRange => "GETRANGE",
            Self::GetRangeHash => "GETRANGEHASH",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Operation {
    type Error = EaclError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|operation| *operation as u8 == value)
            .ok_or(EaclError::UnknownOperation(value))
    }
}

impl std::str::FromStr for Operation {
    type Err = EaclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EaclError::UnknownOperationName(s.to_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Action {
    Allow = 1,
    Deny = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Role {
    /// The container owner.
    User = 1,
    /// Storage and inner-ring nodes.
    System = 2,
    Others = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum HeaderType {
    Request = 1,
    Object = 2,
    Service = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MatchType {
    StringEqual = 1,
    StringNotEqual = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub header_type: HeaderType,
    pub match_type: MatchType,
    pub key: String,
    pub value: String,
}

impl Filter {
    #[must_use]
    pub fn new(
        header_type: HeaderType,
        match_type: MatchType,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            header_type,
            match_type,
            key: key.into(),
            value: value.into(),
        }
    }

    /// An absent header fails `StringEqual` and passes `StringNotEqual`.
    fn matches(&self, request: &EaclRequest) -> bool {
        let found = request
            .headers
            .iter()
            .find(|header| header.header_type == self.header_type && header.key == self.key)
            .map(|header| header.value.as_str());

        match self.match_type {
            MatchType::StringEqual => found == Some(self.value.as_str()),
            MatchType::StringNotEqual => found != Some(self.value.as_str()),
        }
    }
}

impl StableMarshal for Filter {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .enumeration(1, self.header_type as u8)
            .enumeration(2, self.match_type as u8)
            .string(3, &self.key)
            .string(4, &self.value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Role(Role),
    Keys(#[serde(with = "crate::encoding::base64_list")] Vec<Vec<u8>>),
}

impl Target {
    /// Key target; every key must be a valid SEC1 P-256 point.
    pub fn keys<I, K>(keys: I) -> Result<Self, EaclError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let keys = keys
            .into_iter()
            .map(|key| -> Result<Vec<u8>, EaclError> {
                decode_public_key(key.as_ref())?;
                Ok(key.as_ref().to_vec())
            })
            .collect::<Result<Vec<_>, EaclError>>()?;
        if keys.is_empty() {
            return Err(EaclError::EmptyKeySet);
        }
        Ok(Self::Keys(keys))
    }

    fn matches(&self, request: &EaclRequest) -> bool {
        match self {
            Self::Role(role) => *role == request.role,
            Self::Keys(keys) => keys
                .iter()
                .any(|key| same_public_key(key, &request.sender_key)),
        }
    }
}

impl StableMarshal for Target {
    fn write_fields(&self, writer: &mut StableWriter) {
        match self {
            Self::Role(role) => {
                writer.enumeration(1, *role as u8);
            }
            Self::Keys(keys) => {
                writer.repeated_bytes(2, keys.iter().map(Vec::as_slice));
            }
        }
    }
}

/// One allow/deny rule. Records are assembled with the `with_*` builders and
/// are read-only once placed in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    action: Action,
    operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    filters: Vec<Filter>,
    targets: Vec<Target>,
}

impl Record {
    #[must_use]
    pub fn new(action: Action, operation: Operation) -> Self {
        Self {
            action,
            operation,
            filters: Vec::new(),
            targets: Vec::new(),
        }
    }

    #[must_use]
    pub fn allow(operation: Operation, target: Target) -> Self {
        Self::new(Action::Allow, operation).with_target(target)
    }

    #[must_use]
    pub fn deny(operation: Operation, target: Target) -> Self {
        Self::new(Action::Deny, operation).with_target(target)
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    fn applies_to(&self, request: &EaclRequest) -> bool {
        self.operation == request.operation
            && self.targets.iter().any(|target| target.matches(request))
            && self.filters.iter().all(|filter| filter.matches(request))
    }
}

impl StableMarshal for Record {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .enumeration(1, self.operation as u8)
            .enumeration(2, self.action as u8)
            .repeated_messages(3, &self.filters)
            .repeated_messages(4, &self.targets);
    }
}

/// A header visible to filters during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub header_type: HeaderType,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EaclRequest {
    pub operation: Operation,
    pub role: Role,
    pub sender_key: Vec<u8>,
    pub headers: Vec<RequestHeader>,
}

impl EaclRequest {
    #[must_use]
    pub fn new(operation: Operation, role: Role, sender_key: impl Into<Vec<u8>>) -> Self {
        Self {
            operation,
            role,
            sender_key: sender_key.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(
        mut self,
        header_type: HeaderType,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push(RequestHeader {
            header_type,
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// No record applied; the container's basic ACL decides.
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EaclTable {
    container_id: ContainerId,
    records: Vec<Record>,
}

impl EaclTable {
    #[must_use]
    pub fn new(container_id: ContainerId) -> Self {
        Self {
            container_id,
            records: Vec::new(),
        }
    }

    /// Appends a record after all existing ones.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn with_record(mut self, record: Record) -> Self {
        self.push(record);
        self
    }

    #[must_use]
    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// First-match-wins evaluation over the records in order.
    #[must_use]
    pub fn evaluate(&self, request: &EaclRequest) -> Decision {
        self.records
            .iter()
            .find(|record| record.applies_to(request))
            .map_or(Decision::NoMatch, |record| match record.action {
                Action::Allow => Decision::Allow,
                Action::Deny => Decision::Deny,
            })
    }
}

struct Version;

impl StableMarshal for Version {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .uint64(1, EACL_VERSION_MAJOR)
            .uint64(2, EACL_VERSION_MINOR);
    }
}

impl StableMarshal for EaclTable {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .message(1, &Version)
            .message(2, &self.container_id)
            .repeated_messages(3, &self.records);
    }
}

/// Owner-exclusive write table: `allowed_key` (if any) may put, everyone
/// else is denied. The allow record precedes the deny record.
#[must_use]
pub fn put_allow_deny_others(container_id: ContainerId, allowed_key: Option<&[u8]>) -> EaclTable {
    let mut table = EaclTable::new(container_id);
    if let Some(key) = allowed_key {
        table.push(Record::allow(Operation::Put, Target::Keys(vec![key.to_vec()])));
    }
    table.push(Record::deny(Operation::Put, Target::Role(Role::Others)));
    table
}

/// Read/write grant for one principal, with no deny rules.
#[must_use]
pub fn allow_get_put(container_id: ContainerId, target: Target) -> EaclTable {
    EaclTable::new(container_id)
        .with_record(Record::allow(Operation::Get, target.clone()))
        .with_record(Record::allow(Operation::Put, target))
}

/// Positional comparison of canonical record encodings.
#[must_use]
pub fn equal_records(left: &[Record], right: &[Record]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(left, right)| left.stable_bytes() == right.stable_bytes())
}

/// Tables are equal when they belong to the same container and their
/// records are equal position by position.
#[must_use]
pub fn equal_tables(left: &EaclTable, right: &EaclTable) -> bool {
    left.container_id == right.container_id && equal_records(&left.records, &right.records)
}
