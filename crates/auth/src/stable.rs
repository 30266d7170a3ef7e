#![forbid(unsafe_code)]

//! Deterministic protobuf-compatible encoding used as the signing pre-image.
//!
//! Fields are emitted in ascending field-number order as
//! `(field << 3) | wire_type` varint tags. Integers and enums are varints,
//! bytes, strings and nested messages are length-delimited. Zero values
//! (0, `false`, empty bytes, empty messages) are omitted, so two equal
//! values always encode to identical bytes. Repeated fields keep their
//! sequence order.

use gaspump_core::{Address, ContainerId, ObjectId, OwnerId};

const WIRE_VARINT: u64 = 0;
const WIRE_LEN: u64 = 2;

/// A value with a canonical encoding.
pub trait StableMarshal {
    /// Writes the value's fields in ascending field-number order.
    fn write_fields(&self, writer: &mut StableWriter);

    fn stable_bytes(&self) -> Vec<u8> {
        let mut writer = StableWriter::new();
        self.write_fields(&mut writer);
        writer.finish()
    }
}

#[derive(Debug, Default)]
pub struct StableWriter {
    buf: Vec<u8>,
}

impl StableWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uint64(&mut self, field: u32, value: u64) -> &mut Self {
        if value != 0 {
            self.tag(field, WIRE_VARINT);
            varint_encode(&mut self.buf, value);
        }
        self
    }

    pub fn enumeration(&mut self, field: u32, value: u8) -> &mut Self {
        self.uint64(field, u64::from(value))
    }

    pub fn boolean(&mut self, field: u32, value: bool) -> &mut Self {
        self.uint64(field, u64::from(value))
    }

    pub fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        if !value.is_empty() {
            self.length_delimited(field, value);
        }
        self
    }

    pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes(field, value.as_bytes())
    }

    /// Writes a nested message, skipped when it encodes to nothing.
    pub fn message<M: StableMarshal + ?Sized>(&mut self, field: u32, value: &M) -> &mut Self {
        let nested = value.stable_bytes();
        self.bytes(field, &nested)
    }

    pub fn optional_message<M: StableMarshal>(
        &mut self,
        field: u32,
        value: Option<&M>,
    ) -> &mut Self {
        match value {
            Some(value) => self.message(field, value),
            None => self,
        }
    }

    /// Repeated elements are written even when empty, keeping positions.
    pub fn repeated_bytes<'a, I>(&mut self, field: u32, values: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for value in values {
            self.length_delimited(field, value);
        }
        self
    }

    pub fn repeated_messages<'a, M, I>(&mut self, field: u32, values: I) -> &mut Self
    where
        M: StableMarshal + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        for value in values {
            let nested = value.stable_bytes();
            self.length_delimited(field, &nested);
        }
        self
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn tag(&mut self, field: u32, wire_type: u64) {
        varint_encode(&mut self.buf, (u64::from(field) << 3) | wire_type);
    }

    fn length_delimited(&mut self, field: u32, value: &[u8]) {
        self.tag(field, WIRE_LEN);
        varint_encode(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
    }
}

// Identifier messages wrap their bytes in field 1.
impl StableMarshal for OwnerId {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer.bytes(1, self.as_bytes());
    }
}

impl StableMarshal for ContainerId {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer.bytes(1, self.as_bytes());
    }
}

impl StableMarshal for ObjectId {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer.bytes(1, self.as_bytes());
    }
}

impl StableMarshal for Address {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer
            .message(1, &self.container)
            .optional_message(2, self.object.as_ref());
    }
}

fn varint_encode(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}
