// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Tag-length-value serializer for versioned settings blobs.
//!
//! Wire format: `[u32 version]` followed by entries of
//! `[u32 tag][u8 kind][u32 len][len bytes]`, all big-endian. Readers look
//! entries up by tag, so order on the wire is insignificant and unknown
//! tags are skipped.

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

const KIND_BOOL: u8 = 0x01;
const KIND_S32: u8 = 0x02;
const KIND_U64: u8 = 0x03;
const KIND_STRING: u8 = 0x04;
const KIND_BLOB: u8 = 0x05;

/// Reject absurd entry lengths before allocating.
const MAX_ENTRY_SIZE: u32 = 16 * 1024 * 1024;

/// Writer half: append tagged fields, then [`finish`](Serializer::finish).
pub struct Serializer {
    buf: BytesMut,
}

impl Serializer {
    pub fn new(version: u32) -> Self {
        let mut buf = BytesMut::new();
        buf.put_u32(version);
        Serializer { buf }
    }

    fn entry(&mut self, tag: u32, kind: u8, payload: &[u8]) {
        self.buf.put_u32(tag);
        self.buf.put_u8(kind);
        self.buf.put_u32(payload.len() as u32);
        self.buf.put_slice(payload);
    }

    pub fn write_bool(&mut self, tag: u32, value: bool) {
        self.entry(tag, KIND_BOOL, &[value as u8]);
    }

    pub fn write_s32(&mut self, tag: u32, value: i32) {
        self.entry(tag, KIND_S32, &value.to_be_bytes());
    }

    pub fn write_u64(&mut self, tag: u32, value: u64) {
        self.entry(tag, KIND_U64, &value.to_be_bytes());
    }

    pub fn write_string(&mut self, tag: u32, value: &str) {
        self.entry(tag, KIND_STRING, value.as_bytes());
    }

    pub fn write_blob(&mut self, tag: u32, value: &[u8]) {
        self.entry(tag, KIND_BLOB, value);
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Structural parse failure; field-level mismatches fall back to the
/// caller's defaults instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Truncated,
    OversizeEntry(u32),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "blob is truncated"),
            Self::OversizeEntry(len) => write!(f, "entry of {} bytes exceeds the size cap", len),
        }
    }
}

impl std::error::Error for FormatError {}

/// Reader half: parse once, then read fields by tag with defaults.
pub struct Deserializer {
    version: u32,
    entries: HashMap<u32, (u8, Bytes)>,
}

impl Deserializer {
    pub fn new(data: &[u8]) -> Result<Self, FormatError> {
        let mut buf = Bytes::copy_from_slice(data);
        if buf.remaining() < 4 {
            return Err(FormatError::Truncated);
        }
        let version = buf.get_u32();

        let mut entries = HashMap::new();
        while buf.has_remaining() {
            if buf.remaining() < 9 {
                return Err(FormatError::Truncated);
            }
            let tag = buf.get_u32();
            let kind = buf.get_u8();
            let len = buf.get_u32();
            if len > MAX_ENTRY_SIZE {
                return Err(FormatError::OversizeEntry(len));
            }
            if buf.remaining() < len as usize {
                return Err(FormatError::Truncated);
            }
            entries.insert(tag, (kind, buf.split_to(len as usize)));
        }
        Ok(Deserializer { version, entries })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn payload(&self, tag: u32, kind: u8) -> Option<&Bytes> {
        match self.entries.get(&tag) {
            Some((k, payload)) if *k == kind => Some(payload),
            _ => None,
        }
    }

    pub fn read_bool(&self, tag: u32, default: bool) -> bool {
        self.payload(tag, KIND_BOOL)
            .and_then(|p| p.first())
            .map(|b| *b != 0)
            .unwrap_or(default)
    }

    pub fn read_s32(&self, tag: u32, default: i32) -> i32 {
        self.payload(tag, KIND_S32)
            .and_then(|p| <[u8; 4]>::try_from(p.as_ref()).ok())
            .map(i32::from_be_bytes)
            .unwrap_or(default)
    }

    pub fn read_u64(&self, tag: u32, default: u64) -> u64 {
        self.payload(tag, KIND_U64)
            .and_then(|p| <[u8; 8]>::try_from(p.as_ref()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(default)
    }

    pub fn read_string(&self, tag: u32, default: &str) -> String {
        self.payload(tag, KIND_STRING)
            .and_then(|p| std::str::from_utf8(p.as_ref()).ok())
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// Missing or mistyped blobs read as empty.
    pub fn read_blob(&self, tag: u32) -> Bytes {
        self.payload(tag, KIND_BLOB).cloned().unwrap_or_default()
    }
}
