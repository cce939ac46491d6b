//! [`Buffer`]: the move-only message envelope used throughout the
//! transport.
//!
//! The three shapes a message can take map onto one `enum`:
//! - an inline copy of a typed value's bytes (`Inline`);
//! - a string payload (`Text`);
//! - an aliased window over caller-owned bytes (`Aliased`) — `Bytes` is a
//!   refcounted view rather than an owning copy, so `adopt` never clones
//!   the underlying storage, only takes a cheap handle to it.
//!
//! `Buffer` itself has no `Clone` impl: ownership of the envelope is
//! unambiguous, matching the move-only contract. Cloning the storage a
//! `Buffer` wraps (where that storage is itself refcounted) is a separate,
//! explicit operation callers reach for only when they actually need two
//! owners of the same bytes.

use bytes::Bytes;

/// The wire's reserved encoding for an empty payload, so a zero-length
/// frame (which would otherwise be ambiguous with "no frame at all") never
/// has to be sent.
const NULL_SENTINEL: [u8; 2] = *b"\0\0";

#[derive(Debug)]
enum BufferModel {
    Null,
    Inline(Bytes),
    Text(String),
    Aliased(Bytes),
}

/// A move-only byte envelope. See the module docs for the three shapes it
/// can hold.
#[derive(Debug)]
pub struct Buffer {
    model: BufferModel,
}

impl Buffer {
    pub fn null() -> Self {
        Self { model: BufferModel::Null }
    }

    /// Wraps an inline copy of already-serialized bytes (shape (a)).
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::null()
        } else {
            Self { model: BufferModel::Inline(bytes) }
        }
    }

    /// Wraps a string payload (shape (b)).
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::null()
        } else {
            Self { model: BufferModel::Text(s) }
        }
    }

    /// Adopts `bytes` as an aliased window (shape (c)): takes a cheap
    /// refcounted handle on the caller's storage rather than copying it.
    pub fn adopt(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::null()
        } else {
            Self { model: BufferModel::Aliased(bytes) }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.model, BufferModel::Null)
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.model {
            BufferModel::Null => &[],
            BufferModel::Inline(b) | BufferModel::Aliased(b) => b,
            BufferModel::Text(s) => s.as_bytes(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.model {
            BufferModel::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self.model {
            BufferModel::Null => Bytes::new(),
            BufferModel::Inline(b) | BufferModel::Aliased(b) => b,
            BufferModel::Text(s) => Bytes::from(s.into_bytes()),
        }
    }

    /// Serializes to the exact bytes a wire frame's payload should carry:
    /// the reserved sentinel for an empty buffer, or the raw content
    /// otherwise.
    pub fn to_wire(&self) -> Bytes {
        if self.is_null() {
            Bytes::copy_from_slice(&NULL_SENTINEL)
        } else {
            Bytes::copy_from_slice(self.as_bytes())
        }
    }

    /// Inverse of [`Buffer::to_wire`].
    pub fn from_wire(bytes: Bytes) -> Self {
        if bytes.as_ref() == NULL_SENTINEL {
            Self::null()
        } else {
            Self::adopt(bytes)
        }
    }
}
