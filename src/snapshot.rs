//! Byte snapshots of workflow states.
//!
//! The pool never inspects a snapshot; a state type owns both directions of its encoding.
//! Composite states use [`SnapshotWriter`]/[`SnapshotReader`]: every field is a big-endian
//! `u32` byte length followed by that many bytes, so a delegating parent can embed a child's
//! snapshot without knowing how the child encodes itself.
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{RunningHandle, WorkflowType};

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("snapshot text is not valid UTF-8")]
    InvalidUtf8,

    #[error("unexpected snapshot tag: expected {expected:?}, found {found:?}")]
    UnexpectedTag { expected: String, found: String },

    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),

    #[error("snapshot field of {0} bytes exceeds the u32 length prefix")]
    TooLarge(usize),

    #[error("json snapshot: {0}")]
    Json(String),
}

/// A state that can serialize itself to an opaque byte payload and parse it back.
pub trait Snapshot: Sized {
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError>;

    fn restore(bytes: &[u8]) -> Result<Self, SnapshotError>;
}

/// Appends length-prefixed fields.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, SnapshotError> {
        let len = u32::try_from(bytes.len()).map_err(|_| SnapshotError::TooLarge(bytes.len()))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// A discriminator string, typically naming the variant that follows.
    pub fn write_tag(&mut self, tag: &str) -> Result<&mut Self, SnapshotError> {
        self.write_bytes(tag.as_bytes())
    }

    /// The value's own snapshot as one field.
    pub fn write_nested<T: Snapshot>(&mut self, value: &T) -> Result<&mut Self, SnapshotError> {
        let nested = value.snapshot()?;
        self.write_bytes(&nested)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads back fields written by [`SnapshotWriter`], in order.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    rest: &'a [u8],
}

impl<'a> SnapshotReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], SnapshotError> {
        let prefix = self.take(LEN_PREFIX)?;
        let mut len = [0u8; LEN_PREFIX];
        len.copy_from_slice(prefix);
        self.take(u32::from_be_bytes(len) as usize)
    }

    pub fn read_tag(&mut self) -> Result<&'a str, SnapshotError> {
        std::str::from_utf8(self.read_bytes()?).map_err(|_| SnapshotError::InvalidUtf8)
    }

    pub fn expect_tag(&mut self, expected: &str) -> Result<(), SnapshotError> {
        let found = self.read_tag()?;
        if found != expected {
            return Err(SnapshotError::UnexpectedTag {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    pub fn read_nested<T: Snapshot>(&mut self) -> Result<T, SnapshotError> {
        T::restore(self.read_bytes()?)
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Succeeds only if every byte was consumed.
    pub fn finish(self) -> Result<(), SnapshotError> {
        match self.rest.len() {
            0 => Ok(()),
            n => Err(SnapshotError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], SnapshotError> {
        if needed > self.rest.len() {
            return Err(SnapshotError::Truncated {
                needed,
                remaining: self.rest.len(),
            });
        }
        let (head, tail) = self.rest.split_at(needed);
        self.rest = tail;
        Ok(head)
    }
}

impl Snapshot for String {
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(self.as_bytes().to_vec())
    }

    fn restore(bytes: &[u8]) -> Result<Self, SnapshotError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::InvalidUtf8)
    }
}

/// A handle to a child instance snapshots as the child's name followed by the child state's
/// own snapshot. The type is implied by `S`, `E` and `O`.
impl<S, E, O> Snapshot for RunningHandle<S, E, O>
where
    S: Snapshot + 'static,
    E: 'static,
    O: 'static,
{
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut w = SnapshotWriter::new();
        w.write_tag(self.id.name())?.write_nested(&self.state)?;
        Ok(w.finish())
    }

    fn restore(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut r = SnapshotReader::new(bytes);
        let name = r.read_tag()?;
        let state = r.read_nested::<S>()?;
        r.finish()?;
        Ok(RunningHandle::new(WorkflowType::new().make_id(name), state))
    }
}

/// serde_json payloads for states that derive `Serialize`/`Deserialize`.
pub mod json {
    use super::*;

    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(value).map_err(|e| SnapshotError::Json(e.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SnapshotError> {
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Json(e.to_string()))
    }
}
