// Cursor-based byte buffer for ordered serialization of simulation state.
//
// A `SyncBuffer` has a write cursor (always at the end) and an explicit read
// cursor. Values are read back in exactly the order and width they were
// written — the format is NOT self-describing. Producer and consumer must
// agree on the schema; schema drift is a protocol-breaking change, not a
// runtime-detected error. What IS detected at runtime is buffer exhaustion:
// reading past the end fails with `OutOfBounds` rather than returning
// garbage.
//
// Encoding rules:
// - Multi-byte integers: big-endian, matching the frame header in
//   `framing.rs`.
// - Floats: IEEE-754 bit patterns via `to_bits`/`from_bits`.
// - `String` / `Vec<u8>`: u32 length prefix, then raw bytes. The prefix is
//   validated against the remaining byte count before any allocation.

use thiserror::Error;

/// Errors from reading a `SyncBuffer`. Fatal to the decode operation that
/// hit them, never to the connection carrying the payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncBufferError {
    #[error("read past end of sync buffer: needed {needed} bytes, {remaining} remaining")]
    OutOfBounds { needed: usize, remaining: usize },
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid {0} value on the wire")]
    InvalidValue(&'static str),
}

/// An ordered byte container with a read cursor and a write cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncBuffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl SyncBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap received bytes for reading; the read cursor starts at zero.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, read_pos: 0 }
    }

    /// Consume the buffer, yielding the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Append a value's encoding at the write cursor.
    pub fn write<T: SyncValue>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Read a value at the read cursor, advancing it by exactly the
    /// encoding's width.
    pub fn read<T: SyncValue>(&mut self) -> Result<T, SyncBufferError> {
        T::decode(self)
    }

    /// Append raw bytes without a length prefix. The reader must know the
    /// width (used for trailing opaque content).
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Take everything from the read cursor to the end.
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let rest = self.data[self.read_pos..].to_vec();
        self.read_pos = self.data.len();
        rest
    }

    /// Bytes left between the read cursor and the end.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rewind the read cursor to the start.
    pub fn reset_read(&mut self) {
        self.read_pos = 0;
    }

    /// Advance the read cursor over `n` bytes, failing if fewer remain.
    fn take(&mut self, n: usize) -> Result<&[u8], SyncBufferError> {
        if self.remaining() < n {
            return Err(SyncBufferError::OutOfBounds {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.data[start..self.read_pos])
    }
}

/// A value with a fixed or length-prefixed encoding in a `SyncBuffer`.
pub trait SyncValue: Sized {
    fn encode(&self, buf: &mut SyncBuffer);
    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError>;
}

macro_rules! sync_value_int {
    ($($t:ty),*) => {
        $(
            impl SyncValue for $t {
                fn encode(&self, buf: &mut SyncBuffer) {
                    buf.data.extend_from_slice(&self.to_be_bytes());
                }

                fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
                    let bytes = buf.take(size_of::<$t>())?;
                    let mut raw = [0u8; size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$t>::from_be_bytes(raw))
                }
            }
        )*
    };
}

sync_value_int!(u8, u16, u32, u64, i32, i64);

impl SyncValue for f32 {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.to_bits());
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        Ok(f32::from_bits(buf.read::<u32>()?))
    }
}

impl SyncValue for f64 {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.to_bits());
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        Ok(f64::from_bits(buf.read::<u64>()?))
    }
}

impl SyncValue for bool {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&u8::from(*self));
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        match buf.read::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SyncBufferError::InvalidValue("bool")),
        }
    }
}

impl SyncValue for Vec<u8> {
    fn encode(&self, buf: &mut SyncBuffer) {
        #[expect(clippy::cast_possible_truncation)]
        let len = self.len() as u32;
        buf.write(&len);
        buf.data.extend_from_slice(self);
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        let len = buf.read::<u32>()? as usize;
        Ok(buf.take(len)?.to_vec())
    }
}

impl SyncValue for String {
    fn encode(&self, buf: &mut SyncBuffer) {
        #[expect(clippy::cast_possible_truncation)]
        let len = self.len() as u32;
        buf.write(&len);
        buf.data.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        let len = buf.read::<u32>()? as usize;
        let bytes = buf.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SyncBufferError::InvalidUtf8)
    }
}
