// Typed message framing over a byte stream.
//
// Wire frame: `[4-byte magic][4-byte message type][4-byte payload length]`
// header, then the payload bytes. All integers big-endian. The pure
// `encode`/`decode` pair transforms between `Message` and raw bytes with no
// socket I/O; `write_message`/`read_message` are thin blocking adapters over
// any `Read`/`Write` stream for callers that own a transport.
//
// A `MAX_PAYLOAD_SIZE` constant (16 MB) protects against unbounded
// allocation from malformed or malicious length prefixes. Script-state blobs
// are the largest expected payloads; 16 MB is generous headroom.
//
// Framing errors are fatal to the connection that produced them — no
// partial-frame recovery is attempted anywhere in the stack.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::message::{Message, MessageType};

/// Fixed tag opening every frame. A stream that does not start with it is
/// not speaking this protocol.
pub const MAGIC: [u8; 4] = *b"ORRY";

/// Frame header width: magic + type tag + payload length.
pub const HEADER_SIZE: usize = 12;

/// Maximum allowed payload size (16 MB). Protects against unbounded
/// allocation from malformed length prefixes.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Errors from framing or unframing a message.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("payload too large: {0} bytes (max {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),
    #[error("frame header incomplete: {0} of {HEADER_SIZE} bytes")]
    ShortHeader(usize),
    #[error("bad magic {0:?} (expected {MAGIC:?})")]
    BadMagic([u8; 4]),
    #[error("unrecognized message type tag {0}")]
    UnknownType(u32),
    #[error("truncated frame: declared {declared} payload bytes, {actual} available")]
    Truncated { declared: u32, actual: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FramingError {
    /// True when the underlying transport is gone (as opposed to the peer
    /// sending garbage). Both are fatal to the connection; callers use this
    /// to pick the log message.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, FramingError::Io(_))
    }
}

/// Frame a message. Total for every well-formed in-memory message up to
/// `MAX_PAYLOAD_SIZE` — oversize payload is the single failure mode.
pub fn encode(msg: &Message) -> Result<Vec<u8>, FramingError> {
    if msg.payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(FramingError::PayloadTooLarge(msg.payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + msg.payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&msg.message_type.as_u32().to_be_bytes());
    #[expect(clippy::cast_possible_truncation)]
    let len = msg.payload.len() as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&msg.payload);
    Ok(out)
}

/// Unframe a message from a byte slice. Returns the message and the number
/// of bytes consumed (multiple frames may be concatenated). Pure transform —
/// no socket I/O.
pub fn decode(bytes: &[u8]) -> Result<(Message, usize), FramingError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FramingError::ShortHeader(bytes.len()));
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[0..4]);
    if magic != MAGIC {
        return Err(FramingError::BadMagic(magic));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[4..8]);
    let type_tag = u32::from_be_bytes(raw);
    let message_type =
        MessageType::from_u32(type_tag).ok_or(FramingError::UnknownType(type_tag))?;
    raw.copy_from_slice(&bytes[8..12]);
    let declared = u32::from_be_bytes(raw);
    if declared > MAX_PAYLOAD_SIZE {
        return Err(FramingError::PayloadTooLarge(declared as usize));
    }
    let actual = bytes.len() - HEADER_SIZE;
    if declared as usize > actual {
        return Err(FramingError::Truncated { declared, actual });
    }
    let end = HEADER_SIZE + declared as usize;
    let payload = bytes[HEADER_SIZE..end].to_vec();
    Ok((Message::new(message_type, payload), end))
}

/// Frame and write a message to a blocking stream, flushing afterwards.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<(), FramingError> {
    let frame = encode(msg)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read exactly one framed message from a blocking stream.
///
/// A clean close before or mid-frame surfaces as `Io(UnexpectedEof)`;
/// connection loss as the corresponding `Io` error. Both are fatal to the
/// connection — the caller transitions it to disconnected.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, FramingError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&header[0..4]);
    if magic != MAGIC {
        return Err(FramingError::BadMagic(magic));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&header[4..8]);
    let type_tag = u32::from_be_bytes(raw);
    let message_type =
        MessageType::from_u32(type_tag).ok_or(FramingError::UnknownType(type_tag))?;
    raw.copy_from_slice(&header[8..12]);
    let declared = u32::from_be_bytes(raw);
    if declared > MAX_PAYLOAD_SIZE {
        return Err(FramingError::PayloadTooLarge(declared as usize));
    }

    let mut payload = vec![0u8; declared as usize];
    reader.read_exact(&mut payload)?;
    Ok(Message::new(message_type, payload))
}
