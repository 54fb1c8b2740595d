// Typed protocol messages for peer-hub communication.
//
// `MessageType` is the wire-level type tag; its numeric values are fixed and
// must not be renumbered without a protocol version bump. `Message` is the
// stateless wire unit: a type tag plus an opaque payload, constructed per
// send/receive. Payload layouts are defined by the typed payload structs
// below, each encoding/decoding through a `SyncBuffer`.
//
// Data messages carry opaque simulation state (camera pose, time, script
// blobs) — this crate never inspects the content bytes, only the
// `[domain][timestamp]` header that receivers use for latest-write-wins
// ordering. This keeps the protocol crate independent of the engine crates.

use crate::syncbuf::{SyncBuffer, SyncBufferError};
use crate::types::{DomainType, PeerId, ViewStatus};

/// Wire-level message type tags. Numeric order is part of the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Authentication = 0,
    Data = 1,
    IndependentData = 2,
    ConnectionStatus = 3,
    HostshipRequest = 4,
    HostshipResignation = 5,
    ViewRequest = 6,
    ViewResignation = 7,
    ViewStatus = 8,
    IndependentSessionOn = 9,
    IndependentSessionOff = 10,
    NConnections = 11,
    Disconnection = 12,
}

impl MessageType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(MessageType::Authentication),
            1 => Some(MessageType::Data),
            2 => Some(MessageType::IndependentData),
            3 => Some(MessageType::ConnectionStatus),
            4 => Some(MessageType::HostshipRequest),
            5 => Some(MessageType::HostshipResignation),
            6 => Some(MessageType::ViewRequest),
            7 => Some(MessageType::ViewResignation),
            8 => Some(MessageType::ViewStatus),
            9 => Some(MessageType::IndependentSessionOn),
            10 => Some(MessageType::IndependentSessionOff),
            11 => Some(MessageType::NConnections),
            12 => Some(MessageType::Disconnection),
            _ => None,
        }
    }
}

/// The wire-level unit: type tag plus payload bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// A message whose type alone carries the meaning (requests,
    /// resignations, session brackets).
    pub fn empty(message_type: MessageType) -> Self {
        Self::new(message_type, Vec::new())
    }
}

/// Synchronization payload: opaque content tagged with its domain and the
/// simulation timestamp that orders it. Timestamp is monotonic simulation
/// time; receivers apply strictly-newer content only (latest write wins).
///
/// Payload layout: `[domain: 4 bytes][timestamp: 8-byte float][content]` —
/// the content runs to the end of the payload, no length prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct DataMessage {
    pub domain: DomainType,
    pub timestamp: f64,
    pub content: Vec<u8>,
}

impl DataMessage {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.domain);
        buf.write(&self.timestamp);
        buf.write_raw(&self.content);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        let domain = buf.read::<DomainType>()?;
        let timestamp = buf.read::<f64>()?;
        let content = buf.read_remaining();
        Ok(Self {
            domain,
            timestamp,
            content,
        })
    }

    /// Wrap as a host-authoritative `Data` message.
    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::Data, payload)
    }

    /// Wrap as an `IndependentData` message (divergence bracket traffic).
    pub fn into_independent_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::IndependentData, payload)
    }
}

/// Peer → hub: join handshake. Must be the first frame on a new connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationPayload {
    pub protocol_version: u32,
    pub name: String,
    /// Empty when the hub runs without a password.
    pub password: String,
}

impl AuthenticationPayload {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.protocol_version);
        buf.write(&self.name);
        buf.write(&self.password);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        Ok(Self {
            protocol_version: buf.read::<u32>()?,
            name: buf.read::<String>()?,
            password: buf.read::<String>()?,
        })
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::Authentication, payload)
    }
}

/// Hub → peer: handshake accepted, carrying the assigned peer ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticationReply {
    pub peer_id: PeerId,
}

impl AuthenticationReply {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.peer_id);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        Ok(Self {
            peer_id: buf.read::<PeerId>()?,
        })
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::Authentication, payload)
    }
}

/// Hub → peers: current host identity, or absence thereof. Sent to newly
/// joined peers, on every hostship change, and as the negative
/// acknowledgment for a hostship request that cannot be granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionStatusPayload {
    pub host: Option<(PeerId, String)>,
}

impl ConnectionStatusPayload {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        match &self.host {
            Some((id, name)) => {
                buf.write(&true);
                buf.write(id);
                buf.write(name);
            }
            None => buf.write(&false),
        }
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        let host = if buf.read::<bool>()? {
            Some((buf.read::<PeerId>()?, buf.read::<String>()?))
        } else {
            None
        };
        Ok(Self { host })
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::ConnectionStatus, payload)
    }
}

/// Hub → peer: confirmed view status after a view request/resignation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewStatusPayload(pub ViewStatus);

impl ViewStatusPayload {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.0);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        Ok(Self(buf.read::<ViewStatus>()?))
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::ViewStatus, payload)
    }
}

/// Hub → peers: live peer count, broadcast on every membership change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NConnectionsPayload(pub u32);

impl NConnectionsPayload {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.0);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        Ok(Self(buf.read::<u32>()?))
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::NConnections, payload)
    }
}

/// Either direction: the connection is ending. The reason is empty for a
/// voluntary disconnect and names the cause for a fatal rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectionPayload {
    pub reason: String,
}

impl DisconnectionPayload {
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = SyncBuffer::new();
        buf.write(&self.reason);
        buf.into_bytes()
    }

    pub fn decode_payload(bytes: &[u8]) -> Result<Self, SyncBufferError> {
        let mut buf = SyncBuffer::from_bytes(bytes.to_vec());
        Ok(Self {
            reason: buf.read::<String>()?,
        })
    }

    pub fn into_message(self) -> Message {
        let payload = self.encode_payload();
        Message::new(MessageType::Disconnection, payload)
    }
}
