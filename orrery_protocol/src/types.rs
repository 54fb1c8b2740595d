// Core ID and session-state types for the synchronization protocol.
//
// These are lightweight newtypes and enums shared by `message.rs` (wire
// payloads), the peer-side connection state machine (`orrery_sync`), and the
// hub's session bookkeeping (`orrery_hub`). Peer IDs are hub-assigned compact
// integers, not engine entity handles — the hub hands them out in join order
// for efficient wire representation.

use crate::syncbuf::{SyncBuffer, SyncBufferError, SyncValue};

/// Protocol version exchanged during authentication. A mismatch is a fatal
/// rejection, not a negotiation.
pub const PROTOCOL_VERSION: u32 = 1;

/// Hub-assigned peer ID (compact u32, not an engine entity handle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

/// Identifier of a synchronization domain — the registry key and the
/// `domainType` field of a data message. Well-known domains get associated
/// constants; the set is open for engine extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainType(pub u32);

impl DomainType {
    /// Camera pose of the host's view.
    pub const CAMERA: DomainType = DomainType(0);
    /// Simulation time state.
    pub const TIME: DomainType = DomainType(1);
    /// Script-driven state (opaque script call blobs).
    pub const SCRIPT: DomainType = DomainType(2);
}

/// Per-connection session status. Transitions are driven exclusively by
/// protocol messages, never by direct external mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// No live transport. Terminal until a new connection is made.
    Disconnected,
    /// Transport established, application-level authentication pending.
    Connecting,
    /// Authenticated, no host exists in the session.
    ClientWithoutHost,
    /// Authenticated, some other peer is host.
    ClientWithHost,
    /// This peer is the authoritative host.
    Host,
}

impl Status {
    /// True for every state with a live or pending transport.
    pub fn is_connected_or_connecting(self) -> bool {
        !matches!(self, Status::Disconnected)
    }
}

/// Whether a peer's camera follows the host's view. Orthogonal to `Status`:
/// any client may toggle between `HostView` and `IndependentView` without
/// touching hostship.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewStatus {
    /// Held only by the host connection itself.
    Host,
    /// Camera follows the host's broadcast view.
    HostView,
    /// Camera is independently controlled; host camera data is not applied.
    IndependentView,
}

impl ViewStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            ViewStatus::Host => 0,
            ViewStatus::HostView => 1,
            ViewStatus::IndependentView => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ViewStatus::Host),
            1 => Some(ViewStatus::HostView),
            2 => Some(ViewStatus::IndependentView),
            _ => None,
        }
    }
}

impl SyncValue for PeerId {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.0);
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        Ok(PeerId(buf.read::<u32>()?))
    }
}

impl SyncValue for DomainType {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.0);
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        Ok(DomainType(buf.read::<u32>()?))
    }
}

impl SyncValue for ViewStatus {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.as_u8());
    }

    fn decode(buf: &mut SyncBuffer) -> Result<Self, SyncBufferError> {
        let raw = buf.read::<u8>()?;
        ViewStatus::from_u8(raw).ok_or(SyncBufferError::InvalidValue("view status"))
    }
}
