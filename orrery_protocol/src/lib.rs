// orrery_protocol — wire protocol for lock-step session synchronization.
//
// This crate defines the message types, framing, and the cursor-based sync
// buffer used by the session hub (`orrery_hub`) and renderer peers
// (`orrery_sync`) to communicate over TCP. It is shared between both sides
// and has no dependency on the engine or hub crates.
//
// Module overview:
// - `types.rs`:   Core types — `PeerId`, `DomainType`, `Status`,
//                 `ViewStatus`, `PROTOCOL_VERSION`.
// - `syncbuf.rs`: `SyncBuffer`, the ordered read/write byte buffer that all
//                 payloads serialize through. Not self-describing; producer
//                 and consumer agree on schema.
// - `message.rs`: `MessageType` tags, `Message`, `DataMessage`, and the
//                 typed payload structs for session control messages.
// - `framing.rs`: Binary framing — `[magic][type][length]` header, then
//                 payload — as a pure codec plus `Read`/`Write` adapters.
//
// Design decisions:
// - **Hand-specified binary layout.** Payloads are fixed-schema SyncBuffer
//   encodings, not a self-describing format: simulation state is rebroadcast
//   many times per second and the two ends always run the same protocol
//   version (the Authentication gate enforces it).
// - **Data content as opaque `Vec<u8>`.** Neither the hub nor this crate
//   inspects camera/time/script content; only the `[domain][timestamp]`
//   header is decoded for routing and latest-write-wins ordering.
// - **No async runtime.** `std::io::Read`/`Write` framing, compatible with
//   blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod syncbuf;
pub mod types;

pub use framing::{FramingError, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, read_message, write_message};
pub use message::{
    AuthenticationPayload, AuthenticationReply, ConnectionStatusPayload, DataMessage,
    DisconnectionPayload, Message, MessageType, NConnectionsPayload, ViewStatusPayload,
};
pub use syncbuf::{SyncBuffer, SyncBufferError, SyncValue};
pub use types::{DomainType, PROTOCOL_VERSION, PeerId, Status, ViewStatus};
