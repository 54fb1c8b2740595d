// orrery_hub — session hub coordinator for lock-step synchronization.
//
// The hub is the meeting point for renderer peers: it accepts TCP
// connections, authenticates them (protocol version is a fatal gate),
// arbitrates hostship so at most one peer is ever authoritative, and fans
// the host's simulation state out to every follower. It never runs a
// simulation itself — all engine state stays on the peers.
//
// Module overview:
// - `session.rs`: Session state — peer roster, hostship arbitration with a
//                 pending-request queue, view-status bookkeeping, data
//                 fan-out. The core data structure that `server.rs` drives.
// - `server.rs`:  TCP listener, reader threads (one per peer), and the main
//                 event loop. Uses `std::net` with a thread-per-reader
//                 architecture and an `mpsc` channel to funnel events into
//                 the single-threaded `HubSession`.
//
// Dependencies: `orrery_protocol` (shared message types and framing). No
// dependency on the engine-side crates.
//
// The hub can run as a standalone binary (`main.rs`) or be embedded in a
// renderer process via the library API (`start_hub`).

pub mod server;
pub mod session;

pub use server::{HubConfig, HubHandle, start_hub};
