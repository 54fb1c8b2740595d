// orrery_sync — engine-side synchronization engine for lock-step sessions.
//
// This crate is the renderer process's half of the session protocol: it
// connects to a hub (`orrery_hub`), runs the per-connection state machine,
// and moves mutable simulation state safely between the network reader
// thread and the engine's single-threaded simulation/render loop.
//
// Module overview:
// - `queue.rs`:      `HandoffQueue<T>` — thread-safe FIFO between the
//                    network thread and the simulation thread, with a
//                    close-wakes-consumers teardown signal.
// - `registry.rs`:   `Syncable` + `SyncRegistry` — the mapping from domain
//                    identifier to objects that encode/decode themselves at
//                    synchronization points, with latest-write-wins
//                    application on the receiving side.
// - `connection.rs`: `PeerConnection` — TCP connection to the hub, status /
//                    view-status state machine, hostship and view
//                    negotiation, and the simulation thread's drain and
//                    sync-tick entry points.
//
// Threading contract: the reader thread only updates this connection's own
// state and enqueues decoded data messages; the simulation thread owns the
// registry and all syncable state, draining the queue only at its
// designated synchronization point. No simulation state is ever touched
// from a network thread.
//
// Dependencies: `orrery_protocol` (message types, framing, sync buffer).
// No dependency on the hub crate or any rendering code.

pub mod connection;
pub mod queue;
pub mod registry;

pub use connection::{ConnectError, PeerConnection};
pub use queue::HandoffQueue;
pub use registry::{ApplyError, SyncRegistry, Syncable};
