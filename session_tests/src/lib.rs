// Test-only peer harness for session integration tests.
//
// Wraps a real `PeerConnection` (from `orrery_sync`) and a real
// `SyncRegistry` to provide a synchronous, test-friendly API for exercising
// the full pipeline: hub → authenticate → hostship → sync_tick → fan-out →
// drain → verify applied state.
//
// The only test-specific code here is the blocking poll wrappers (loops
// around status/queue checks) and `BlobSyncable`, an opaque-content
// syncable whose applied state the test can inspect through a shared
// handle. All networking and synchronization logic uses the same code paths
// as a real renderer peer.
//
// See also: `tests/full_pipeline.rs` for the end-to-end scenarios and
// `tests/host_invariant.rs` for the arbitration property tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use orrery_protocol::syncbuf::{SyncBuffer, SyncBufferError};
use orrery_protocol::types::{DomainType, Status, ViewStatus};
use orrery_sync::connection::PeerConnection;
use orrery_sync::registry::{SyncRegistry, Syncable};

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A syncable holding one opaque byte blob. The content lives behind a
/// shared handle so the test (standing in for the owning simulation
/// subsystem) can read what the registry applied.
pub struct BlobSyncable {
    state: Arc<Mutex<Vec<u8>>>,
    dirty: bool,
}

impl BlobSyncable {
    /// Returns the syncable and the shared content handle.
    pub fn new(initial: &[u8], dirty: bool) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let state = Arc::new(Mutex::new(initial.to_vec()));
        (
            Self {
                state: state.clone(),
                dirty,
            },
            state,
        )
    }
}

impl Syncable for BlobSyncable {
    fn encode(&self, buf: &mut SyncBuffer) {
        buf.write(&self.state.lock().unwrap().clone());
    }

    fn decode(&mut self, buf: &mut SyncBuffer) -> Result<(), SyncBufferError> {
        *self.state.lock().unwrap() = buf.read::<Vec<u8>>()?;
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// A test peer wrapping a real connection and registry.
pub struct TestPeer {
    pub conn: PeerConnection,
    pub registry: SyncRegistry,
}

impl TestPeer {
    /// Connect to a hub and wait for authentication to complete.
    pub fn connect(addr: std::net::SocketAddr, name: &str) -> Self {
        let conn = PeerConnection::connect(&addr.to_string(), name, "")
            .expect("TestPeer::connect failed");
        let peer = Self {
            conn,
            registry: SyncRegistry::new(),
        };
        peer.wait_until("authentication", |conn| {
            conn.status() != Status::Connecting
        });
        assert!(
            peer.conn.status().is_connected_or_connecting(),
            "authentication failed: {:?}",
            peer.conn.disconnect_reason()
        );
        peer
    }

    /// Register a blob syncable and return the shared content handle.
    pub fn register_blob(
        &mut self,
        domain: DomainType,
        initial: &[u8],
        dirty: bool,
    ) -> Arc<Mutex<Vec<u8>>> {
        let (blob, handle) = BlobSyncable::new(initial, dirty);
        self.registry.register(domain, Box::new(blob));
        handle
    }

    /// Blocking poll until the connection reaches the given status.
    pub fn wait_for_status(&self, status: Status) {
        self.wait_until("status", |conn| conn.status() == status);
    }

    /// Blocking poll until the connection reports the given view status.
    pub fn wait_for_view_status(&self, view_status: ViewStatus) {
        self.wait_until("view status", |conn| conn.view_status() == view_status);
    }

    /// Blocking poll until `count` data messages are queued for drain.
    pub fn wait_for_pending_data(&self, count: usize) {
        self.wait_until("pending data", |conn| conn.pending_data() >= count);
    }

    /// Blocking poll until the hub-announced peer count matches.
    pub fn wait_for_n_connections(&self, count: u32) {
        self.wait_until("peer count", |conn| conn.n_connections() == count);
    }

    fn wait_until(&self, what: &str, cond: impl Fn(&PeerConnection) -> bool) {
        let start = Instant::now();
        while !cond(&self.conn) {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {what} (status {:?}, reason {:?})",
                self.conn.status(),
                self.conn.disconnect_reason()
            );
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Give in-flight hub traffic a moment to land (for asserting that
/// something did NOT arrive).
pub fn settle() {
    thread::sleep(Duration::from_millis(150));
}
