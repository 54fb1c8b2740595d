// Peer-side session connection and state machine.
//
// `PeerConnection` is the renderer process's handle on a lock-step session.
// Architecture:
// - `connect()` performs TCP connect + sends the Authentication handshake on
//   the calling thread, then spawns a background reader thread. The
//   connection is observable as `Connecting` until the hub's reply lands.
// - The reader thread calls `read_message()` in a loop. Session control
//   messages mutate only this connection's own state (behind its state
//   mutex); Data/IndependentData payloads are decoded to `DataMessage` and
//   pushed onto the handoff queue — the simulation thread never sees a
//   partial payload.
// - The simulation thread owns the `SyncRegistry` and calls `drain()` (or
//   `drain_blocking()`) at its designated synchronization point, never
//   mid-frame. When hosting, it calls `sync_tick()` once per tick to
//   broadcast dirty state.
//
// Status transitions are driven exclusively by received messages: the hub's
// Authentication reply takes Connecting → ClientWithoutHost, a
// ConnectionStatus naming another peer takes it to ClientWithHost, one
// naming this peer is the hostship grant, and HostshipResignation walks
// followers back to ClientWithoutHost. Any transport loss or framing error
// is fatal: the reader marks the connection Disconnected, closes the queue,
// and exits — no partial-message recovery, no automatic reconnection.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use orrery_protocol::framing::{FramingError, read_message, write_message};
use orrery_protocol::message::{
    AuthenticationPayload, AuthenticationReply, ConnectionStatusPayload, DataMessage,
    DisconnectionPayload, Message, MessageType, NConnectionsPayload, ViewStatusPayload,
};
use orrery_protocol::types::{PROTOCOL_VERSION, PeerId, Status, ViewStatus};
use thiserror::Error;

use crate::queue::HandoffQueue;
use crate::registry::SyncRegistry;

/// Errors establishing a session connection. Everything after the handshake
/// send surfaces asynchronously through `status()`/`disconnect_reason()`.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to hub: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to send authentication: {0}")]
    Handshake(#[from] FramingError),
}

/// Session state shared between the reader thread and the simulation thread.
#[derive(Clone, Debug)]
struct SessionState {
    status: Status,
    view_status: ViewStatus,
    peer_id: Option<PeerId>,
    host: Option<(PeerId, String)>,
    n_connections: u32,
    independent_session: bool,
    disconnect_reason: Option<String>,
}

/// A peer's connection to the session hub.
pub struct PeerConnection {
    stream: TcpStream,
    writer: BufWriter<TcpStream>,
    state: Arc<Mutex<SessionState>>,
    inbox: Arc<HandoffQueue<DataMessage>>,
    reader_thread: Option<JoinHandle<()>>,
}

impl PeerConnection {
    /// Connect to a session hub and send the Authentication handshake.
    /// Returns with the connection in `Connecting`; the reader thread
    /// advances the state machine as hub replies arrive.
    pub fn connect(addr: &str, name: &str, password: &str) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr)?;
        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream.try_clone()?);

        let auth = AuthenticationPayload {
            protocol_version: PROTOCOL_VERSION,
            name: name.into(),
            password: password.into(),
        };
        write_message(&mut writer, &auth.into_message())?;

        let state = Arc::new(Mutex::new(SessionState {
            status: Status::Connecting,
            view_status: ViewStatus::HostView,
            peer_id: None,
            host: None,
            n_connections: 0,
            independent_session: false,
            disconnect_reason: None,
        }));
        let inbox = Arc::new(HandoffQueue::new());

        let reader_state = state.clone();
        let reader_inbox = inbox.clone();
        let reader_thread = thread::spawn(move || {
            reader_loop(BufReader::new(reader_stream), reader_state, reader_inbox);
        });

        Ok(Self {
            stream,
            writer,
            state,
            inbox,
            reader_thread: Some(reader_thread),
        })
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Status {
        self.session().status
    }

    pub fn view_status(&self) -> ViewStatus {
        self.session().view_status
    }

    /// Hub-assigned ID, available once authentication completes.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.session().peer_id
    }

    /// Current host identity as last announced by the hub.
    pub fn host(&self) -> Option<(PeerId, String)> {
        self.session().host.clone()
    }

    /// Live peer count as last broadcast by the hub.
    pub fn n_connections(&self) -> u32 {
        self.session().n_connections
    }

    /// Why the session ended, when it ended on the hub's or transport's
    /// initiative.
    pub fn disconnect_reason(&self) -> Option<String> {
        self.session().disconnect_reason.clone()
    }

    pub fn is_connected_or_connecting(&self) -> bool {
        self.status().is_connected_or_connecting()
    }

    /// Send a protocol message. Returns a success flag; failures are logged,
    /// and the reader thread surfaces the actual disconnect.
    pub fn send_message(&mut self, msg: &Message) -> bool {
        if !self.is_connected_or_connecting() {
            return false;
        }
        match write_message(&mut self.writer, msg) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to send {:?} message: {e}", msg.message_type);
                false
            }
        }
    }

    /// Send simulation state, fire-and-forget (no backpressure signal).
    /// Inside an independent-session bracket the data is tagged
    /// IndependentData so the hub does not treat it as authoritative.
    pub fn send_data_message(&mut self, data: DataMessage) {
        let msg = if self.session().independent_session {
            data.into_independent_message()
        } else {
            data.into_message()
        };
        let _ = self.send_message(&msg);
    }

    /// Ask the hub for hostship. The grant (or the negative acknowledgment
    /// re-announcing the current host) arrives as a ConnectionStatus.
    pub fn request_hostship(&mut self) -> bool {
        self.send_message(&Message::empty(MessageType::HostshipRequest))
    }

    /// Relinquish hostship. Confirmed by the hub's resignation broadcast.
    pub fn resign_hostship(&mut self) -> bool {
        self.send_message(&Message::empty(MessageType::HostshipResignation))
    }

    /// Follow the host's camera again.
    pub fn request_host_view(&mut self) -> bool {
        self.send_message(&Message::empty(MessageType::ViewRequest))
    }

    /// Stop following the host's camera (keeps receiving time/script data).
    pub fn resign_host_view(&mut self) -> bool {
        self.send_message(&Message::empty(MessageType::ViewResignation))
    }

    /// Bracket a period of intentional local divergence (solo exploration).
    pub fn set_independent_session(&mut self, on: bool) -> bool {
        let message_type = if on {
            MessageType::IndependentSessionOn
        } else {
            MessageType::IndependentSessionOff
        };
        let sent = self.send_message(&Message::empty(message_type));
        if sent {
            self.session().independent_session = on;
        }
        sent
    }

    /// Disconnect: best-effort goodbye, socket shutdown (interrupting the
    /// reader's blocking receive), queue closed. Idempotent.
    pub fn disconnect(&mut self) {
        let Some(reader) = self.reader_thread.take() else {
            return;
        };
        self.session().status = Status::Disconnected;
        let goodbye = DisconnectionPayload {
            reason: String::new(),
        }
        .into_message();
        if let Err(e) = write_message(&mut self.writer, &goodbye) {
            log::debug!("goodbye not sent: {e}");
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.inbox.close();
        let _ = reader.join();
    }

    /// The simulation thread's synchronization point: drain queued data
    /// messages without blocking and apply them latest-write-wins through
    /// the registry. Returns how many were applied.
    pub fn drain(&mut self, registry: &mut SyncRegistry) -> usize {
        let mut applied = 0;
        while let Some(data) = self.inbox.try_pop() {
            applied += usize::from(apply_data(registry, &data));
        }
        applied
    }

    /// Blocking variant: wait for at least one data message (or connection
    /// teardown), then drain the rest. For simulation loops that park
    /// between synchronization points instead of polling.
    pub fn drain_blocking(&mut self, registry: &mut SyncRegistry) -> usize {
        match self.inbox.pop() {
            Some(data) => usize::from(apply_data(registry, &data)) + self.drain(registry),
            None => 0,
        }
    }

    /// Host side, once per simulation tick: serialize dirty syncables and
    /// broadcast each as a data message stamped with the current simulation
    /// time. No-op unless this peer is host.
    pub fn sync_tick(&mut self, registry: &mut SyncRegistry, sim_time: f64) -> usize {
        if self.status() != Status::Host {
            return 0;
        }
        let dirty = registry.collect_dirty();
        let count = dirty.len();
        for (domain, content) in dirty {
            self.send_data_message(DataMessage {
                domain,
                timestamp: sim_time,
                content,
            });
        }
        count
    }

    /// Number of received data messages waiting for the next drain.
    pub fn pending_data(&self) -> usize {
        self.inbox.len()
    }
}

fn apply_data(registry: &mut SyncRegistry, data: &DataMessage) -> bool {
    match registry.apply(data.domain, data.timestamp, &data.content) {
        Ok(applied) => applied,
        Err(e) => {
            log::warn!("dropping unusable data message for {:?}: {e}", data.domain);
            false
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reader thread: blocking receive loop. Exits on transport loss, framing
/// error, or a Disconnection message — all of which end in `Disconnected`
/// with the queue closed so a parked simulation thread wakes.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    state: Arc<Mutex<SessionState>>,
    inbox: Arc<HandoffQueue<DataMessage>>,
) {
    loop {
        match read_message(&mut reader) {
            Ok(msg) => {
                if !handle_session_message(&msg, &state, &inbox) {
                    break;
                }
            }
            Err(e) => {
                let mut session = lock(&state);
                // A read error after a local disconnect() is just the
                // socket shutdown landing — not worth a reason or a log.
                if session.status != Status::Disconnected {
                    if e.is_connection_lost() {
                        log::info!("connection to hub lost: {e}");
                    } else {
                        log::warn!("fatal framing error from hub: {e}");
                    }
                    session.status = Status::Disconnected;
                    if session.disconnect_reason.is_none() {
                        session.disconnect_reason = Some(e.to_string());
                    }
                }
                break;
            }
        }
    }
    inbox.close();
}

/// Dispatch one received message. Returns false when the session is over.
fn handle_session_message(
    msg: &Message,
    state: &Mutex<SessionState>,
    inbox: &HandoffQueue<DataMessage>,
) -> bool {
    match msg.message_type {
        MessageType::Authentication => {
            match AuthenticationReply::decode_payload(&msg.payload) {
                Ok(reply) => {
                    let mut session = lock(state);
                    session.peer_id = Some(reply.peer_id);
                    if session.status == Status::Connecting {
                        session.status = Status::ClientWithoutHost;
                    }
                    log::info!("authenticated as peer {:?}", reply.peer_id);
                }
                Err(e) => log::warn!("dropping malformed authentication reply: {e}"),
            }
            true
        }
        MessageType::ConnectionStatus => {
            match ConnectionStatusPayload::decode_payload(&msg.payload) {
                Ok(payload) => apply_connection_status(&mut lock(state), payload.host),
                Err(e) => log::warn!("dropping malformed connection status: {e}"),
            }
            true
        }
        MessageType::HostshipResignation => {
            let mut session = lock(state);
            session.host = None;
            if matches!(session.status, Status::ClientWithHost | Status::Host) {
                session.status = Status::ClientWithoutHost;
            }
            if session.view_status == ViewStatus::Host {
                session.view_status = ViewStatus::HostView;
            }
            log::info!("host resigned");
            true
        }
        MessageType::ViewStatus => {
            match ViewStatusPayload::decode_payload(&msg.payload) {
                Ok(payload) => lock(state).view_status = payload.0,
                Err(e) => log::warn!("dropping malformed view status: {e}"),
            }
            true
        }
        MessageType::NConnections => {
            match NConnectionsPayload::decode_payload(&msg.payload) {
                Ok(payload) => lock(state).n_connections = payload.0,
                Err(e) => log::warn!("dropping malformed peer count: {e}"),
            }
            true
        }
        MessageType::Data | MessageType::IndependentData => {
            // Only a complete, decodable payload ever reaches the
            // simulation thread; a schema error costs this message only.
            match DataMessage::decode_payload(&msg.payload) {
                Ok(data) => inbox.push(data),
                Err(e) => log::warn!("dropping malformed data payload: {e}"),
            }
            true
        }
        MessageType::Disconnection => {
            let reason = DisconnectionPayload::decode_payload(&msg.payload)
                .map(|p| p.reason)
                .unwrap_or_default();
            if reason.is_empty() {
                log::info!("hub closed the session");
            } else {
                log::info!("hub closed the session: {reason}");
            }
            let mut session = lock(state);
            session.status = Status::Disconnected;
            session.disconnect_reason = Some(reason);
            false
        }
        MessageType::HostshipRequest
        | MessageType::ViewRequest
        | MessageType::ViewResignation
        | MessageType::IndependentSessionOn
        | MessageType::IndependentSessionOff => {
            log::debug!(
                "ignoring {:?} message from hub (peer-originated type)",
                msg.message_type
            );
            true
        }
    }
}

/// Apply a hub host announcement to the state machine. Covers the grant
/// (host == self), a demotion or another peer's grant (host == other), and
/// host absence.
fn apply_connection_status(session: &mut SessionState, host: Option<(PeerId, String)>) {
    match &host {
        Some((id, name)) => {
            if session.peer_id == Some(*id) {
                if session.status != Status::Disconnected {
                    session.status = Status::Host;
                    session.view_status = ViewStatus::Host;
                }
                log::info!("hostship granted");
            } else {
                if session.status == Status::Host {
                    log::info!("hostship reassigned to {name}");
                }
                if matches!(
                    session.status,
                    Status::ClientWithoutHost | Status::ClientWithHost | Status::Host
                ) {
                    session.status = Status::ClientWithHost;
                }
                if session.view_status == ViewStatus::Host {
                    session.view_status = ViewStatus::HostView;
                }
                log::info!("host is {name} ({id:?})");
            }
        }
        None => {
            if matches!(session.status, Status::ClientWithHost | Status::Host) {
                session.status = Status::ClientWithoutHost;
            }
            if session.view_status == ViewStatus::Host {
                session.view_status = ViewStatus::HostView;
            }
        }
    }
    session.host = host;
}
