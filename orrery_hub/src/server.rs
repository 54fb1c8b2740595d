// TCP server and main event loop for the hub coordinator.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `HubEvent::NewConnection` to the main thread.
// - **Reader threads** (one per peer): call `framing::read_message()` in a
//   loop and send `HubEvent::MessageFrom` to the main thread. On a framing
//   error, transport loss, or a Disconnection message they send
//   `HubEvent::Disconnected`.
// - **Main thread**: owns the `HubSession` and dispatches events. This is
//   the single coordination point the arbitration rules rely on: hostship
//   grants are serialized here, so two "simultaneous" requests resolve by
//   arrival order at this loop.
//
// The main thread is the only writer to peer TCP streams (via
// `HubSession::broadcast`/`send_to`). Reader threads only read. This avoids
// concurrent read/write on the same `TcpStream`, which is safe on most
// platforms but fragile.
//
// Shutdown: the main thread checks a `keep_running` flag (cleared by
// `HubHandle::stop`), breaks out of the event loop, and shuts every peer
// socket down so blocked reader threads wake with an error.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use orrery_protocol::framing::{read_message, write_message};
use orrery_protocol::message::{AuthenticationPayload, DisconnectionPayload, Message, MessageType};
use orrery_protocol::types::PeerId;
use serde::Deserialize;

use crate::session::HubSession;

/// Events sent from listener/reader threads to the main thread.
enum HubEvent {
    NewConnection {
        stream: TcpStream,
    },
    MessageFrom {
        peer_id: PeerId,
        message: Message,
    },
    Disconnected {
        peer_id: PeerId,
    },
}

/// Handle returned by `start_hub` to control the running server.
pub struct HubHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl HubHandle {
    /// Signal the hub to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a hub server. Deserializable so the binary
/// can load it from a JSON file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub port: u16,
    pub session_name: String,
    pub password: Option<String>,
    /// Policy knob: queue hostship requests while the seat is taken instead
    /// of rejecting them.
    pub queue_hostship_requests: bool,
    pub max_peers: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: 7601,
            session_name: "orrery-session".into(),
            password: None,
            queue_hostship_requests: false,
            max_peers: 16,
        }
    }
}

/// Start the hub server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used to
/// let the OS pick a free port).
pub fn start_hub(config: HubConfig) -> std::io::Result<(HubHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_hub(listener, config, keep_running_clone);
    });

    Ok((
        HubHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main hub loop. Runs until `keep_running` is cleared.
fn run_hub(listener: TcpListener, config: HubConfig, keep_running: Arc<AtomicBool>) {
    let mut session = HubSession::new(
        config.session_name,
        config.password,
        config.queue_hostship_requests,
        config.max_peers,
    );

    let (tx, rx): (Sender<HubEvent>, Receiver<HubEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(HubEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });

    // Main event loop. The timeout only exists to poll keep_running — the
    // hub has no tick cadence of its own; the host peer drives the rhythm.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                handle_event(&mut session, event, &tx, &keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    session.shutdown();
}

/// Dispatch a single event to the session.
fn handle_event(
    session: &mut HubSession,
    event: HubEvent,
    tx: &Sender<HubEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        HubEvent::NewConnection { stream } => {
            handle_new_connection(session, stream, tx, keep_running);
        }
        HubEvent::MessageFrom { peer_id, message } => {
            handle_message(session, peer_id, &message);
        }
        HubEvent::Disconnected { peer_id } => {
            session.remove_peer(peer_id);
        }
    }
}

/// Handle a new TCP connection: read the Authentication handshake, add the
/// peer to the session, and spawn a reader thread. A rejected handshake gets
/// a Disconnection with the reason, then the socket is dropped.
fn handle_new_connection(
    session: &mut HubSession,
    stream: TcpStream,
    tx: &Sender<HubEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    // Set a read timeout so the handshake doesn't block the hub forever.
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let first = match read_message(&mut reader) {
        Ok(msg) => msg,
        Err(e) => {
            log::debug!("dropping connection before handshake: {e}");
            return;
        }
    };

    if first.message_type != MessageType::Authentication {
        log::warn!(
            "dropping connection: expected Authentication first, got {:?}",
            first.message_type
        );
        return;
    }

    let auth = match AuthenticationPayload::decode_payload(&first.payload) {
        Ok(auth) => auth,
        Err(e) => {
            log::warn!("dropping connection: malformed Authentication: {e}");
            return;
        }
    };

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    match session.add_peer(auth, write_stream) {
        Ok(peer_id) => {
            // Clear the handshake timeout for the long-lived reader loop.
            stream.set_read_timeout(None).ok();

            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(reader, peer_id, tx_reader, keep_running_reader);
            });
        }
        Err(reason) => {
            log::info!("rejecting join: {reason}");
            let rejection = DisconnectionPayload { reason }.into_message();
            let mut writer = BufWriter::new(stream);
            let _ = write_message(&mut writer, &rejection);
        }
    }
}

/// Reader loop for a single peer. Runs in its own thread; the only shared
/// state it touches is the event channel.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    peer_id: PeerId,
    tx: Sender<HubEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(message) if message.message_type == MessageType::Disconnection => {
                let _ = tx.send(HubEvent::Disconnected { peer_id });
                break;
            }
            Ok(message) => {
                let _ = tx.send(HubEvent::MessageFrom { peer_id, message });
            }
            Err(e) => {
                // Framing errors and transport loss are equally fatal to
                // this one connection.
                if e.is_connection_lost() {
                    log::info!("peer {peer_id:?} transport lost: {e}");
                } else {
                    log::warn!("peer {peer_id:?} sent an unreadable frame: {e}");
                }
                let _ = tx.send(HubEvent::Disconnected { peer_id });
                break;
            }
        }
    }
}

/// Dispatch a peer message to the session. Authentication was consumed
/// during connection setup and Disconnection in the reader loop.
fn handle_message(session: &mut HubSession, peer_id: PeerId, message: &Message) {
    match message.message_type {
        MessageType::Data => {
            session.handle_data(peer_id, &message.payload, false);
        }
        MessageType::IndependentData => {
            session.handle_data(peer_id, &message.payload, true);
        }
        MessageType::HostshipRequest => {
            session.request_hostship(peer_id);
        }
        MessageType::HostshipResignation => {
            session.resign_hostship(peer_id);
        }
        MessageType::ViewRequest => {
            session.view_request(peer_id);
        }
        MessageType::ViewResignation => {
            session.view_resignation(peer_id);
        }
        MessageType::IndependentSessionOn => {
            session.set_independent_session(peer_id, true);
        }
        MessageType::IndependentSessionOff => {
            session.set_independent_session(peer_id, false);
        }
        MessageType::Authentication
        | MessageType::ConnectionStatus
        | MessageType::ViewStatus
        | MessageType::NConnections
        | MessageType::Disconnection => {
            log::debug!(
                "ignoring {:?} from {peer_id:?} (not a peer-originated type here)",
                message.message_type
            );
        }
    }
}
