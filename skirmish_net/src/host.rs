// TCP server and main event loop for the session host.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `framing::recv_message()` in a
//   loop and send `InternalEvent::RequestFrom` to the main thread. On
//   error/EOF or a `Leave` request, send `InternalEvent::Disconnected`.
// - **Main thread**: owns the `Replicator` and all client write halves,
//   receives events from the channel, and dispatches them. Uses
//   `recv_timeout` with the sync interval as the timeout — when it fires
//   (no requests waiting), the full snapshot is rebroadcast (anti-entropy).
//   This gives us a convergence timer without a separate timer thread.
//
// The main thread is the only writer to client TCP streams. Reader threads
// only read. This avoids concurrent read/write on the same `TcpStream`,
// which is safe on most platforms but fragile.
//
// Operator controls (announcements, map changes, combat toggles) arrive on
// the same channel as `InternalEvent::Control`, injected through the
// `HostHandle` — everything still funnels through the one event loop.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `HostHandle::stop`) and breaks out of the event loop.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use skirmish_core::data::GameData;
use skirmish_core::state::SessionState;
use skirmish_core::types::LocationId;
use skirmish_protocol::framing::{recv_message, send_message};
use skirmish_protocol::message::{ClientRequest, HostMessage};
use skirmish_protocol::types::PeerId;
use tracing::{info, warn};

use crate::replicator::{Dest, Outgoing, Replicator};

/// Events sent from listener/reader threads (and the handle) to the main
/// thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    RequestFrom {
        peer_id: PeerId,
        request: ClientRequest,
    },
    Disconnected {
        peer_id: PeerId,
    },
    Control(HostCommand),
}

/// Operator controls available to the host process. These never arrive
/// from the wire.
#[derive(Clone, Debug)]
pub enum HostCommand {
    Announce(String),
    ChangeMap(LocationId),
    ToggleCombat(LocationId),
}

/// Handle returned by `start_host` to control the running server.
pub struct HostHandle {
    keep_running: Arc<AtomicBool>,
    control: Sender<InternalEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl HostHandle {
    /// Inject an operator command into the event loop.
    pub fn command(&self, command: HostCommand) {
        let _ = self.control.send(InternalEvent::Control(command));
    }

    /// Signal the host to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a session host.
pub struct HostConfig {
    pub port: u16,
    pub session_name: String,
    pub max_peers: usize,
    /// Anti-entropy rebroadcast interval.
    pub sync_interval_ms: u64,
    pub seed: u64,
    pub data: GameData,
    pub state: SessionState,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            session_name: "skirmish-session".into(),
            max_peers: 8,
            sync_interval_ms: 1000,
            seed: 0,
            data: GameData::demo(),
            state: SessionState::default(),
        }
    }
}

/// Start the session host on a background thread. Returns a handle for
/// controlling it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_host(config: HostConfig) -> std::io::Result<(HostHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    info!(%addr, session = %config.session_name, "host listening");
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();
    let (tx, rx) = mpsc::channel();
    let control = tx.clone();

    let thread = thread::spawn(move || {
        run_host(listener, config, keep_running_clone, tx, rx);
    });

    Ok((
        HostHandle {
            keep_running,
            control,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main host loop. Runs until `keep_running` is set to false.
fn run_host(
    listener: TcpListener,
    config: HostConfig,
    keep_running: Arc<AtomicBool>,
    tx: Sender<InternalEvent>,
    rx: Receiver<InternalEvent>,
) {
    let mut replicator = Replicator::new(
        config.session_name,
        config.data,
        config.state,
        config.seed,
        config.max_peers,
    );
    let mut writers: BTreeMap<PeerId, BufWriter<TcpStream>> = BTreeMap::new();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => break,
            }
        }
    });

    let sync_interval = Duration::from_millis(config.sync_interval_ms);

    // Main event loop.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(sync_interval) {
            Ok(event) => {
                handle_event(&mut replicator, &mut writers, event, &tx, &keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut replicator, &mut writers, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Sync timer fired — rebroadcast even if nothing changed.
                if !writers.is_empty() {
                    dispatch(&mut writers, replicator.resync());
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Dispatch a single event.
fn handle_event(
    replicator: &mut Replicator,
    writers: &mut BTreeMap<PeerId, BufWriter<TcpStream>>,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(replicator, writers, stream, tx, keep_running);
        }
        InternalEvent::RequestFrom { peer_id, request } => {
            let out = replicator.apply(peer_id, request);
            dispatch(writers, out);
        }
        InternalEvent::Disconnected { peer_id } => {
            writers.remove(&peer_id);
            let out = replicator.disconnect_peer(peer_id);
            dispatch(writers, out);
        }
        InternalEvent::Control(command) => {
            let out = match command {
                HostCommand::Announce(text) => replicator.announce(text),
                HostCommand::ChangeMap(location) => replicator.change_map(location),
                HostCommand::ToggleCombat(location) => replicator.toggle_combat(location),
            };
            dispatch(writers, out);
        }
    }
}

/// Handle a new TCP connection: read the JoinSession handshake, register the
/// peer with the replicator, and spawn a reader thread.
fn handle_new_connection(
    replicator: &mut Replicator,
    writers: &mut BTreeMap<PeerId, BufWriter<TcpStream>>,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    // The handshake read runs on the dispatch thread, so a slow client can
    // stall request handling and the anti-entropy timer for up to this
    // timeout. Bounded and accepted; everything after the handshake moves
    // to the per-peer reader thread.
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });

    let join: ClientRequest = match recv_message(&mut reader) {
        Ok(msg) => msg,
        Err(_) => return,
    };

    let ClientRequest::JoinSession {
        protocol_version,
        player_name,
        data_hash,
    } = join
    else {
        // Expected JoinSession as first message — drop the connection.
        return;
    };

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };

    match replicator.connect_peer(protocol_version, player_name, data_hash) {
        Ok((peer_id, out)) => {
            writers.insert(peer_id, BufWriter::new(write_stream));
            dispatch(writers, out);

            // Clear read timeout for the long-lived reader loop.
            stream.set_read_timeout(None).ok();

            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(reader, peer_id, tx_reader, keep_running_reader);
            });
        }
        Err(reason) => {
            // Send Rejected and close the connection.
            let mut writer = BufWriter::new(write_stream);
            let _ = send_message(&mut writer, &HostMessage::Rejected { reason });
        }
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    peer_id: PeerId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match recv_message::<_, ClientRequest>(&mut reader) {
            Ok(ClientRequest::Leave) => {
                let _ = tx.send(InternalEvent::Disconnected { peer_id });
                break;
            }
            Ok(request) => {
                let _ = tx.send(InternalEvent::RequestFrom { peer_id, request });
            }
            Err(_) => {
                // Read error, EOF, or malformed message — disconnect.
                let _ = tx.send(InternalEvent::Disconnected { peer_id });
                break;
            }
        }
    }
}

/// Write outgoing messages to the relevant client streams. Write errors on
/// a single client are logged but do not crash the host — the reader thread
/// for that client will detect the broken pipe and send a `Disconnected`
/// event.
fn dispatch(writers: &mut BTreeMap<PeerId, BufWriter<TcpStream>>, out: Vec<Outgoing>) {
    for outgoing in out {
        match outgoing.dest {
            Dest::Broadcast => {
                for (peer, writer) in writers.iter_mut() {
                    if let Err(e) = send_message(writer, &outgoing.message) {
                        warn!(peer = peer.0, error = %e, "write failed");
                    }
                }
            }
            Dest::To(peer) => {
                if let Some(writer) = writers.get_mut(&peer)
                    && let Err(e) = send_message(writer, &outgoing.message)
                {
                    warn!(peer = peer.0, error = %e, "write failed");
                }
            }
        }
    }
}
