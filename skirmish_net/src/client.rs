// TCP client for connecting to a session host.
//
// Provides a non-blocking interface for the driving thread (a game loop or
// a test harness) to communicate with the host. Architecture:
// - `connect()` performs TCP connect + JoinSession handshake on the calling
//   thread, then spawns a background reader thread.
// - The reader thread calls `recv_message()` in a loop and pushes each
//   `HostMessage` into an `mpsc` channel.
// - The calling thread holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// This separation ensures the driving thread never blocks on network I/O.
// The reader thread handles the blocking reads, and the writer flushes
// synchronously (acceptable for the small messages we send).
//
// The client does not interpret host messages — feed them to a
// `mirror::ClientMirror` to maintain a local replica of the session.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use skirmish_protocol::framing::{recv_message, send_message};
use skirmish_protocol::message::{ClientRequest, HostMessage};
use skirmish_protocol::types::{PROTOCOL_VERSION, PeerId};
use skirmish_core::types::PlayerId;
use tracing::debug;

/// Information returned by a successful `connect()` handshake.
pub struct WelcomeInfo {
    pub peer_id: PeerId,
    pub player_id: PlayerId,
    pub session_name: String,
}

/// TCP client for host communication.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<HostMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    pub peer_id: PeerId,
}

impl NetClient {
    /// Connect to a session host, perform the JoinSession handshake, and
    /// spawn a reader thread. `data_hash` is the hash of locally cached game
    /// data, letting the host skip the initial `SyncGameData`.
    pub fn connect(
        addr: &str,
        player_name: &str,
        data_hash: Option<u64>,
    ) -> Result<(Self, WelcomeInfo), String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect failed: {e}"))?;

        // Set a read timeout for the handshake.
        stream
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .ok();

        let reader_stream = stream
            .try_clone()
            .map_err(|e| format!("clone failed: {e}"))?;
        let mut writer = BufWriter::new(stream);

        let join = ClientRequest::JoinSession {
            protocol_version: PROTOCOL_VERSION,
            player_name: player_name.into(),
            data_hash,
        };
        send_message(&mut writer, &join).map_err(|e| format!("send JoinSession failed: {e}"))?;

        // Read Welcome or Rejected.
        let mut reader = BufReader::new(reader_stream);
        let response: HostMessage =
            recv_message(&mut reader).map_err(|e| format!("read Welcome failed: {e}"))?;

        let welcome_info = match response {
            HostMessage::Welcome {
                peer_id,
                player_id,
                session_name,
            } => WelcomeInfo {
                peer_id,
                player_id,
                session_name,
            },
            HostMessage::Rejected { reason } => {
                return Err(format!("rejected: {reason}"));
            }
            other => {
                return Err(format!("unexpected response: {other:?}"));
            }
        };
        debug!(peer = welcome_info.peer_id.0, "joined session");

        // Clear read timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        // Spawn reader thread.
        let (tx, rx) = mpsc::channel();
        let peer_id = welcome_info.peer_id;
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
                peer_id,
            },
            welcome_info,
        ))
    }

    /// Send any request to the host.
    pub fn send(&mut self, request: &ClientRequest) -> Result<(), String> {
        send_message(&mut self.writer, request).map_err(|e| format!("send failed: {e}"))
    }

    /// Send Leave and close the connection.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientRequest::Leave);
    }

    /// Drain all queued host messages (non-blocking).
    pub fn poll(&self) -> Vec<HostMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<HostMessage>) {
    while let Ok(msg) = recv_message::<_, HostMessage>(&mut reader) {
        if tx.send(msg).is_err() {
            break; // Driving thread dropped the receiver
        }
    }
}
