// Test-only peer for session integration tests.
//
// Wraps the real `NetClient` and `ClientMirror` (from `skirmish_net`) to
// provide a synchronous, test-friendly API for exercising the full
// replication pipeline: host → join → request → sync → identical mirrors.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `NetClient::poll()`). All networking and
// replication logic uses the same code paths as a real client.
//
// See also: `tests/session_pipeline.rs` for the integration scenarios.

use std::thread;
use std::time::{Duration, Instant};

use skirmish_core::types::PlayerId;
use skirmish_net::client::NetClient;
use skirmish_net::mirror::ClientMirror;
use skirmish_protocol::message::ClientRequest;
use skirmish_protocol::types::PeerId;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A test peer wrapping a real NetClient and ClientMirror.
pub struct TestPeer {
    client: NetClient,
    pub mirror: ClientMirror,
    pub peer_id: PeerId,
    pub player_id: PlayerId,
}

impl TestPeer {
    /// Connect to a session host and perform the JoinSession handshake.
    pub fn connect(addr: std::net::SocketAddr, name: &str) -> Self {
        let addr_str = addr.to_string();
        let (client, info) =
            NetClient::connect(&addr_str, name, None).expect("TestPeer::connect failed");
        Self {
            client,
            mirror: ClientMirror::new(),
            peer_id: info.peer_id,
            player_id: info.player_id,
        }
    }

    /// Send a request to the host.
    pub fn send(&mut self, request: &ClientRequest) {
        self.client.send(request).expect("send failed");
    }

    /// Drain pending host messages into the mirror. Returns how many were
    /// applied.
    pub fn pump(&mut self) -> usize {
        let messages = self.client.poll();
        let count = messages.len();
        for msg in messages {
            self.mirror.apply(msg);
        }
        count
    }

    /// Blocking poll until the mirror satisfies `pred`, pumping host
    /// messages as they arrive. Panics with `what` on timeout.
    pub fn wait_until(&mut self, what: &str, pred: impl Fn(&ClientMirror) -> bool) {
        let start = Instant::now();
        loop {
            self.pump();
            if pred(&self.mirror) {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {what}"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Send Leave and close the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}
