// skirmish_net — session host and client networking.
//
// This crate carries everything that touches a socket: the host's TCP
// server, the client connector, and the two state-keeping layers on either
// side of the wire. Game logic stays in `skirmish_core`; message shapes and
// framing in `skirmish_protocol`.
//
// Module overview:
// - `replicator.rs`: The host's replication core — validates client
//                    requests against the authoritative state and produces
//                    the sync messages to send. Pure (no I/O), so the whole
//                    replication policy is unit-testable.
// - `host.rs`:       TCP listener, reader threads (one per client), and the
//                    main event loop. `std::net` with a thread-per-reader
//                    architecture and an `mpsc` channel funneling events
//                    into the single-threaded `Replicator`. The sync timer
//                    doubles as the anti-entropy rebroadcast.
// - `client.rs`:     Blocking connect + handshake, then a reader thread and
//                    a non-blocking `poll()` inbox.
// - `mirror.rs`:     Client-side replica: applies sync messages, runs local
//                    movement prediction and remote interpolation.
//
// The host can run as a standalone binary (`main.rs`, `skirmish-host`) or
// be embedded in another process via `start_host`.

pub mod client;
pub mod host;
pub mod mirror;
pub mod replicator;

pub use host::{HostCommand, HostConfig, HostHandle, start_host};
