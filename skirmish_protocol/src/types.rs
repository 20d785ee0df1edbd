// Connection-scoped ID types for the session protocol.
//
// A `PeerId` identifies one TCP connection for the lifetime of that
// connection — it is assigned by the host on accept and never reused within
// a session. It is distinct from `skirmish_core::types::PlayerId`, which is
// the persistent identity inside the replicated state: the host maintains
// the peer-to-player mapping and it never crosses the wire.

use serde::{Deserialize, Serialize};

/// Host-assigned connection ID (compact u32, not a state-level id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

/// Bumped whenever the wire format changes incompatibly. Hosts reject
/// clients with a different version at the handshake.
pub const PROTOCOL_VERSION: u32 = 1;
