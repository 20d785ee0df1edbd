// Protocol messages for client-host communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientRequest`: sent by game clients to the session host.
// - `HostMessage`: sent by the session host to game clients.
//
// Unlike an opaque command relay, this protocol is fully typed: sync
// messages carry whole `skirmish_core` state slices (session state, game
// data, combat sessions, player roster, chat). Clients treat every sync as
// a wholesale replacement of the named slice — messages are idempotent, so
// the host may rebroadcast the current state at any time to converge peers
// that missed an update.
//
// All types derive `Serialize`/`Deserialize` for JSON framing (see
// `framing.rs`).

use serde::{Deserialize, Serialize};
use skirmish_core::combat::{CombatSession, Reaction};
use skirmish_core::data::GameData;
use skirmish_core::state::{ChatEntry, CombatEntity, PlayerProfile, SessionState};
use skirmish_core::types::{EntityId, LocationId, PlayerId, Position, StatId, TeamId};

use crate::types::PeerId;

/// Requests sent by a client to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Join a session (handshake).
    JoinSession {
        protocol_version: u32,
        player_name: String,
        /// Hash of the client's cached `GameData`, if any. A matching hash
        /// lets the host skip the initial `SyncGameData`.
        data_hash: Option<u64>,
    },
    /// Use a stat against a target in an active combat session.
    RequestAction {
        location: LocationId,
        source: EntityId,
        target: EntityId,
        stat: StatId,
    },
    /// Respond to a pending action (dodge/defend/counter/cover/flee/skip).
    RequestSubAction {
        location: LocationId,
        actor: EntityId,
        reaction: Reaction,
    },
    /// Report the predicted position of the client's own entity.
    RequestMoveEntity { entity: EntityId, position: Position },
    /// Replace an entity's record wholesale (host-player editing).
    RequestEntityUpdate { entity: CombatEntity },
    /// Spawn a fresh entity with scenario-default stats.
    RequestAddEntity {
        name: String,
        team: TeamId,
        location: LocationId,
    },
    /// Chat line.
    RequestChat { text: String },
    /// Flip an entity's hidden flag.
    RequestToggleVisibility { entity: EntityId },
    /// Graceful disconnect.
    Leave,
}

/// Messages sent by the host to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostMessage {
    /// Handshake accepted.
    Welcome {
        peer_id: PeerId,
        player_id: PlayerId,
        session_name: String,
    },
    /// Handshake rejected.
    Rejected { reason: String },
    /// Wholesale replacement of the session state snapshot.
    SyncState { state: SessionState },
    /// Wholesale replacement of the scenario rules and stat definitions.
    SyncGameData { data: GameData },
    /// Replacement of one location's combat session (`None` clears it).
    SyncCombatState {
        location: LocationId,
        session: Option<CombatSession>,
    },
    /// Replacement of the player roster.
    SyncPlayers { players: Vec<PlayerProfile> },
    /// Replacement of the chat log.
    SyncChat { chat: Vec<ChatEntry> },
    /// Authoritative position for one entity (movement fast path).
    OnMoveEntity { entity: EntityId, position: Position },
    /// Host operator broadcast, rendered outside chat.
    AdminAnnouncement { text: String },
    /// Switch every client's active map.
    ChangeMap { location: LocationId },
    /// A combat request was refused; no state changed.
    ActionRejected { reason: String },
    /// A player disconnected.
    PlayerLeft { player_id: PlayerId, name: String },
}
