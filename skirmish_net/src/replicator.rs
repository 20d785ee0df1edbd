// Request validation and state replication.
//
// `Replicator` is the host's brain: it owns the authoritative
// `SessionState`, the scenario `GameData`, the session rng, and the
// peer-to-player mapping. Every client request flows through `apply`, which
// validates it, mutates the state, and returns the sync messages to put on
// the wire. The struct itself never touches a socket — `host.rs` owns the
// TCP writers and dispatches the returned `Outgoing` values. That split
// keeps the entire replication policy testable without networking.
//
// Replication policy: sync messages replace whole state slices and are
// idempotent, so correctness never depends on any one message arriving.
// `resync()` rebroadcasts the full snapshot on a timer (anti-entropy); a
// peer that missed an update converges on the next interval.
//
// Failure policy, mirroring `skirmish_core::error`:
// - silent errors (stale references, vanished combat) produce no output;
// - everything else produces an `ActionRejected` for the requesting peer
//   only, with no state change and no turn consumed.

use skirmish_core::combat::{self, Reaction};
use skirmish_core::data::GameData;
use skirmish_core::prng::GameRng;
use skirmish_core::state::{ChatEntry, CombatEntity, PlayerProfile, SessionState};
use skirmish_core::types::{EntityId, LocationId, PlayerId, Position, StatId, TeamId};
use skirmish_protocol::message::{ClientRequest, HostMessage};
use skirmish_protocol::types::{PROTOCOL_VERSION, PeerId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where an outgoing message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dest {
    Broadcast,
    To(PeerId),
}

/// A message the host should put on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub dest: Dest,
    pub message: HostMessage,
}

impl Outgoing {
    fn broadcast(message: HostMessage) -> Self {
        Self {
            dest: Dest::Broadcast,
            message,
        }
    }

    fn to(peer: PeerId, message: HostMessage) -> Self {
        Self {
            dest: Dest::To(peer),
            message,
        }
    }
}

/// The host-side replication core. Single-threaded; driven by `host.rs`.
pub struct Replicator {
    pub state: SessionState,
    pub data: GameData,
    rng: GameRng,
    session_name: String,
    max_peers: usize,
    peers: BTreeMap<PeerId, PlayerId>,
    next_peer_id: u32,
}

impl Replicator {
    pub fn new(
        session_name: impl Into<String>,
        data: GameData,
        state: SessionState,
        seed: u64,
        max_peers: usize,
    ) -> Self {
        Self {
            state,
            data,
            rng: GameRng::new(seed),
            session_name: session_name.into(),
            max_peers,
            peers: BTreeMap::new(),
            next_peer_id: 0,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Handle a `JoinSession` handshake. On success the new peer gets a
    /// `Welcome`, the game data (unless its cached hash matches) and the
    /// full state; everyone gets the updated roster.
    pub fn connect_peer(
        &mut self,
        protocol_version: u32,
        player_name: String,
        data_hash: Option<u64>,
    ) -> Result<(PeerId, Vec<Outgoing>), String> {
        if protocol_version != PROTOCOL_VERSION {
            return Err("protocol version mismatch".into());
        }
        if self.peers.len() >= self.max_peers {
            return Err("session is full".into());
        }

        let peer = PeerId(self.next_peer_id);
        self.next_peer_id += 1;
        let player = PlayerId::new(&mut self.rng);
        self.peers.insert(peer, player);
        self.state.players.insert(
            player,
            PlayerProfile {
                id: player,
                name: player_name.clone(),
                entity: None,
            },
        );
        info!(peer = peer.0, player = %player_name, "peer joined");

        let mut out = vec![Outgoing::to(
            peer,
            HostMessage::Welcome {
                peer_id: peer,
                player_id: player,
                session_name: self.session_name.clone(),
            },
        )];
        if data_hash != Some(self.data.data_hash()) {
            out.push(Outgoing::to(
                peer,
                HostMessage::SyncGameData {
                    data: self.data.clone(),
                },
            ));
        }
        out.push(Outgoing::to(
            peer,
            HostMessage::SyncState {
                state: self.state.clone(),
            },
        ));
        out.push(self.sync_players());
        Ok((peer, out))
    }

    /// Handle a peer disconnect (graceful or broken pipe).
    pub fn disconnect_peer(&mut self, peer: PeerId) -> Vec<Outgoing> {
        let Some(player) = self.peers.remove(&peer) else {
            return Vec::new();
        };
        let Some(profile) = self.state.players.remove(&player) else {
            return Vec::new();
        };
        info!(peer = peer.0, player = %profile.name, "peer left");
        vec![
            Outgoing::broadcast(HostMessage::PlayerLeft {
                player_id: player,
                name: profile.name,
            }),
            self.sync_players(),
        ]
    }

    /// Validate and apply one client request.
    pub fn apply(&mut self, peer: PeerId, request: ClientRequest) -> Vec<Outgoing> {
        debug!(peer = peer.0, ?request, "applying request");
        match request {
            ClientRequest::RequestChat { text } => self.chat(peer, text),
            ClientRequest::RequestMoveEntity { entity, position } => {
                self.move_entity(entity, position)
            }
            ClientRequest::RequestEntityUpdate { entity } => self.update_entity(entity),
            ClientRequest::RequestAddEntity {
                name,
                team,
                location,
            } => self.add_entity(peer, name, team, location),
            ClientRequest::RequestToggleVisibility { entity } => self.toggle_visibility(entity),
            ClientRequest::RequestAction {
                location,
                source,
                target,
                stat,
            } => self.action(peer, &location, source, target, &stat),
            ClientRequest::RequestSubAction {
                location,
                actor,
                reaction,
            } => self.sub_action(peer, &location, actor, reaction),
            // Handshake and disconnect are transport-level; the host routes
            // them to connect_peer/disconnect_peer before reaching here.
            ClientRequest::JoinSession { .. } | ClientRequest::Leave => Vec::new(),
        }
    }

    /// Periodic anti-entropy rebroadcast: the full snapshot converges every
    /// slice at once (entities, players, chat, combat, maps).
    pub fn resync(&self) -> Vec<Outgoing> {
        vec![Outgoing::broadcast(HostMessage::SyncState {
            state: self.state.clone(),
        })]
    }

    // -- operator controls (host process only, never from the wire) --------

    pub fn announce(&self, text: String) -> Vec<Outgoing> {
        vec![Outgoing::broadcast(HostMessage::AdminAnnouncement { text })]
    }

    pub fn change_map(&mut self, location: LocationId) -> Vec<Outgoing> {
        if !self.state.maps.contains_key(&location) {
            return Vec::new();
        }
        self.state.active_map = Some(location.clone());
        vec![
            Outgoing::broadcast(HostMessage::ChangeMap { location }),
            self.sync_state(),
        ]
    }

    pub fn toggle_combat(&mut self, location: LocationId) -> Vec<Outgoing> {
        combat::toggle_combat(&mut self.state, &self.data, &mut self.rng, &location);
        vec![self.sync_combat(&location), self.sync_state()]
    }

    // -- request handlers --------------------------------------------------

    fn chat(&mut self, peer: PeerId, text: String) -> Vec<Outgoing> {
        let author = self
            .peers
            .get(&peer)
            .and_then(|p| self.state.players.get(p))
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.state.chat.push(ChatEntry { author, text });
        vec![Outgoing::broadcast(HostMessage::SyncChat {
            chat: self.state.chat.clone(),
        })]
    }

    fn move_entity(&mut self, entity: EntityId, position: Position) -> Vec<Outgoing> {
        // Stale entity: silent no-op.
        let Some(e) = self.state.entities.get_mut(&entity) else {
            return Vec::new();
        };
        e.position = position;
        // Fast path: only the position crosses the wire, not the snapshot.
        vec![Outgoing::broadcast(HostMessage::OnMoveEntity {
            entity,
            position,
        })]
    }

    fn update_entity(&mut self, entity: CombatEntity) -> Vec<Outgoing> {
        self.state.entities.insert(entity.id, entity);
        vec![self.sync_state()]
    }

    fn add_entity(
        &mut self,
        peer: PeerId,
        name: String,
        team: TeamId,
        location: LocationId,
    ) -> Vec<Outgoing> {
        let entity =
            CombatEntity::with_defaults(&mut self.rng, &self.data, name, team, location);
        let id = entity.id;
        self.state.entities.insert(id, entity);
        // A player without an entity adopts the one they spawn.
        if let Some(profile) = self
            .peers
            .get(&peer)
            .and_then(|p| self.state.players.get_mut(p))
            && profile.entity.is_none()
        {
            profile.entity = Some(id);
        }
        vec![self.sync_state()]
    }

    fn toggle_visibility(&mut self, entity: EntityId) -> Vec<Outgoing> {
        let Some(e) = self.state.entities.get_mut(&entity) else {
            return Vec::new();
        };
        e.hidden = !e.hidden;
        vec![self.sync_state()]
    }

    fn action(
        &mut self,
        peer: PeerId,
        location: &LocationId,
        source: EntityId,
        target: EntityId,
        stat: &StatId,
    ) -> Vec<Outgoing> {
        let result = combat::act(
            &mut self.state,
            &self.data,
            &mut self.rng,
            location,
            source,
            target,
            stat,
        );
        self.combat_result(peer, location, result)
    }

    fn sub_action(
        &mut self,
        peer: PeerId,
        location: &LocationId,
        actor: EntityId,
        reaction: Reaction,
    ) -> Vec<Outgoing> {
        let result = combat::react(
            &mut self.state,
            &self.data,
            &mut self.rng,
            location,
            actor,
            reaction,
        );
        self.combat_result(peer, location, result)
    }

    fn combat_result(
        &mut self,
        peer: PeerId,
        location: &LocationId,
        result: Result<(), skirmish_core::error::CoreError>,
    ) -> Vec<Outgoing> {
        match result {
            Ok(()) => vec![self.sync_combat(location), self.sync_state()],
            Err(e) if e.is_silent() => Vec::new(),
            Err(e) => vec![Outgoing::to(
                peer,
                HostMessage::ActionRejected {
                    reason: e.to_string(),
                },
            )],
        }
    }

    // -- sync message builders ---------------------------------------------

    fn sync_state(&self) -> Outgoing {
        Outgoing::broadcast(HostMessage::SyncState {
            state: self.state.clone(),
        })
    }

    fn sync_combat(&self, location: &LocationId) -> Outgoing {
        Outgoing::broadcast(HostMessage::SyncCombatState {
            location: location.clone(),
            session: self.state.combat.get(location).cloned(),
        })
    }

    fn sync_players(&self) -> Outgoing {
        Outgoing::broadcast(HostMessage::SyncPlayers {
            players: self.state.players.values().cloned().collect(),
        })
    }
}
