// Client-side session replica.
//
// `ClientMirror` consumes `HostMessage`s (from `NetClient::poll`) and
// maintains a read-only copy of the session. Sync messages replace whole
// slices of the replica — applying the same message twice is a no-op, which
// is what makes the host's periodic rebroadcast safe.
//
// Presentation smoothing lives here too:
// - The locally controlled entity runs client-side prediction
//   (`movement::Predictor`): input moves it eagerly every tick, reports go
//   to the host at a throttled rate, and the authoritative `OnMoveEntity`
//   echo overwrites whatever was predicted.
// - Remote entities never move directly from network updates; each has a
//   `movement::Interpolator` that eases the rendered position toward the
//   latest authoritative one. Whole-state syncs retarget the interpolators
//   rather than snapping, so anti-entropy traffic doesn't cause visible
//   stutter.

use skirmish_core::data::GameData;
use skirmish_core::movement::{Interpolator, Predictor};
use skirmish_core::state::SessionState;
use skirmish_core::types::{EntityId, Position};
use skirmish_protocol::message::{ClientRequest, HostMessage};
use std::collections::BTreeMap;

struct LocalEntity {
    id: EntityId,
    predictor: Predictor,
}

/// Read-only replica of the session, plus rendering state.
#[derive(Default)]
pub struct ClientMirror {
    pub state: SessionState,
    pub data: GameData,
    /// Operator broadcasts, in arrival order. Rendered outside chat.
    pub announcements: Vec<String>,
    /// Reasons for refused combat requests, in arrival order.
    pub rejections: Vec<String>,
    local: Option<LocalEntity>,
    interpolators: BTreeMap<EntityId, Interpolator>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start predicting movement for the given entity (the one this client
    /// controls). The predictor seeds from the replica's current position.
    pub fn bind_local(&mut self, id: EntityId) {
        let position = self
            .state
            .entities
            .get(&id)
            .map(|e| e.position)
            .unwrap_or_default();
        self.interpolators.remove(&id);
        self.local = Some(LocalEntity {
            id,
            predictor: Predictor::new(position),
        });
    }

    pub fn local_entity(&self) -> Option<EntityId> {
        self.local.as_ref().map(|l| l.id)
    }

    /// Apply one host message to the replica.
    pub fn apply(&mut self, msg: HostMessage) {
        match msg {
            HostMessage::SyncState { state } => {
                self.state = state;
                self.reconcile_render_state();
            }
            HostMessage::SyncGameData { data } => {
                self.data = data;
            }
            HostMessage::SyncCombatState { location, session } => match session {
                Some(s) => {
                    self.state.combat.insert(location, s);
                }
                None => {
                    self.state.combat.remove(&location);
                }
            },
            HostMessage::SyncPlayers { players } => {
                self.state.players = players.into_iter().map(|p| (p.id, p)).collect();
            }
            HostMessage::SyncChat { chat } => {
                self.state.chat = chat;
            }
            HostMessage::OnMoveEntity { entity, position } => {
                if let Some(e) = self.state.entities.get_mut(&entity) {
                    e.position = position;
                }
                match &mut self.local {
                    // The echo for our own entity overwrites the prediction.
                    Some(local) if local.id == entity => {
                        local.predictor.accept_authoritative(position);
                    }
                    _ => {
                        self.interpolators
                            .entry(entity)
                            .or_insert_with(|| Interpolator::new(position))
                            .retarget(position);
                    }
                }
            }
            HostMessage::ChangeMap { location } => {
                self.state.active_map = Some(location);
            }
            HostMessage::AdminAnnouncement { text } => {
                self.announcements.push(text);
            }
            HostMessage::ActionRejected { reason } => {
                self.rejections.push(reason);
            }
            HostMessage::PlayerLeft { player_id, .. } => {
                self.state.players.remove(&player_id);
            }
            // Handshake responses are consumed by NetClient::connect.
            HostMessage::Welcome { .. } | HostMessage::Rejected { .. } => {}
        }
    }

    /// Advance local prediction by one tick and return the position report
    /// to send, if one is due (throttled to the report interval).
    pub fn tick_local(
        &mut self,
        input: (f32, f32),
        speed: f32,
        dt: f32,
        now_ms: u64,
    ) -> Option<ClientRequest> {
        let local = self.local.as_mut()?;
        let map = self
            .state
            .active_map
            .as_ref()
            .and_then(|id| self.state.maps.get(id))?;
        local.predictor.tick(input, speed, dt, map);
        let position = local.predictor.take_report(now_ms)?;
        Some(ClientRequest::RequestMoveEntity {
            entity: local.id,
            position,
        })
    }

    /// Advance every remote interpolator by one tick.
    pub fn tick_render(&mut self) {
        for interp in self.interpolators.values_mut() {
            interp.tick();
        }
    }

    /// Position to draw an entity at: predicted for the local entity,
    /// interpolated for remotes, raw replica position otherwise.
    pub fn render_position(&self, id: EntityId) -> Option<Position> {
        if let Some(local) = &self.local
            && local.id == id
        {
            return Some(local.predictor.position);
        }
        if let Some(interp) = self.interpolators.get(&id) {
            return Some(interp.current);
        }
        self.state.entities.get(&id).map(|e| e.position)
    }

    /// After a whole-state sync: retarget remote interpolators toward the
    /// new authoritative positions and drop render state for entities that
    /// no longer exist.
    fn reconcile_render_state(&mut self) {
        self.interpolators
            .retain(|id, _| self.state.entities.contains_key(id));
        let local_id = self.local.as_ref().map(|l| l.id);
        for (id, entity) in &self.state.entities {
            if Some(*id) == local_id {
                continue;
            }
            self.interpolators
                .entry(*id)
                .or_insert_with(|| Interpolator::new(entity.position))
                .retarget(entity.position);
        }
        if let Some(id) = local_id
            && !self.state.entities.contains_key(&id)
        {
            self.local = None;
        }
    }
}
