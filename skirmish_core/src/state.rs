// Canonical session state.
//
// `SessionState` is the single authoritative snapshot of a running session:
// map definitions, combat entities, player profiles, the chat log, global
// variables, and any active combat sessions. The host owns the only mutable
// copy; clients hold read-only mirrors that are replaced wholesale on every
// sync message (see `skirmish_net::mirror`), which is why every field here
// is a plain serializable value with no interior references.
//
// Mutation rules: only the replication layer (on behalf of validated client
// requests) and the combat engine touch this struct. Entities are mutated
// exclusively through action/turn resolution in `combat.rs` once a battle is
// running.
//
// **Critical constraint: determinism.** Collections are `BTreeMap`/`BTreeSet`
// so that serialization and iteration order are stable — a prerequisite for
// byte-identical sync payloads and reproducible victory relocation.

use crate::combat::CombatSession;
use crate::data::GameData;
use crate::prng::GameRng;
use crate::roll;
use crate::types::{EntityId, LocationId, PlayerId, Position, StatId, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// An axis-aligned solid rectangle on a map. Movement cannot pass through it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapObject {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl MapObject {
    /// Whether the given point lies inside this rectangle.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.x
            && pos.x < self.x + self.width
            && pos.y >= self.y
            && pos.y < self.y + self.height
    }
}

/// A map/location definition: bounds, solid objects, and faction ownership.
///
/// Ownership changes hands when a combat session at this location concludes
/// with a winner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapDef {
    pub id: LocationId,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub objects: Vec<MapObject>,
    #[serde(default)]
    pub owner: Option<TeamId>,
}

impl MapDef {
    pub fn open(id: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            id: LocationId::new(id),
            width,
            height,
            objects: Vec::new(),
            owner: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities and players
// ---------------------------------------------------------------------------

/// A character or NPC participating in the session.
///
/// Current hit points are the value of the rules' death stat; its maximum
/// comes from the corresponding `StatDef`. An entity is defeated exactly
/// when its death-stat value is <= 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombatEntity {
    pub id: EntityId,
    pub name: String,
    pub team: TeamId,
    pub location: LocationId,
    pub position: Position,
    pub stats: BTreeMap<StatId, i64>,
    #[serde(default)]
    pub hidden: bool,
}

impl CombatEntity {
    /// Create an entity with every stat at its scenario default, lookup-mode
    /// transforms applied.
    pub fn with_defaults(
        rng: &mut GameRng,
        data: &GameData,
        name: impl Into<String>,
        team: TeamId,
        location: LocationId,
    ) -> Self {
        let mut stats = BTreeMap::new();
        for def in &data.stats {
            stats.insert(def.id.clone(), roll::apply_lookup(def.default, def));
        }
        Self {
            id: EntityId::new(rng),
            name: name.into(),
            team,
            location,
            position: Position::default(),
            stats,
            hidden: false,
        }
    }

    /// Current value of a stat, 0 when the entity does not carry it.
    pub fn stat(&self, id: &StatId) -> i64 {
        self.stats.get(id).copied().unwrap_or(0)
    }

    /// Whether the entity is alive under the given death stat.
    pub fn alive(&self, death_stat: &StatId) -> bool {
        self.stat(death_stat) > 0
    }
}

/// A connected player's public profile, optionally bound to the entity they
/// control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub entity: Option<EntityId>,
}

/// One line of session chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub author: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// The canonical snapshot. Owned exclusively by the host; mirrored read-only
/// by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub maps: BTreeMap<LocationId, MapDef>,
    pub active_map: Option<LocationId>,
    pub entities: BTreeMap<EntityId, CombatEntity>,
    pub players: BTreeMap<PlayerId, PlayerProfile>,
    pub chat: Vec<ChatEntry>,
    pub globals: BTreeMap<String, String>,
    /// Active combat sessions, at most one per location key.
    pub combat: BTreeMap<LocationId, CombatSession>,
}

impl SessionState {
    /// Register a map. The first map registered becomes the active one.
    pub fn add_map(&mut self, map: MapDef) {
        if self.active_map.is_none() {
            self.active_map = Some(map.id.clone());
        }
        self.maps.insert(map.id.clone(), map);
    }

    /// IDs of all entities present at a location, in deterministic order.
    pub fn entities_at(&self, location: &LocationId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| &e.location == location)
            .map(|e| e.id)
            .collect()
    }

    /// Distinct teams with at least one living member at a location.
    pub fn living_teams_at(&self, location: &LocationId, death_stat: &StatId) -> Vec<TeamId> {
        let mut teams: Vec<TeamId> = self
            .entities
            .values()
            .filter(|e| &e.location == location && e.alive(death_stat))
            .map(|e| e.team)
            .collect();
        teams.sort_unstable();
        teams.dedup();
        teams
    }
}
