// Scenario data — stat definitions and combat rules.
//
// `GameData` is the static scenario definition produced by an external
// editor: which stats exist (ranges, defaults, weighted roll tables, impact
// lists) and which combat rules are active (initiative stat, death stat,
// permitted reactions). The core never uses magic stat names — everything is
// read from here, so a scenario can define "vigor" or "hit_points" or
// anything else as its death stat.
//
// In multiplayer all peers must run against identical scenario data. This is
// enforced at the join handshake by comparing `data_hash()` — a mismatched
// client is rejected before it can issue requests against state it would
// misinterpret.
//
// See also: `roll.rs` for how `StatDef::weighted` tables are resolved,
// `combat.rs` for how `CombatRules` gates the reaction phases.

use crate::types::StatId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Whether an impact subtracts from or adds to the affected stat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactKind {
    /// Damage: the target stat is reduced, floored at 0 for the death stat
    /// or at the stat's configured minimum otherwise.
    Subtract,
    /// Healing/buff: the target stat is increased, unclamped for the death
    /// stat, clamped to the stat's maximum otherwise.
    Add,
}

/// One effect a stat has on another stat when used in an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatImpact {
    /// The stat affected on the action's target.
    pub stat: StatId,
    pub kind: ImpactKind,
}

/// One candidate outcome in a weighted roll table, with its relative weight.
///
/// Entries with `weight <= 0` are excluded from selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedValue {
    pub value: i64,
    pub weight: i64,
}

/// Definition of one stat, as authored in the scenario editor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatDef {
    pub id: StatId,
    pub label: String,
    pub min: i64,
    pub max: i64,
    pub default: i64,
    /// Lookup mode: the weighted table performs a fixed transform at
    /// entity-creation time instead of a per-use roll. Lookup tables have
    /// exactly one usable entry per level.
    #[serde(default)]
    pub lookup: bool,
    /// Per-level roll table: stat value -> candidate outcomes.
    #[serde(default)]
    pub weighted: BTreeMap<i64, Vec<WeightedValue>>,
    /// Stats this one subtracts from / adds to when used in an action.
    #[serde(default)]
    pub impacts: SmallVec<[StatImpact; 2]>,
}

impl StatDef {
    /// Minimal definition with no roll table and no impacts.
    pub fn plain(id: impl Into<String>, label: impl Into<String>, min: i64, max: i64, default: i64) -> Self {
        Self {
            id: StatId::new(id),
            label: label.into(),
            min,
            max,
            default,
            lookup: false,
            weighted: BTreeMap::new(),
            impacts: SmallVec::new(),
        }
    }
}

/// How the initial turn queue is ordered at battle start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOrderMode {
    /// Each team acts as a contiguous block; the team with the higher
    /// initiative-stat sum goes first, members sorted descending within it.
    TeamSum,
    /// All entities sorted descending by the initiative stat, regardless of
    /// team (uniformly shuffled if no initiative stat is configured).
    Individual,
}

/// Combat rule flags: which stats drive initiative and death, and which
/// reactions are permitted (each backed by the stat used for its roll).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombatRules {
    /// Stat that breaks initiative. `None` means randomized turn order in
    /// `Individual` mode.
    pub initiative_stat: Option<StatId>,
    /// The designated death stat: an entity whose value reaches <= 0 is
    /// defeated.
    pub death_stat: StatId,
    pub turn_order: TurnOrderMode,
    /// Reaction gates. `Some(stat)` enables the reaction and names the stat
    /// rolled for it; `None` disables it.
    pub dodge_stat: Option<StatId>,
    pub defend_stat: Option<StatId>,
    pub counter_stat: Option<StatId>,
    pub cover_stat: Option<StatId>,
    pub flee_stat: Option<StatId>,
}

impl CombatRules {
    /// True if any post-dodge reaction (defend/counter/cover/flee) is enabled.
    pub fn any_reaction(&self) -> bool {
        self.defend_stat.is_some()
            || self.counter_stat.is_some()
            || self.cover_stat.is_some()
            || self.flee_stat.is_some()
    }
}

/// Placeholder rules for a replica that has not yet received scenario data.
impl Default for CombatRules {
    fn default() -> Self {
        Self {
            initiative_stat: None,
            death_stat: StatId::new("hp"),
            turn_order: TurnOrderMode::Individual,
            dodge_stat: None,
            defend_stat: None,
            counter_stat: None,
            cover_stat: None,
            flee_stat: None,
        }
    }
}

/// The full static scenario definition consumed by the session core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    pub scenario_name: String,
    pub stats: Vec<StatDef>,
    pub rules: CombatRules,
}

impl GameData {
    /// Parse scenario data from JSON (the editor's export format).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up a stat definition by id.
    pub fn stat(&self, id: &StatId) -> Option<&StatDef> {
        self.stats.iter().find(|s| &s.id == id)
    }

    /// FNV-1a hash over the canonical JSON serialization. Compared at the
    /// join handshake so that all peers are guaranteed identical scenario
    /// data before any request is accepted.
    pub fn data_hash(&self) -> u64 {
        // Serialization of GameData cannot fail: no maps with non-string
        // keys besides i64 (serialized as strings), no non-finite floats.
        let json = serde_json::to_string(self).unwrap_or_default();
        fnv1a(json.as_bytes())
    }

    /// A small built-in scenario used by the host binary when no data file is
    /// given: hit points as the death stat, a weightless attack/defense pair,
    /// every reaction enabled.
    pub fn demo() -> Self {
        let mut attack = StatDef::plain("attack", "Attack", 0, 20, 5);
        attack.impacts.push(StatImpact {
            stat: StatId::new("hp"),
            kind: ImpactKind::Subtract,
        });
        Self {
            scenario_name: "demo".into(),
            stats: vec![
                StatDef::plain("hp", "Hit Points", 0, 50, 30),
                attack,
                StatDef::plain("defense", "Defense", 0, 20, 3),
                StatDef::plain("agility", "Agility", 0, 20, 4),
            ],
            rules: CombatRules {
                initiative_stat: Some(StatId::new("agility")),
                death_stat: StatId::new("hp"),
                turn_order: TurnOrderMode::Individual,
                dodge_stat: Some(StatId::new("agility")),
                defend_stat: Some(StatId::new("defense")),
                counter_stat: Some(StatId::new("attack")),
                cover_stat: Some(StatId::new("defense")),
                flee_stat: Some(StatId::new("agility")),
            },
        }
    }
}

/// FNV-1a, 64-bit. Stable across platforms, cheap, and good enough for a
/// configuration-equality check (not security).
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
