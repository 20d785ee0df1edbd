// skirmish_core — pure session and combat logic.
//
// This crate contains everything the host needs to coordinate a tabletop
// session except the network itself: the canonical state model, scenario
// data (stat definitions and combat rules), weighted stat resolution, the
// turn-based combat state machine, and movement reconciliation. It has zero
// network or I/O dependencies and can be tested headless.
//
// Module overview:
// - `types.rs`:    IDs (deterministic UUID wrappers, stat/team/location
//                  newtypes) and `Position`.
// - `data.rs`:     `GameData` — stat definitions and combat rules produced by
//                  an external scenario editor, loaded from JSON and hashed
//                  for the join handshake.
// - `state.rs`:    `SessionState` — the canonical snapshot the host owns and
//                  clients mirror: maps, entities, players, chat, globals,
//                  active combat sessions.
// - `roll.rs`:     Weighted roll resolution — stat value to concrete outcome
//                  via a per-level weighted table, plus lookup-mode transforms.
// - `combat.rs`:   The combat state machine: initiative, turn advance,
//                  pending actions, reactions, damage, victory detection.
// - `movement.rs`: Axis-separated collision stepping, client-side prediction
//                  throttling, and remote-entity interpolation.
// - `error.rs`:    `CoreError` — the error taxonomy shared by the combat
//                  engine and the replication layer.
//
// The companion crates `skirmish_protocol` (wire messages) and `skirmish_net`
// (transport, host loop, client mirror) build on this one. That boundary is
// enforced at the compiler level — this crate cannot depend on sockets,
// threads, or wall-clock time.
//
// **Critical constraint: single writer.** All mutation of `SessionState`
// happens on the host, one request at a time. Randomness comes exclusively
// from a seeded `GameRng` (re-exported from `skirmish_prng`); ordered
// collections are `BTreeMap`/`BTreeSet` so serialization is deterministic.

pub mod combat;
pub mod data;
pub mod error;
pub mod movement;
pub mod roll;
pub mod state;
pub mod types;

pub use skirmish_prng as prng;
