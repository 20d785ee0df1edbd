// Error taxonomy for the session core.
//
// Every failure mode here is handled locally at the point of detection and
// never tears down the session. The replication layer maps each variant to
// its propagation policy:
// - `StaleReference` is swallowed silently (no state change, no reply);
// - `InvalidRuleConfig`, `OutOfTurn`, and `WrongPhase` are surfaced to the
//   acting peer only, with no turn consumed;
// - `NoCombat` is treated like a stale reference (the battle ended before
//   the request arrived).
//
// Connection failures are not represented here — they are transport events,
// owned by `skirmish_net`.

use crate::types::{EntityId, LocationId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The request referenced an entity or object that no longer exists.
    #[error("entity {0} no longer exists")]
    StaleReference(EntityId),

    /// An action or reaction referenced a stat absent from the active rules.
    #[error("rules do not configure a stat for {0}")]
    InvalidRuleConfig(String),

    /// No active combat session at the given location.
    #[error("no active combat at {0}")]
    NoCombat(LocationId),

    /// The acting entity is not the current-turn entity.
    #[error("entity {0} may not act outside its turn")]
    OutOfTurn(EntityId),

    /// The requested operation is not valid in the current combat phase.
    #[error("operation not valid in the current combat phase")]
    WrongPhase,
}

impl CoreError {
    /// True for failures that are silently ignored rather than surfaced
    /// (the referenced thing vanished between request and application).
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleReference(_) | Self::NoCombat(_))
    }
}
