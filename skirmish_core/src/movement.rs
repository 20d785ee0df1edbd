// Movement reconciliation — prediction, interpolation, collision.
//
// Three pieces, all pure and clock-free (callers pass timestamps):
//
// - `step()`: integrate one tick of directional input into a new position,
//   with axis-separated collision against a map's solid objects. X is
//   resolved before Y so a diagonal move into a wall slides along it rather
//   than stopping dead. The result is clamped to map bounds.
// - `Predictor`: the locally controlled entity. Moves eagerly every tick
//   (client-side prediction) but throttles position reports to the host to
//   roughly 20 Hz — the per-tick positions stay local, only the latest one
//   is sent. The authoritative echo from the host always overwrites the
//   predicted value (last-write-wins).
// - `Interpolator`: remote entities. Input never moves them directly;
//   instead the rendered position advances a fixed fraction per tick toward
//   the latest authoritative target, smoothing out the coarse network
//   update rate.

use crate::state::MapDef;
use crate::types::Position;
use serde::{Deserialize, Serialize};

/// Minimum interval between position reports to the host (~20 Hz).
pub const REPORT_INTERVAL_MS: u64 = 50;

/// Fraction of the remaining distance an interpolated entity covers per tick.
const LERP_FRACTION: f32 = 0.25;

/// Distance below which an interpolated entity snaps onto its target.
const SNAP_EPSILON: f32 = 0.01;

/// Integrate one tick of movement with axis-separated collision.
///
/// `input` is a direction vector (typically unit or zero per axis), `speed`
/// in map units per second, `dt` in seconds.
pub fn step(pos: Position, input: (f32, f32), speed: f32, dt: f32, map: &MapDef) -> Position {
    let mut next = pos;

    // Resolve X first, then Y, so diagonal movement slides along walls.
    let candidate_x = Position::new(pos.x + input.0 * speed * dt, next.y);
    if !blocked(candidate_x, map) {
        next.x = candidate_x.x;
    }
    let candidate_y = Position::new(next.x, next.y + input.1 * speed * dt);
    if !blocked(candidate_y, map) {
        next.y = candidate_y.y;
    }

    // Clamp to map bounds.
    next.x = next.x.clamp(0.0, map.width);
    next.y = next.y.clamp(0.0, map.height);
    next
}

fn blocked(pos: Position, map: &MapDef) -> bool {
    map.objects.iter().any(|o| o.contains(pos))
}

// ---------------------------------------------------------------------------
// Local prediction
// ---------------------------------------------------------------------------

/// Client-side prediction state for the locally controlled entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Predictor {
    pub position: Position,
    last_report_ms: Option<u64>,
}

impl Predictor {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            last_report_ms: None,
        }
    }

    /// Apply one tick of input eagerly (prediction).
    pub fn tick(&mut self, input: (f32, f32), speed: f32, dt: f32, map: &MapDef) {
        self.position = step(self.position, input, speed, dt, map);
    }

    /// The authoritative echo from the host overwrites any prediction.
    pub fn accept_authoritative(&mut self, position: Position) {
        self.position = position;
    }

    /// Returns the position to report to the host, or `None` if the last
    /// report was less than `REPORT_INTERVAL_MS` ago.
    pub fn take_report(&mut self, now_ms: u64) -> Option<Position> {
        let due = match self.last_report_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= REPORT_INTERVAL_MS,
        };
        if due {
            self.last_report_ms = Some(now_ms);
            Some(self.position)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Remote interpolation
// ---------------------------------------------------------------------------

/// Rendered-position smoothing for a remote entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interpolator {
    pub current: Position,
    target: Position,
}

impl Interpolator {
    pub fn new(position: Position) -> Self {
        Self {
            current: position,
            target: position,
        }
    }

    /// Record the latest authoritative position as the interpolation target.
    pub fn retarget(&mut self, target: Position) {
        self.target = target;
    }

    /// Advance one tick toward the target; snaps when close enough.
    pub fn tick(&mut self) -> Position {
        if self.current.distance(self.target) <= SNAP_EPSILON {
            self.current = self.target;
        } else {
            self.current.x += (self.target.x - self.current.x) * LERP_FRACTION;
            self.current.y += (self.target.y - self.current.y) * LERP_FRACTION;
        }
        self.current
    }
}
