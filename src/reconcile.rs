//! # Match State Reconciler
//!
//! Derives one authoritative, low-churn view of health and match events
//! from the two independently-refreshing link snapshots.
//!
//! The reconciler runs on an external fixed-rate tick (the renderer's,
//! nominal 100 Hz). Correctness does not depend on the exact rate, only on
//! the tick being frequent enough that consecutive distinct raw values are
//! each observed at least once. Because the two links carry no mutual
//! ordering guarantee, every event here is edge-triggered through
//! [`EdgeWatch`] rather than derived from raw value comparison.

use tokio::time::Instant;

use crate::device::frame::Color;
use crate::device::TelemetrySnapshot;
use crate::referee::message::RefereeMessage;
use crate::watch::EdgeWatch;

/// Health at process start and after a referee reset.
pub const FULL_HP: i32 = 100;

/// Health lost per armor hit.
pub const HIT_DAMAGE: i32 = 1;

/// Health lost per yellow card.
pub const YELLOW_CARD_DAMAGE: i32 = 10;

/// One-shot events raised by a single tick, for the renderer's effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub hit: bool,
    pub hp_reset: bool,
    pub yellow_card: bool,
}

/// The authoritative derived match state.
///
/// `hp` changes only via explicit edge-triggered events (hit -1, yellow
/// card -10, reset to 100); it never free-runs with time and is not
/// persisted across restarts.
#[derive(Debug, Clone, Default)]
pub struct MatchState {
    hp: i32,
    color: Option<Color>,
    yellow_card_at: Option<Instant>,

    color_watch: EdgeWatch<Color>,
    hit_watch: EdgeWatch<u32>,
    reset_watch: EdgeWatch<i64>,
    card_watch: EdgeWatch<i64>,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            hp: FULL_HP,
            ..Default::default()
        }
    }

    /// Current health, always within `0..=FULL_HP`.
    pub fn hp(&self) -> i32 {
        self.hp
    }

    /// The side the connected armor sensor reports, if any.
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    /// When the last yellow card fired (the renderer shows a 5 s banner).
    pub fn yellow_card_at(&self) -> Option<Instant> {
        self.yellow_card_at
    }

    /// Advance one tick against the latest link snapshots.
    ///
    /// Order matters: the color watches advance first so a side
    /// reassignment re-arms the referee-token watches before they are
    /// consulted, preventing a stale token from firing an event on the
    /// first tick after the flip.
    pub fn tick(&mut self, device: &TelemetrySnapshot, referee: &RefereeMessage) -> TickEvents {
        let mut events = TickEvents::default();

        // 1-2. Color first. Any change in the underlying value, including
        // from or to absent, re-arms the dependent watches.
        let color = device.color;
        if self.color_watch.previous() != color.as_ref() {
            self.reset_watch.reset();
            self.card_watch.reset();
        }
        self.color_watch.update(color);
        self.color = color;

        // 3. Hit detection. The nonzero guard keeps the armor's own
        // power-cycle (counter restarts from zero) from registering as a
        // hit against the previous nonzero count.
        if self.hit_watch.update(device.hit_count) && device.hit_count != Some(0) {
            self.apply_hp(|hp| hp - HIT_DAMAGE);
            events.hit = true;
        }

        // 4-5. Referee tokens for our side, only when the side is known.
        if let Some(color) = color {
            let side = referee.side(color);
            if self.reset_watch.update(side.reset_hp_ms) {
                self.hp = FULL_HP;
                events.hp_reset = true;
            }
            if self.card_watch.update(side.yellow_card_ms) {
                self.apply_hp(|hp| hp - YELLOW_CARD_DAMAGE);
                self.yellow_card_at = Some(Instant::now());
                events.yellow_card = true;
            }
        }

        events
    }

    /// Apply a health delta, clamped to the design range. Repeated yellow
    /// cards cannot drive hp below zero, repeated resets cannot exceed 100.
    fn apply_hp(&mut self, f: impl FnOnce(i32) -> i32) {
        self.hp = f(self.hp).clamp(0, FULL_HP);
    }
}
