// Per-item countdown state machine.
//
// Re-evaluated on every tick (and whenever the deadline changes) against
// server-corrected time. `Ended` is terminal for an instance: a later
// deadline pushed into an ended countdown is ignored.

use chrono::{DateTime, TimeDelta, Utc};

/// Display string for an expired auction.
pub const ENDED_LABEL: &str = "ENDED";

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_SECOND: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownPhase {
    Live,
    Ended,
}

/// Render a positive remaining duration as `"{h}h {m}m {s}s"`.
///
/// Truncating division, no rounding, no zero padding.
pub fn format_remaining(diff_ms: i64) -> String {
    let hours = diff_ms / MS_PER_HOUR;
    let minutes = (diff_ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (diff_ms % MS_PER_MINUTE) / MS_PER_SECOND;
    format!("{hours}h {minutes}m {seconds}s")
}

/// Countdown and flash state for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCountdown {
    end: DateTime<Utc>,
    phase: CountdownPhase,
    display: String,
    last_bid: u64,
    flashing: bool,
}

impl ItemCountdown {
    /// Create a countdown and evaluate it immediately.
    pub fn new(end: DateTime<Utc>, current_bid: u64, server_now: DateTime<Utc>) -> Self {
        let mut countdown = ItemCountdown {
            end,
            phase: CountdownPhase::Live,
            display: String::new(),
            last_bid: current_bid,
            flashing: false,
        };
        countdown.evaluate(server_now);
        countdown
    }

    /// Re-derive the display. Returns `true` when the display string changed.
    pub fn tick(&mut self, server_now: DateTime<Utc>) -> bool {
        let before_phase = self.phase;
        let before = std::mem::take(&mut self.display);
        self.evaluate(server_now);
        before_phase != self.phase || before != self.display
    }

    /// Apply a new deadline. Ignored once ended.
    pub fn set_end_time(&mut self, end: DateTime<Utc>, server_now: DateTime<Utc>) -> bool {
        if self.phase == CountdownPhase::Ended || end == self.end {
            return false;
        }
        self.end = end;
        self.tick(server_now)
    }

    /// Record the item's current bid; raises the flash when it changed.
    pub fn observe_bid(&mut self, current_bid: u64) -> bool {
        if current_bid == self.last_bid {
            return false;
        }
        self.last_bid = current_bid;
        self.flashing = true;
        true
    }

    pub fn clear_flash(&mut self) {
        self.flashing = false;
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn is_ended(&self) -> bool {
        self.phase == CountdownPhase::Ended
    }

    pub fn is_flashing(&self) -> bool {
        self.flashing
    }

    fn evaluate(&mut self, server_now: DateTime<Utc>) {
        if self.phase == CountdownPhase::Ended {
            self.display = ENDED_LABEL.to_string();
            return;
        }
        let diff = self.end - server_now;
        if diff <= TimeDelta::zero() {
            self.phase = CountdownPhase::Ended;
            self.display = ENDED_LABEL.to_string();
        } else {
            self.display = format_remaining(diff.num_milliseconds());
        }
    }
}
