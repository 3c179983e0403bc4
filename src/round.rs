//! Round engine: the 30 second combo sprint.
//!
//! A round moves Idle -> Playing -> Finished. Taps inside the combo window
//! build a combo (capped at [`MAX_COMBO`]); every [`COMBO_STEP`] combo levels
//! add one bonus point per tap. Time is passed in explicitly as epoch
//! milliseconds so the engine stays deterministic under test.

use serde::Serialize;

pub const ROUND_SECONDS: u32 = 30;
pub const ROUND_MS: f64 = ROUND_SECONDS as f64 * 1000.0;
/// Max gap between two taps that still continues the combo (inclusive).
pub const COMBO_WINDOW_MS: f64 = 900.0;
pub const MAX_COMBO: u8 = 15;
pub const COMBO_STEP: u8 = 3;

/// Ascending thresholds; a combo takes the label of the highest one it reached.
const COMBO_LABELS: [(u8, &str); 5] = [
    (1, "Warm-up"),
    (4, "On fire"),
    (7, "Blazing"),
    (10, "Unstoppable"),
    (13, "Legendary"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    #[default]
    Idle,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    pub status: RoundStatus,
    pub started_at: Option<f64>,
    pub ends_at: Option<f64>,
    pub score: u64,
    pub taps: u64,
    pub combo: u8,
    pub last_tap_at: Option<f64>,
    /// Whole seconds left as of the last tick.
    pub time_left: u32,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            status: RoundStatus::Idle,
            started_at: None,
            ends_at: None,
            score: 0,
            taps: 0,
            combo: 0,
            last_tap_at: None,
            time_left: ROUND_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    pub delta: u64,
    pub combo: u8,
    /// The tap arrived outside a live round and started a fresh one.
    pub auto_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub score: u64,
    pub taps: u64,
    pub previous_best: u64,
    pub best: u64,
    pub new_best: bool,
}

pub struct RoundEngine {
    state: RoundState,
    best: u64,
}

impl RoundEngine {
    pub fn new(best: u64) -> Self {
        Self {
            state: RoundState::default(),
            best,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn status(&self) -> RoundStatus {
        self.state.status
    }

    pub fn best(&self) -> u64 {
        self.best
    }

    pub fn is_playing(&self) -> bool {
        self.state.status == RoundStatus::Playing
    }

    pub fn start(&mut self, now: f64) {
        self.state = RoundState {
            status: RoundStatus::Playing,
            started_at: Some(now),
            ends_at: Some(now + ROUND_MS),
            ..RoundState::default()
        };
    }

    /// Whole seconds left at `now`, rounded up. Zero outside a started round.
    pub fn remaining_secs(&self, now: f64) -> u32 {
        match self.state.ends_at {
            Some(ends_at) => ((ends_at - now) / 1000.0).ceil().max(0.0) as u32,
            None => 0,
        }
    }

    /// Advances the countdown. Returns the summary on the one tick that
    /// finishes the round; every other call returns `None`.
    pub fn tick(&mut self, now: f64) -> Option<RoundSummary> {
        if self.state.status != RoundStatus::Playing {
            return None;
        }
        let remaining = self.remaining_secs(now);
        self.state.time_left = remaining;
        if remaining > 0 {
            return None;
        }
        self.state.status = RoundStatus::Finished;
        let previous_best = self.best;
        let new_best = self.state.score > previous_best;
        if new_best {
            self.best = self.state.score;
        }
        Some(RoundSummary {
            score: self.state.score,
            taps: self.state.taps,
            previous_best,
            best: self.best,
            new_best,
        })
    }

    /// Registers a tap. Outside a live round the tap starts a new one and
    /// counts as its first tap. A tap after the clock ran out but before the
    /// finishing tick is dropped.
    pub fn tap(&mut self, now: f64, daily_bonus: bool) -> Option<TapOutcome> {
        let auto_started = !self.is_playing();
        if auto_started {
            self.start(now);
        } else if self.remaining_secs(now) == 0 {
            return None;
        }

        let combo = next_combo(self.state.combo, self.state.last_tap_at, now);
        let delta = score_delta(combo, daily_bonus);
        self.state.combo = combo;
        self.state.taps += 1;
        self.state.score += delta;
        self.state.last_tap_at = Some(now);
        Some(TapOutcome {
            delta,
            combo,
            auto_started,
        })
    }

    /// Adds flat points to a live round. Returns false when no round is live.
    pub fn apply_bonus(&mut self, points: u64) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state.score += points;
        true
    }

    pub fn combo_label(&self) -> &'static str {
        combo_label(self.state.combo)
    }

    pub fn progress(&self) -> f64 {
        progress(self.state.time_left)
    }
}

pub fn next_combo(current: u8, last_tap_at: Option<f64>, now: f64) -> u8 {
    match last_tap_at {
        Some(last) if now - last <= COMBO_WINDOW_MS => (current + 1).min(MAX_COMBO),
        _ => 1,
    }
}

pub fn score_delta(combo: u8, daily_bonus: bool) -> u64 {
    let combo_bonus = u64::from(combo.saturating_sub(1) / COMBO_STEP);
    1 + combo_bonus + u64::from(daily_bonus)
}

pub fn combo_label(combo: u8) -> &'static str {
    COMBO_LABELS
        .iter()
        .rev()
        .find(|(threshold, _)| combo >= *threshold)
        .map(|(_, label)| *label)
        .unwrap_or("Ready")
}

pub fn progress(time_left: u32) -> f64 {
    (f64::from(time_left) / f64::from(ROUND_SECONDS)).clamp(0.0, 1.0)
}

pub fn button_label(status: RoundStatus) -> &'static str {
    match status {
        RoundStatus::Playing => "Tap!",
        RoundStatus::Finished => "Play Again",
        RoundStatus::Idle => "Start Round",
    }
}
