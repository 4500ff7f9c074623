use serde::{Deserialize, Serialize};

/// Engine ticks per user step for a raw slider value: `max(1, round(raw^2))`.
///
/// The square keeps a linear slider feeling responsive at the low end while still
/// reaching large multipliers. Non-finite input collapses to the floor of 1.
pub fn step_multiplier_from_slider(raw: f64) -> u32 {
    // `as` saturates: NaN becomes 0, overflow becomes u32::MAX.
    ((raw * raw).round() as u32).max(1)
}

/// Play/step bookkeeping for one interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_playing: bool,
    pub step_count: u64,
    step_multiplier: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_playing: false,
            step_count: 0,
            step_multiplier: 1,
        }
    }
}

impl SessionState {
    pub fn step_multiplier(&self) -> u32 {
        self.step_multiplier
    }

    pub fn set_step_multiplier(&mut self, raw: f64) -> u32 {
        self.step_multiplier = step_multiplier_from_slider(raw);
        self.step_multiplier
    }

    pub fn record_ticks(&mut self, ticks: u32) {
        self.step_count = self.step_count.saturating_add(ticks as u64);
    }
}
