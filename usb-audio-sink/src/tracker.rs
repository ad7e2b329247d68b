//! Fill-level tracker: exponential moving average and trend.
//!
//! One [`update()`](FillTracker::update) per ingest cycle. Every
//! `adjust_interval` updates the tracker hands the smoothed level and its
//! change since the previous hand-off to the clock controller.
//!
//! ```text
//! smoothed ← smoothed·(1 − α) + raw·α
//! trend    ← smoothed − previous        (every K cycles)
//! ```

use crate::constants::TARGET_FILL;

/// Latest tracker state, as published to the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillSample {
    /// Fill level measured this cycle.
    pub raw_fill: usize,
    /// EMA of `raw_fill`.
    pub smoothed_fill: f32,
    /// `smoothed_fill` at the previous fast-loop hand-off.
    pub previous_smoothed: f32,
    /// `smoothed_fill - previous_smoothed` at the last hand-off.
    pub trend: f32,
}

impl FillSample {
    const ZERO: FillSample = FillSample {
        raw_fill: 0,
        smoothed_fill: 0.0,
        previous_smoothed: 0.0,
        trend: 0.0,
    };
}

/// EMA filter plus hand-off cadence.
pub struct FillTracker {
    alpha: f32,
    interval: u16,
    cycles: u16,
    sample: FillSample,
}

impl FillTracker {
    /// Create a tracker with weight `alpha` handing off every `interval`
    /// updates.
    pub const fn new(alpha: f32, interval: u16) -> Self {
        FillTracker {
            alpha,
            interval,
            cycles: 0,
            sample: FillSample::ZERO,
        }
    }

    /// Zero everything (session start).
    pub fn reset(&mut self) {
        self.cycles = 0;
        self.sample = FillSample::ZERO;
    }

    /// Pin every level to half full (stream stopped).
    pub fn park(&mut self) {
        let half = TARGET_FILL as f32;
        self.cycles = 0;
        self.sample = FillSample {
            raw_fill: TARGET_FILL,
            smoothed_fill: half,
            previous_smoothed: half,
            trend: 0.0,
        };
    }

    /// Track `raw` without filtering (used while priming so the EMA starts
    /// from the real level instead of ramping up from zero).
    pub fn seed(&mut self, raw: usize) {
        self.sample.raw_fill = raw;
        self.sample.smoothed_fill = raw as f32;
    }

    /// Fold `raw` into the average.
    ///
    /// Returns `Some((smoothed, trend))` on every `interval`-th call.
    pub fn update(&mut self, raw: usize) -> Option<(f32, f32)> {
        let s = &mut self.sample;
        s.raw_fill = raw;
        s.smoothed_fill = s.smoothed_fill * (1.0 - self.alpha) + raw as f32 * self.alpha;

        self.cycles += 1;
        if self.cycles < self.interval {
            return None;
        }
        self.cycles = 0;

        // First hand-off of a session has no history; report a flat trend.
        if s.previous_smoothed == 0.0 {
            s.previous_smoothed = s.smoothed_fill;
        }
        s.trend = s.smoothed_fill - s.previous_smoothed;
        s.previous_smoothed = s.smoothed_fill;
        Some((s.smoothed_fill, s.trend))
    }

    /// Current state.
    pub fn sample(&self) -> FillSample {
        self.sample
    }
}
