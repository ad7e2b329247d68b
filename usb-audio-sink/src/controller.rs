//! Clock controller: steers the VCXO and the sample-clock divider so the
//! device drains the ring at the host's rate.
//!
//! ## Two loops
//!
//! | Loop | Cadence | Input | Action |
//! |------|---------|-------|--------|
//! | fast | every `adjust_interval` cycles | smoothed fill, trend | ±`adjust_tick` on divider and voltage |
//! | slow | every cycle | overrun/underrun events | narrow the voltage band, ±`band_step` |
//!
//! The fast loop integrates small fractional ticks into two accumulators;
//! the hardware outputs are `nominal + trunc(accumulator)`, clamped. Both
//! outputs always move in the same direction since they steer the same clock.
//!
//! The slow loop catches mismatches too large for the fast loop to walk out
//! of in reasonable time. When overruns (or underruns) dominate for
//! [`IMBALANCE_LIMIT`] net cycles, the voltage band edge on the wrong side is
//! pulled in to the current voltage and the voltage jumps one `band_step`
//! away from it. The band only ever narrows within a session.
//!
//! ## Clamps
//!
//! - divider: `[nominal·9/10, nominal·11/10]`
//! - voltage: `[CONTROL_VOLTAGE_FLOOR, CONTROL_VOLTAGE_CEILING] ∩ [band.low, band.high]`

use crate::config::Config;
use crate::constants::{CONTROL_VOLTAGE_CEILING, CONTROL_VOLTAGE_FLOOR, IMBALANCE_LIMIT, TARGET_FILL};

/// Adaptive operating band for the control voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoltageBand {
    /// Lowest voltage the fast loop may use.
    pub low: u16,
    /// Highest voltage the fast loop may use.
    pub high: u16,
}

impl VoltageBand {
    /// The full device-safe range.
    pub const FULL: VoltageBand = VoltageBand {
        low: CONTROL_VOLTAGE_FLOOR,
        high: CONTROL_VOLTAGE_CEILING,
    };
}

/// Values currently driven onto the clock hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockState {
    /// Sample-clock divider.
    pub divider: u16,
    /// VCXO control voltage (PWM duty code).
    pub control_voltage: u16,
    /// Current adaptive band.
    pub band: VoltageBand,
}

/// Fast-loop decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Buffer high and not falling: run the local clock faster.
    SpeedUp,
    /// Buffer low and not rising: run the local clock slower.
    SlowDown,
    /// Inside the hysteresis window.
    Hold,
}

/// Which hardware outputs need rewriting after a controller step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Changed {
    /// Divider differs from the last written value.
    pub divider: bool,
    /// Control voltage differs from the last written value.
    pub voltage: bool,
}

impl Changed {
    /// Combine two steps taken in the same cycle.
    pub fn merge(self, other: Changed) -> Changed {
        Changed {
            divider: self.divider || other.divider,
            voltage: self.voltage || other.voltage,
        }
    }

    /// Whether anything changed.
    pub fn any(self) -> bool {
        self.divider || self.voltage
    }
}

/// Slow-loop band adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BandEvent {
    /// Sustained overrun: `high` pulled down, voltage stepped down.
    HighLowered {
        /// New band.
        band: VoltageBand,
        /// Voltage after the step.
        voltage: u16,
    },
    /// Sustained underrun: `low` pulled up, voltage stepped up.
    LowRaised {
        /// New band.
        band: VoltageBand,
        /// Voltage after the step.
        voltage: u16,
    },
}

/// Which bound the imbalance counter just reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    /// Reached `+IMBALANCE_LIMIT`.
    Overrun,
    /// Reached `-IMBALANCE_LIMIT`.
    Underrun,
}

/// Net overrun-minus-underrun count, saturating at `±IMBALANCE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImbalanceCounter(i8);

impl ImbalanceCounter {
    /// Current value.
    pub fn value(self) -> i8 {
        self.0
    }

    /// Fold one cycle's events in.
    ///
    /// Returns the bound reached if this cycle moved the counter onto it.
    /// Staying on a bound reports nothing.
    pub fn record(&mut self, overrun: bool, underrun: bool) -> Option<Saturation> {
        let prev = self.0;
        let next = prev + overrun as i8 - underrun as i8;
        self.0 = next.clamp(-IMBALANCE_LIMIT, IMBALANCE_LIMIT);

        if self.0 == IMBALANCE_LIMIT && prev < IMBALANCE_LIMIT {
            Some(Saturation::Overrun)
        } else if self.0 == -IMBALANCE_LIMIT && prev > -IMBALANCE_LIMIT {
            Some(Saturation::Underrun)
        } else {
            None
        }
    }
}

/// Dual-timescale clock controller.
pub struct ClockController {
    config: Config,
    nominal_divider: u16,
    divider_offset: f32,
    voltage_offset: f32,
    state: ClockState,
    imbalance: ImbalanceCounter,
}

impl ClockController {
    /// Create a controller centred on `nominal_divider` and the configured
    /// initial control voltage.
    pub fn new(config: Config, nominal_divider: u16) -> Self {
        ClockController {
            config,
            nominal_divider,
            divider_offset: 0.0,
            voltage_offset: 0.0,
            state: ClockState {
                divider: nominal_divider,
                control_voltage: config.initial_control_voltage,
                band: VoltageBand::FULL,
            },
            imbalance: ImbalanceCounter::default(),
        }
    }

    /// Outputs the hardware should currently carry.
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Divider for the current sample rate before any adjustment.
    pub fn nominal_divider(&self) -> u16 {
        self.nominal_divider
    }

    /// Current imbalance counter value.
    pub fn imbalance(&self) -> i8 {
        self.imbalance.value()
    }

    /// Integrated divider adjustment (fractional).
    pub fn divider_offset(&self) -> f32 {
        self.divider_offset
    }

    /// Inclusive divider clamp for the current nominal value.
    pub fn divider_limits(&self) -> (u16, u16) {
        let n = self.nominal_divider as u32;
        let low = (n * 9 / 10).max(1);
        let high = (n * 11 / 10).min(u16::MAX as u32);
        (low as u16, high as u16)
    }

    /// Inclusive control-voltage clamp for the current band.
    pub fn voltage_limits(&self) -> (u16, u16) {
        let band = self.state.band;
        (
            band.low.max(CONTROL_VOLTAGE_FLOOR),
            band.high.min(CONTROL_VOLTAGE_CEILING),
        )
    }

    /// Start of a streaming session: back to the nominal divider, the
    /// configured voltage and the full band.
    pub fn reset(&mut self) -> Changed {
        self.divider_offset = 0.0;
        self.voltage_offset = 0.0;
        self.imbalance = ImbalanceCounter::default();
        self.state.band = VoltageBand::FULL;
        self.apply_offsets()
    }

    /// New sample rate announced: recentre the divider and reopen the band.
    pub fn retune(&mut self, nominal_divider: u16) -> Changed {
        self.nominal_divider = nominal_divider;
        self.divider_offset = 0.0;
        self.state.band = VoltageBand::FULL;
        self.apply_offsets()
    }

    /// Fast loop: one decision from the smoothed fill level and its trend.
    pub fn fast_step(&mut self, smoothed: f32, trend: f32) -> (Direction, Changed) {
        let target = TARGET_FILL as f32;
        let direction = if smoothed > target + self.config.margin_hi as f32 && trend >= 0.0 {
            Direction::SpeedUp
        } else if smoothed < target - self.config.margin_lo as f32 && trend <= 0.0 {
            Direction::SlowDown
        } else {
            Direction::Hold
        };

        let tick = self.config.adjust_tick;
        match direction {
            Direction::SpeedUp => {
                self.divider_offset -= tick;
                self.voltage_offset -= tick;
            }
            Direction::SlowDown => {
                self.divider_offset += tick;
                self.voltage_offset += tick;
            }
            Direction::Hold => {}
        }

        (direction, self.apply_offsets())
    }

    /// Slow loop: fold in last cycle's overrun/underrun and narrow the band
    /// if the imbalance counter just saturated.
    pub fn slow_step(&mut self, overrun: bool, underrun: bool) -> (Option<BandEvent>, Changed) {
        let saturated = self.imbalance.record(overrun, underrun);
        let narrowed = match saturated {
            Some(Saturation::Overrun) => self.lower_high(),
            Some(Saturation::Underrun) => self.raise_low(),
            None => false,
        };
        if !narrowed {
            return (None, Changed::default());
        }

        let changed = self.apply_offsets();
        let band = self.state.band;
        let voltage = self.state.control_voltage;
        let event = match saturated {
            Some(Saturation::Underrun) => BandEvent::LowRaised { band, voltage },
            _ => BandEvent::HighLowered { band, voltage },
        };
        (Some(event), changed)
    }

    fn lower_high(&mut self) -> bool {
        let v = self.state.control_voltage;
        let band = self.state.band;
        if band.high <= band.low || v.saturating_sub(self.config.band_step) <= band.low {
            log::debug!("overrun band exhausted: {}..{} at {}", band.low, band.high, v);
            return false;
        }
        self.state.band.high = v;
        self.voltage_offset -= self.config.band_step as f32;
        true
    }

    fn raise_low(&mut self) -> bool {
        let v = self.state.control_voltage;
        let band = self.state.band;
        if band.low >= band.high || v.saturating_add(self.config.band_step) >= band.high {
            log::debug!("underrun band exhausted: {}..{} at {}", band.low, band.high, v);
            return false;
        }
        self.state.band.low = v;
        self.voltage_offset += self.config.band_step as f32;
        true
    }

    /// Derive the outputs from the accumulators, clamp them, and wind the
    /// accumulators back onto the clamp so they cannot run away.
    fn apply_offsets(&mut self) -> Changed {
        let (d_lo, d_hi) = self.divider_limits();
        let nominal = self.nominal_divider as i32;
        self.divider_offset = self
            .divider_offset
            .max((d_lo as i32 - nominal) as f32)
            .min((d_hi as i32 - nominal) as f32);
        let divider = (nominal + self.divider_offset as i32).clamp(d_lo as i32, d_hi as i32);

        let (v_lo, v_hi) = self.voltage_limits();
        let initial = self.config.initial_control_voltage as i32;
        self.voltage_offset = self
            .voltage_offset
            .max((v_lo as i32 - initial) as f32)
            .min((v_hi as i32 - initial) as f32);
        let voltage = (initial + self.voltage_offset as i32).clamp(v_lo as i32, v_hi as i32);

        let changed = Changed {
            divider: divider as u16 != self.state.divider,
            voltage: voltage as u16 != self.state.control_voltage,
        };
        self.state.divider = divider as u16;
        self.state.control_voltage = voltage as u16;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOMINAL: u16 = 1_000;

    fn controller() -> ClockController {
        ClockController::new(Config::new(), NOMINAL)
    }

    fn high() -> f32 {
        TARGET_FILL as f32 + 150.0
    }

    fn low() -> f32 {
        TARGET_FILL as f32 - 150.0
    }

    #[test]
    fn initial_state() {
        let c = controller();
        let s = c.state();
        assert_eq!(s.divider, NOMINAL);
        assert_eq!(s.control_voltage, 8_600);
        assert_eq!(s.band, VoltageBand::FULL);
        assert_eq!(c.divider_limits(), (900, 1_100));
    }

    #[test]
    fn holds_at_target() {
        let mut c = controller();
        let (dir, changed) = c.fast_step(TARGET_FILL as f32, 0.0);
        assert_eq!(dir, Direction::Hold);
        assert!(!changed.any());
        assert_eq!(c.state().divider, NOMINAL);
    }

    #[test]
    fn holds_inside_hysteresis() {
        let mut c = controller();
        for fill in [381.0, 420.0, 540.0, 580.0] {
            assert_eq!(c.fast_step(fill, 5.0).0, Direction::Hold);
            assert_eq!(c.fast_step(fill, -5.0).0, Direction::Hold);
        }
    }

    #[test]
    fn high_and_rising_speeds_up() {
        let mut c = controller();
        assert_eq!(c.fast_step(high(), 0.0).0, Direction::SpeedUp);
        // 0.8 is not yet a whole tick
        assert_eq!(c.state().divider, NOMINAL);
        let (_, changed) = c.fast_step(high(), 1.0);
        assert!(changed.divider && changed.voltage);
        assert_eq!(c.state().divider, NOMINAL - 1);
        assert_eq!(c.state().control_voltage, 8_599);
    }

    #[test]
    fn high_but_falling_holds() {
        let mut c = controller();
        assert_eq!(c.fast_step(high(), -1.0).0, Direction::Hold);
    }

    #[test]
    fn low_and_falling_slows_down() {
        let mut c = controller();
        c.fast_step(low(), 0.0);
        c.fast_step(low(), -2.0);
        assert_eq!(c.state().divider, NOMINAL + 1);
        assert_eq!(c.state().control_voltage, 8_601);
        assert_eq!(c.fast_step(low(), 3.0).0, Direction::Hold);
    }

    #[test]
    fn outputs_never_leave_clamps() {
        let mut c = controller();
        for _ in 0..100_000 {
            c.fast_step(high(), 1.0);
            let s = c.state();
            assert!(s.divider >= 900 && s.divider <= 1_100);
            assert!(s.control_voltage >= CONTROL_VOLTAGE_FLOOR);
        }
        assert_eq!(c.state().divider, 900);
        assert_eq!(c.state().control_voltage, CONTROL_VOLTAGE_FLOOR);

        for _ in 0..100_000 {
            c.fast_step(low(), -1.0);
            let s = c.state();
            assert!(s.divider <= 1_100);
            assert!(s.control_voltage <= CONTROL_VOLTAGE_CEILING);
        }
        assert_eq!(c.state().divider, 1_100);
        assert_eq!(c.state().control_voltage, CONTROL_VOLTAGE_CEILING);
    }

    #[test]
    fn no_windup_past_clamp() {
        let mut c = controller();
        for _ in 0..1_000 {
            c.fast_step(high(), 1.0);
        }
        assert_eq!(c.state().divider, 900);
        assert_eq!(c.divider_offset(), -100.0);
        // A single slow-down tick already moves off the clamp.
        c.fast_step(low(), -1.0);
        assert_eq!(c.state().divider, 901);
    }

    #[test]
    fn no_windup_from_fractional_overshoot() {
        // 126 ticks of 0.8 overshoot the rail by a fraction that truncation
        // alone would hide.
        let mut c = controller();
        for _ in 0..126 {
            c.fast_step(high(), 1.0);
        }
        assert_eq!(c.state().divider, 900);
        assert_eq!(c.divider_offset(), -100.0);
        c.fast_step(low(), -1.0);
        assert_eq!(c.state().divider, 901);
    }

    #[test]
    fn no_voltage_windup_at_band_edge() {
        let mut c = controller();
        for _ in 0..IMBALANCE_LIMIT {
            c.slow_step(true, false);
        }
        for _ in 0..1_000 {
            c.fast_step(low(), -1.0);
        }
        assert_eq!(c.state().control_voltage, 8_600);
        // The edge sits at zero offset, so it takes the same two ticks to
        // leave as from rest.
        c.fast_step(high(), 1.0);
        c.fast_step(high(), 1.0);
        assert_eq!(c.state().control_voltage, 8_599);

        for _ in 0..100_000 {
            c.fast_step(high(), 1.0);
        }
        assert_eq!(c.state().control_voltage, CONTROL_VOLTAGE_FLOOR);
        c.fast_step(low(), -1.0);
        assert_eq!(c.state().control_voltage, CONTROL_VOLTAGE_FLOOR + 1);
    }

    #[test]
    fn imbalance_counter_saturates() {
        let mut n = ImbalanceCounter::default();
        for i in 1..IMBALANCE_LIMIT {
            assert_eq!(n.record(true, false), None);
            assert_eq!(n.value(), i);
        }
        assert_eq!(n.record(true, false), Some(Saturation::Overrun));
        for _ in 0..20 {
            assert_eq!(n.record(true, false), None);
            assert_eq!(n.value(), IMBALANCE_LIMIT);
        }
        assert_eq!(n.record(false, true), None);
        assert_eq!(n.value(), IMBALANCE_LIMIT - 1);
        assert_eq!(n.record(true, false), Some(Saturation::Overrun));

        let mut n = ImbalanceCounter::default();
        for _ in 0..30 {
            n.record(false, true);
            assert!(n.value() >= -IMBALANCE_LIMIT);
        }
        assert_eq!(n.value(), -IMBALANCE_LIMIT);
    }

    #[test]
    fn simultaneous_events_cancel() {
        let mut n = ImbalanceCounter::default();
        n.record(true, false);
        assert_eq!(n.record(true, true), None);
        assert_eq!(n.value(), 1);
    }

    #[test]
    fn sustained_overrun_narrows_once() {
        let mut c = controller();
        let mut events = 0;
        for cycle in 1..=20 {
            let (event, changed) = c.slow_step(true, false);
            if let Some(e) = event {
                events += 1;
                assert_eq!(cycle, IMBALANCE_LIMIT as i32);
                assert_eq!(
                    e,
                    BandEvent::HighLowered {
                        band: VoltageBand { low: CONTROL_VOLTAGE_FLOOR, high: 8_600 },
                        voltage: 8_600 - 128,
                    }
                );
                assert!(changed.voltage && !changed.divider);
            }
        }
        assert_eq!(events, 1);
        assert_eq!(c.imbalance(), IMBALANCE_LIMIT);
        assert_eq!(c.state().band.high, 8_600);

        // An underrun leaves the bound; the next overrun fires again.
        assert_eq!(c.slow_step(false, true).0, None);
        let (event, _) = c.slow_step(true, false);
        assert_eq!(
            event,
            Some(BandEvent::HighLowered {
                band: VoltageBand { low: CONTROL_VOLTAGE_FLOOR, high: 8_600 - 128 },
                voltage: 8_600 - 256,
            })
        );
    }

    #[test]
    fn sustained_underrun_raises_low() {
        let mut c = controller();
        let mut last = None;
        for _ in 0..IMBALANCE_LIMIT {
            last = c.slow_step(false, true).0;
        }
        assert_eq!(
            last,
            Some(BandEvent::LowRaised {
                band: VoltageBand { low: 8_600, high: CONTROL_VOLTAGE_CEILING },
                voltage: 8_600 + 128,
            })
        );
        assert_eq!(c.imbalance(), -IMBALANCE_LIMIT);
    }

    #[test]
    fn fast_loop_respects_narrowed_band() {
        let mut c = controller();
        for _ in 0..IMBALANCE_LIMIT {
            c.slow_step(true, false);
        }
        assert_eq!(c.state().band.high, 8_600);
        for _ in 0..10_000 {
            c.fast_step(low(), -1.0);
            assert!(c.state().control_voltage <= 8_600);
        }
        assert_eq!(c.state().control_voltage, 8_600);
    }

    #[test]
    fn band_exhaustion_stops_narrowing() {
        let mut c = controller();
        // Alternate sustained overrun and a single underrun until the high
        // edge cannot come down any further.
        let mut narrowed = 0;
        for _ in 0..200 {
            for _ in 0..IMBALANCE_LIMIT {
                if c.slow_step(true, false).0.is_some() {
                    narrowed += 1;
                }
            }
            c.slow_step(false, true);
        }
        let s = c.state();
        assert!(s.band.high >= s.band.low);
        assert!(s.control_voltage >= s.band.low);
        assert!(s.control_voltage - s.band.low <= 128);
        // (8600 - 4000) / 128 steps before the guard trips
        assert_eq!(narrowed, (8_600 - 4_000 - 1) / 128);
    }

    #[test]
    fn retune_recentres_divider_and_reopens_band() {
        let mut c = controller();
        for _ in 0..IMBALANCE_LIMIT {
            c.slow_step(true, false);
        }
        for _ in 0..50 {
            c.fast_step(high(), 1.0);
        }
        let voltage = c.state().control_voltage;

        let changed = c.retune(2_000);
        assert!(changed.divider);
        let s = c.state();
        assert_eq!(s.divider, 2_000);
        assert_eq!(s.band, VoltageBand::FULL);
        assert_eq!(s.control_voltage, voltage);
        assert_eq!(c.divider_limits(), (1_800, 2_200));
    }

    #[test]
    fn reset_restores_session_start() {
        let mut c = controller();
        for _ in 0..IMBALANCE_LIMIT {
            c.slow_step(false, true);
        }
        for _ in 0..50 {
            c.fast_step(low(), -1.0);
        }
        c.reset();
        let s = c.state();
        assert_eq!(s.divider, NOMINAL);
        assert_eq!(s.control_voltage, 8_600);
        assert_eq!(s.band, VoltageBand::FULL);
        assert_eq!(c.imbalance(), 0);
    }

    #[test]
    fn small_divider_limits() {
        let c = ClockController::new(Config::new(), 10);
        assert_eq!(c.divider_limits(), (9, 11));
        let c = ClockController::new(Config::new(), 1);
        assert_eq!(c.divider_limits(), (1, 1));
    }
}
