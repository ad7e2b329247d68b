//! Tunable control-loop parameters.
//!
//! The hysteresis margins, step sizes and filter constant below were tuned on
//! hardware rather than derived, so they live in [`Config`] instead of
//! [`constants`](crate::constants). Everything here can be changed without
//! touching the buffer geometry.

use crate::constants::{BUFFER_FRAMES, CONTROL_VOLTAGE_CEILING, CONTROL_VOLTAGE_FLOOR, TARGET_FILL};

/// Control-loop configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// EMA weight given to each new fill measurement.
    pub ema_alpha: f32,
    /// Ingest cycles between fast-loop decisions.
    pub adjust_interval: u16,
    /// Frames above the target before the fast loop speeds the clock up.
    pub margin_hi: u16,
    /// Frames below the target before the fast loop slows the clock down.
    pub margin_lo: u16,
    /// Amount integrated into both clock accumulators per fast-loop step.
    pub adjust_tick: f32,
    /// Control-voltage step applied when the adaptive band narrows.
    pub band_step: u16,
    /// Control voltage written at the start of every streaming session.
    pub initial_control_voltage: u16,
    /// Frequency of the clock the sample-clock divider is fed from.
    pub master_clock_hz: u32,
    /// Bit clocks per I2S word-select period.
    pub word_select_bits: u32,
    /// Sample rate assumed until the host announces one.
    pub default_sample_rate: u32,
    /// Spin iterations to wait for the receive stage before giving up.
    pub receive_spin_limit: u32,
}

/// Reason a [`Config`] was rejected by [`Config::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `ema_alpha` is not in `(0, 1]`.
    Alpha,
    /// `adjust_interval` is zero.
    AdjustInterval,
    /// A hysteresis margin reaches past the buffer edge.
    Margin,
    /// `adjust_tick` is not a positive finite number.
    AdjustTick,
    /// `band_step` is zero or wider than the device range.
    BandStep,
    /// `initial_control_voltage` lies outside the device range.
    InitialVoltage,
    /// Master clock, word select or default sample rate is zero.
    Clock,
}

impl Config {
    /// Values the reference hardware was tuned with.
    pub const fn new() -> Self {
        Config {
            ema_alpha: 0.1,
            adjust_interval: 10,
            margin_hi: 100,
            margin_lo: 100,
            adjust_tick: 0.8,
            band_step: 128,
            initial_control_voltage: 8_600,
            master_clock_hz: 64_000_000,
            word_select_bits: 64,
            default_sample_rate: 48_000,
            receive_spin_limit: 10_000,
        }
    }

    /// Check that every field is usable by the control loops.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ConfigError::Alpha);
        }
        if self.adjust_interval == 0 {
            return Err(ConfigError::AdjustInterval);
        }
        if self.margin_hi as usize >= BUFFER_FRAMES - TARGET_FILL
            || self.margin_lo as usize >= TARGET_FILL
        {
            return Err(ConfigError::Margin);
        }
        if !(self.adjust_tick.is_finite() && self.adjust_tick > 0.0) {
            return Err(ConfigError::AdjustTick);
        }
        if self.band_step == 0 || self.band_step >= CONTROL_VOLTAGE_CEILING - CONTROL_VOLTAGE_FLOOR {
            return Err(ConfigError::BandStep);
        }
        if !(CONTROL_VOLTAGE_FLOOR..=CONTROL_VOLTAGE_CEILING).contains(&self.initial_control_voltage) {
            return Err(ConfigError::InitialVoltage);
        }
        if self.master_clock_hz == 0 || self.word_select_bits == 0 || self.default_sample_rate == 0 {
            return Err(ConfigError::Clock);
        }
        Ok(())
    }

    /// Sample-clock divider that produces `rate_hz` from the master clock.
    ///
    /// The I2S block needs a clock at twice its bit rate, hence the factor of
    /// two. Returns at least 1 so the clamp range is never empty.
    pub fn nominal_divider(&self, rate_hz: u32) -> u16 {
        if rate_hz == 0 {
            return u16::MAX;
        }
        let bit_clock = 2.0 * rate_hz as f32 * self.word_select_bits as f32;
        let divider = libm::roundf(self.master_clock_hz as f32 / bit_clock);
        divider.clamp(1.0, u16::MAX as f32) as u16
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the 3-byte little-endian sampling frequency sent with the USB audio
/// `SET_CUR` sampling-frequency request.
pub fn decode_sample_rate(raw: [u8; 3]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], 0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::new().validate(), Ok(()));
        assert_eq!(Config::default(), Config::new());
    }

    #[test]
    fn rejects_bad_alpha() {
        let mut cfg = Config::new();
        cfg.ema_alpha = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::Alpha));
        cfg.ema_alpha = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::Alpha));
        cfg.ema_alpha = f32::NAN;
        assert_eq!(cfg.validate(), Err(ConfigError::Alpha));
        cfg.ema_alpha = 1.0;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn rejects_each_bad_field() {
        let cases: [(fn(&mut Config), ConfigError); 7] = [
            (|c| c.adjust_interval = 0, ConfigError::AdjustInterval),
            (|c| c.margin_hi = TARGET_FILL as u16, ConfigError::Margin),
            (|c| c.margin_lo = TARGET_FILL as u16, ConfigError::Margin),
            (|c| c.adjust_tick = -1.0, ConfigError::AdjustTick),
            (|c| c.band_step = 0, ConfigError::BandStep),
            (|c| c.initial_control_voltage = 3_999, ConfigError::InitialVoltage),
            (|c| c.master_clock_hz = 0, ConfigError::Clock),
        ];
        for (mutate, expected) in cases {
            let mut cfg = Config::new();
            mutate(&mut cfg);
            assert_eq!(cfg.validate(), Err(expected));
        }
    }

    #[test]
    fn divider_from_rate() {
        let cfg = Config::new();
        // 64 MHz / (2 * 48 kHz * 64) = 10.42
        assert_eq!(cfg.nominal_divider(48_000), 10);
        // 64 MHz / (2 * 44.1 kHz * 64) = 11.34
        assert_eq!(cfg.nominal_divider(44_100), 11);
        // 64 MHz / (2 * 32 kHz * 64) = 15.625
        assert_eq!(cfg.nominal_divider(32_000), 16);
    }

    #[test]
    fn divider_never_zero() {
        let cfg = Config::new();
        assert_eq!(cfg.nominal_divider(10_000_000), 1);
        assert_eq!(cfg.nominal_divider(0), u16::MAX);
    }

    #[test]
    fn decodes_usb_sample_rate() {
        // 48000 = 0x00BB80
        assert_eq!(decode_sample_rate([0x80, 0xBB, 0x00]), 48_000);
        // 44100 = 0x00AC44
        assert_eq!(decode_sample_rate([0x44, 0xAC, 0x00]), 44_100);
    }
}
