//! Stream lifecycle and the polling-loop step.
//!
//! [`AudioSink`] is the context object for one device: it owns the hardware
//! handles and the loop-side state, and borrows the ring (shared with the
//! completion interrupt) and the monitor (shared with the diagnostics reader).
//!
//! ## State machine
//!
//! ```text
//!            configuration(on)             fill ≥ C/2
//!   ┌──────┐ ─────────────────► ┌─────────┐ ──────────► ┌───────────┐
//!   │ Idle │                    │ Priming │             │ Streaming │
//!   └──────┘ ◄───────────────── └─────────┘             └───────────┘
//!      ▲        configuration(off)                            │
//!      └──────────────────────────────────────────────────────┘
//!                          configuration(off)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! static INDICES: RingIndices = RingIndices::new();
//! static MONITOR: Monitor = Monitor::new();
//!
//! let store = cortex_m::singleton!(: RingStore = RingStore::new()).unwrap();
//! let mut sink = AudioSink::new(
//!     Config::new(), link, clock, engine, vcxo,
//!     Buffers { store, indices: &INDICES, monitor: &MONITOR },
//! )?;
//! sink.init()?;
//!
//! loop {
//!     if usb.configuration_changed() {
//!         sink.on_configuration_changed(usb.alt_setting(AUDIO_INTERFACE) != 0)?;
//!         if let Some(raw) = usb.take_sample_rate() {
//!             sink.on_sample_rate_changed(decode_sample_rate(raw))?;
//!         }
//!     }
//!     sink.poll()?;
//! }
//! ```

use embedded_hal::pwm::{ErrorType, SetDutyCycle};

use crate::config::{Config, ConfigError};
use crate::constants::{ANALOG_MIDSCALE, CHUNK_FRAMES, CONTROL_VOLTAGE_CEILING, NUM_CHUNKS, TARGET_FILL};
use crate::controller::{BandEvent, Changed, ClockController};
use crate::error::Error;
use crate::hal::{AudioLink, SampleClock, TransferEngine};
use crate::ingest::{Ingest, Received};
use crate::monitor::{Monitor, Snapshot, StatusFlags};
use crate::ring::{RingIndices, RingStore};
use crate::tracker::FillTracker;

/// Where the stream is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamState {
    /// Host is not streaming.
    Idle,
    /// Host is streaming; buffer filling, engine and sample clock held.
    Priming,
    /// Engine running.
    Streaming,
}

/// Error type returned by [`AudioSink`] for a given set of collaborators.
pub type SinkError<L, C, T, V> = Error<
    <L as AudioLink>::Error,
    <C as SampleClock>::Error,
    <T as TransferEngine>::Error,
    <V as ErrorType>::Error,
>;

/// Memory shared with other execution contexts.
pub struct Buffers<'a> {
    /// Sample storage the transfer engine reads from.
    pub store: &'a mut RingStore,
    /// Indices shared with the completion interrupt.
    pub indices: &'a RingIndices,
    /// Snapshot shared with the diagnostics reader.
    pub monitor: &'a Monitor,
}

/// USB audio sink: ingest, tracking, clock control and lifecycle.
pub struct AudioSink<'a, L, C, T, V> {
    config: Config,
    state: StreamState,
    link: L,
    clock: C,
    engine: T,
    vcxo: V,
    store: &'a mut RingStore,
    indices: &'a RingIndices,
    monitor: &'a Monitor,
    ingest: Ingest,
    tracker: FillTracker,
    controller: ClockController,
}

impl<'a, L, C, T, V> AudioSink<'a, L, C, T, V>
where
    L: AudioLink,
    C: SampleClock,
    T: TransferEngine,
    V: SetDutyCycle,
{
    /// Build a sink in [`StreamState::Idle`]. Nothing is written to hardware
    /// until [`init()`](Self::init).
    pub fn new(
        config: Config,
        link: L,
        clock: C,
        engine: T,
        vcxo: V,
        buffers: Buffers<'a>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let nominal = config.nominal_divider(config.default_sample_rate);
        Ok(AudioSink {
            config,
            state: StreamState::Idle,
            link,
            clock,
            engine,
            vcxo,
            store: buffers.store,
            indices: buffers.indices,
            monitor: buffers.monitor,
            ingest: Ingest::new(),
            tracker: FillTracker::new(config.ema_alpha, config.adjust_interval),
            controller: ClockController::new(config, nominal),
        })
    }

    /// Bring the clock outputs to their initial values with the sample clock
    /// gated and the analog outputs at mid-scale.
    pub fn init(&mut self) -> Result<(), SinkError<L, C, T, V>> {
        if self.vcxo.max_duty_cycle() < CONTROL_VOLTAGE_CEILING {
            log::warn!(
                "control voltage output tops out at {}, below {}",
                self.vcxo.max_duty_cycle(),
                CONTROL_VOLTAGE_CEILING
            );
        }
        self.clock.stop().map_err(Error::Clock)?;
        self.write_clock(Changed { divider: true, voltage: true })?;
        self.engine.park_outputs(ANALOG_MIDSCALE).map_err(Error::Transfer)?;
        self.publish();
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Clock controller (read-only).
    pub fn controller(&self) -> &ClockController {
        &self.controller
    }

    /// Fill tracker (read-only).
    pub fn tracker(&self) -> &FillTracker {
        &self.tracker
    }

    /// Ring sample storage (read-only).
    pub fn store(&self) -> &RingStore {
        &*self.store
    }

    /// USB link handle.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Sample clock handle.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Sample clock handle (mutable).
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Transfer engine handle.
    pub fn engine_mut(&mut self) -> &mut T {
        &mut self.engine
    }

    /// Control-voltage output handle.
    pub fn vcxo(&self) -> &V {
        &self.vcxo
    }

    /// Host switched the audio interface's alternate setting.
    ///
    /// `streaming == true` starts a fresh session (restarting one already in
    /// progress); `false` stops playback and parks the ring.
    pub fn on_configuration_changed(&mut self, streaming: bool) -> Result<(), SinkError<L, C, T, V>> {
        if streaming {
            if self.state != StreamState::Idle {
                self.stop()?;
            }
            self.start()
        } else {
            self.stop()
        }
    }

    /// Host announced a new nominal sample rate.
    pub fn on_sample_rate_changed(&mut self, rate_hz: u32) -> Result<(), SinkError<L, C, T, V>> {
        let nominal = self.config.nominal_divider(rate_hz);
        let changed = self.controller.retune(nominal);
        log::debug!("sample rate {} Hz, divider {}", rate_hz, nominal);
        self.write_clock(changed)?;
        self.publish();
        Ok(())
    }

    /// One polling-loop step.
    ///
    /// Returns `Ok(false)` if no packet was waiting (or the stream is idle).
    pub fn poll(&mut self) -> Result<bool, SinkError<L, C, T, V>> {
        if self.state == StreamState::Idle || !self.link.packet_available() {
            return Ok(false);
        }

        let received = self
            .ingest
            .receive(&mut self.link, self.store, self.indices, self.config.receive_spin_limit)
            .map_err(Error::Link)?;
        if received == Received::Discarded {
            log::trace!("packet dropped, fill {}", self.indices.fill());
        }

        if self.state == StreamState::Priming {
            let fill = self.indices.fill();
            self.tracker.seed(fill);
            if fill >= TARGET_FILL {
                self.begin_playback(fill)?;
            }
        }

        let fill = self.indices.fill();
        let overrun = self.ingest.take_overrun();
        let underrun = self.indices.take_underrun();

        if self.state == StreamState::Streaming {
            let handoff = self.tracker.update(fill);
            let (event, mut changed) = self.controller.slow_step(overrun, underrun);
            match event {
                Some(BandEvent::HighLowered { band, voltage }) => {
                    log::warn!("sustained overrun: band {}..{}, voltage {}", band.low, band.high, voltage)
                }
                Some(BandEvent::LowRaised { band, voltage }) => {
                    log::warn!("sustained underrun: band {}..{}, voltage {}", band.low, band.high, voltage)
                }
                None => {}
            }
            if let Some((smoothed, trend)) = handoff {
                let (_, fast) = self.controller.fast_step(smoothed, trend);
                changed = changed.merge(fast);
            }
            self.write_clock(changed)?;
        }

        self.ingest.check_high_water(fill);
        self.publish_with(underrun);
        Ok(true)
    }

    fn start(&mut self) -> Result<(), SinkError<L, C, T, V>> {
        self.ingest.reset();
        self.tracker.reset();
        self.controller.reset();
        // Starvation from a previous session is stale.
        self.indices.take_underrun();

        self.clock.stop().map_err(Error::Clock)?;
        self.engine.park_outputs(ANALOG_MIDSCALE).map_err(Error::Transfer)?;
        self.write_clock(Changed { divider: true, voltage: true })?;
        self.link.rearm().map_err(Error::Link)?;

        self.state = StreamState::Priming;
        log::info!("audio on, divider {}", self.controller.state().divider);
        self.publish();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError<L, C, T, V>> {
        if self.state == StreamState::Idle {
            return Ok(());
        }

        // State stays put until the whole sequence succeeds, so a failed
        // stop can be retried.
        self.clock.stop().map_err(Error::Clock)?;
        self.engine.cancel().map_err(Error::Transfer)?;
        let mut chunk = self.engine.active_chunk().map_err(Error::Transfer)?;
        if chunk >= NUM_CHUNKS {
            log::warn!("engine reported chunk {} outside the chain", chunk);
            chunk = 0;
        }
        self.indices.resync(chunk * CHUNK_FRAMES);
        self.tracker.park();
        self.engine.park_outputs(ANALOG_MIDSCALE).map_err(Error::Transfer)?;
        self.state = StreamState::Idle;

        log::info!("audio off at chunk {}", chunk);
        self.publish();
        Ok(())
    }

    fn begin_playback(&mut self, fill: usize) -> Result<(), SinkError<L, C, T, V>> {
        let divider = self.controller.state().divider;
        self.engine.start().map_err(Error::Transfer)?;
        self.clock.start(divider).map_err(Error::Clock)?;
        self.state = StreamState::Streaming;
        log::debug!(
            "playback start: divider {}, consumer {}, fill {}",
            divider,
            self.indices.consumer(),
            fill
        );
        Ok(())
    }

    /// Write the outputs flagged in `changed`.
    fn write_clock(&mut self, changed: Changed) -> Result<(), SinkError<L, C, T, V>> {
        let s = self.controller.state();
        if changed.divider {
            self.clock.set_divider(s.divider).map_err(Error::Clock)?;
            log::trace!("divider {}", s.divider);
        }
        if changed.voltage {
            self.vcxo.set_duty_cycle(s.control_voltage).map_err(Error::ControlVoltage)?;
            log::trace!("control voltage {}", s.control_voltage);
        }
        Ok(())
    }

    fn publish(&self) {
        self.publish_with(false);
    }

    fn publish_with(&self, starved: bool) {
        let clock = self.controller.state();
        let sample = self.tracker.sample();
        self.monitor.publish(&Snapshot {
            divider: clock.divider,
            raw_fill: sample.raw_fill as u16,
            smoothed_fill: sample.smoothed_fill as u16,
            trend: sample.trend as i16,
            control_voltage: clock.control_voltage,
            producer_index: self.indices.producer() as u16,
            consumer_index: self.indices.consumer() as u16,
            status_flags: StatusFlags::new(
                self.state == StreamState::Streaming,
                starved,
                self.ingest.dropping(),
            ),
            imbalance: self.controller.imbalance(),
            dropped_packets: self.ingest.dropped_packets(),
            starved_chunks: self.indices.starved_chunks(),
        });
    }
}
