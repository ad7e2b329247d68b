//! # usb-audio-sink
//!
//! A `no_std`, zero-allocation USB audio sink: the host streams 16-bit stereo
//! PCM over an isochronous OUT endpoint, and the device plays it out through
//! two 8-bit DACs and an I2S transmitter, clocked from a VCXO that is steered
//! so the local sample clock tracks the host's.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Memory | [`ring`] | Sample storage plus lock-free producer/consumer indices |
//! | Ingest | [`ingest`] | USB packet unpacking, back-pressure |
//! | Playback | [`transfer`] | Cyclic DMA descriptor chain layout |
//! | Control | [`tracker`] / [`controller`] | Fill-level EMA, dual-timescale clock control |
//! | Lifecycle | [`stream`] | Idle / priming / streaming, the polling-loop step |
//! | Diagnostics | [`monitor`] | Lock-free status snapshot |
//! | Hardware | [`hal`] | Traits the board crate implements |
//!
//! ## Execution contexts
//!
//! - **Polling loop:** calls [`AudioSink::poll`] forever, plus the two USB
//!   event hooks. Owns everything except the consumer index.
//! - **Completion ISR:** calls [`RingIndices::on_chunk_complete`] once per
//!   played chunk. O(1), no locks.
//! - **Observer:** reads [`Monitor::snapshot`] whenever it likes.
//!
//! ## Quick start
//!
//! ```ignore
//! use usb_audio_sink::{AudioSink, Buffers, Config, Monitor, RingIndices, RingStore};
//!
//! static INDICES: RingIndices = RingIndices::new();
//! static MONITOR: Monitor = Monitor::new();
//!
//! #[interrupt]
//! fn DMA_DONE() {
//!     INDICES.on_chunk_complete();
//! }
//!
//! let store = cortex_m::singleton!(: RingStore = RingStore::new()).unwrap();
//! let mut sink = AudioSink::new(
//!     Config::new(), usb_out, divider, dma, vcxo_pwm,
//!     Buffers { store, indices: &INDICES, monitor: &MONITOR },
//! )?;
//! sink.init()?;
//!
//! loop {
//!     sink.poll()?;
//! }
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `defmt` | no | `defmt::Format` on public state and error types |
//!
//! ## Audio parameters
//!
//! - **Packet:** up to 96 stereo frames ([`constants::CHUNK_FRAMES`])
//! - **Ring:** 10 chunks, 960 frames ([`constants::BUFFER_FRAMES`])
//! - **Target fill:** half the ring ([`constants::TARGET_FILL`])
//! - **Analog output:** 8-bit offset binary, mid-scale 128
//! - **Digital output:** 16-bit big-endian words, left then right

#![no_std]

pub mod constants;
pub mod config;
pub mod error;
pub mod hal;
pub mod ring;
pub mod ingest;
pub mod transfer;
pub mod tracker;
pub mod controller;
pub mod monitor;
pub mod stream;


pub use config::{decode_sample_rate, Config, ConfigError};
pub use controller::{BandEvent, ClockController, ClockState, VoltageBand};
pub use error::Error;
pub use hal::{AudioLink, SampleClock, TransferEngine};
pub use monitor::{Monitor, Snapshot, StatusFlags};
pub use ring::{RingIndices, RingStore};
pub use stream::{AudioSink, Buffers, SinkError, StreamState};
