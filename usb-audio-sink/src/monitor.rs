//! Diagnostics snapshot.
//!
//! The polling loop publishes its state here once per cycle. Every field is
//! its own atomic word, so an observer (an I2C slave ISR, a debugger, a
//! status display) can read at any time without locking. A read may mix
//! values from two consecutive cycles, but each value is whole.

use core::sync::atomic::{AtomicI16, AtomicI8, AtomicU16, AtomicU32, AtomicU8, Ordering};

/// Stream status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    /// Transfer engine running.
    pub const STREAMING: u8 = 1 << 0;
    /// A completed chunk found fewer than two chunks buffered last cycle.
    pub const STARVED: u8 = 1 << 1;
    /// The next USB packet will be dropped.
    pub const DROPPING: u8 = 1 << 2;

    /// Build from individual conditions.
    pub fn new(streaming: bool, starved: bool, dropping: bool) -> Self {
        let mut bits = 0;
        if streaming {
            bits |= Self::STREAMING;
        }
        if starved {
            bits |= Self::STARVED;
        }
        if dropping {
            bits |= Self::DROPPING;
        }
        StatusFlags(bits)
    }

    /// Whether every bit in `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }
}

/// Point-in-time copy of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    /// Sample-clock divider in use.
    pub divider: u16,
    /// Fill level measured on the last cycle, in frames.
    pub raw_fill: u16,
    /// EMA of the fill level, truncated.
    pub smoothed_fill: u16,
    /// Change of the smoothed level over the last hand-off, truncated.
    pub trend: i16,
    /// VCXO control voltage code.
    pub control_voltage: u16,
    /// Next frame the ingest path writes.
    pub producer_index: u16,
    /// First frame of the chunk the engine plays next.
    pub consumer_index: u16,
    /// Stream status bits.
    pub status_flags: StatusFlags,
    /// Imbalance counter, overruns minus underruns.
    pub imbalance: i8,
    /// Packets dropped by back-pressure since power-up.
    pub dropped_packets: u32,
    /// Chunks completed with the ring nearly empty since power-up.
    pub starved_chunks: u32,
}

/// Lock-free published state.
pub struct Monitor {
    divider: AtomicU16,
    raw_fill: AtomicU16,
    smoothed_fill: AtomicU16,
    trend: AtomicI16,
    control_voltage: AtomicU16,
    producer_index: AtomicU16,
    consumer_index: AtomicU16,
    status_flags: AtomicU8,
    imbalance: AtomicI8,
    dropped_packets: AtomicU32,
    starved_chunks: AtomicU32,
}

impl Monitor {
    /// All-zero monitor, suitable for a `static`.
    pub const fn new() -> Self {
        Monitor {
            divider: AtomicU16::new(0),
            raw_fill: AtomicU16::new(0),
            smoothed_fill: AtomicU16::new(0),
            trend: AtomicI16::new(0),
            control_voltage: AtomicU16::new(0),
            producer_index: AtomicU16::new(0),
            consumer_index: AtomicU16::new(0),
            status_flags: AtomicU8::new(0),
            imbalance: AtomicI8::new(0),
            dropped_packets: AtomicU32::new(0),
            starved_chunks: AtomicU32::new(0),
        }
    }

    /// Publish `s` (polling loop only).
    pub fn publish(&self, s: &Snapshot) {
        self.divider.store(s.divider, Ordering::Relaxed);
        self.raw_fill.store(s.raw_fill, Ordering::Relaxed);
        self.smoothed_fill.store(s.smoothed_fill, Ordering::Relaxed);
        self.trend.store(s.trend, Ordering::Relaxed);
        self.control_voltage.store(s.control_voltage, Ordering::Relaxed);
        self.producer_index.store(s.producer_index, Ordering::Relaxed);
        self.consumer_index.store(s.consumer_index, Ordering::Relaxed);
        self.status_flags.store(s.status_flags.0, Ordering::Relaxed);
        self.imbalance.store(s.imbalance, Ordering::Relaxed);
        self.dropped_packets.store(s.dropped_packets, Ordering::Relaxed);
        self.starved_chunks.store(s.starved_chunks, Ordering::Relaxed);
    }

    /// Read every field.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            divider: self.divider.load(Ordering::Relaxed),
            raw_fill: self.raw_fill.load(Ordering::Relaxed),
            smoothed_fill: self.smoothed_fill.load(Ordering::Relaxed),
            trend: self.trend.load(Ordering::Relaxed),
            control_voltage: self.control_voltage.load(Ordering::Relaxed),
            producer_index: self.producer_index.load(Ordering::Relaxed),
            consumer_index: self.consumer_index.load(Ordering::Relaxed),
            status_flags: StatusFlags(self.status_flags.load(Ordering::Relaxed)),
            imbalance: self.imbalance.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
            starved_chunks: self.starved_chunks.load(Ordering::Relaxed),
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
