//! Ingest path: USB OUT packets into the ring.
//!
//! ## Packet Format
//!
//! Each isochronous packet carries interleaved stereo frames of 16-bit signed
//! little-endian PCM:
//!
//! ```text
//! byte:   0      1      2      3
//!       ┌──────┬──────┬──────┬──────┐
//!       │ L lo │ L hi │ R lo │ R hi │  × up to 96 frames
//!       └──────┴──────┴──────┴──────┘
//! ```
//!
//! Per frame this produces:
//! - analog L/R: the high byte converted to offset binary (`hi + 128`), which
//!   is the code the 8-bit DACs expect;
//! - digital: `[L hi, L lo, R hi, R lo]`, the big-endian word order the I2S
//!   transmitter shifts out MSB first.
//!
//! ## Back-pressure
//!
//! When the fill level passes the high-water mark after a packet, the *next*
//! packet is read off the endpoint and dropped. The one-packet delay keeps the
//! check to a single comparison per cycle; the clock controller is what
//! actually removes the imbalance.

use crate::constants::{ANALOG_MIDSCALE, HIGH_WATER_FRAMES, MAX_PACKET_BYTES, PACKET_FRAME_BYTES};
use crate::hal::AudioLink;
use crate::ring::{Frame, RingIndices, RingStore};

/// Outcome of one [`Ingest::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// The packet was unpacked; holds the number of frames appended.
    Appended(usize),
    /// The packet was dropped because of back-pressure.
    Discarded,
}

/// Convert one 4-byte USB frame into the stored representation.
///
/// # Panics
///
/// Debug-asserts that `src` is exactly one frame long.
pub fn unpack_frame(src: &[u8]) -> Frame {
    debug_assert_eq!(src.len(), PACKET_FRAME_BYTES);

    Frame {
        left: src[1].wrapping_add(ANALOG_MIDSCALE),
        right: src[3].wrapping_add(ANALOG_MIDSCALE),
        digital: [src[1], src[0], src[3], src[2]],
    }
}

/// Iterate over the complete frames in `packet`. A trailing partial frame is
/// ignored.
pub fn unpack(packet: &[u8]) -> impl Iterator<Item = Frame> + '_ {
    packet.chunks_exact(PACKET_FRAME_BYTES).map(unpack_frame)
}

/// Ingest-path state owned by the polling loop.
pub struct Ingest {
    packet: [u8; MAX_PACKET_BYTES],
    /// Drop the next packet.
    skip_next: bool,
    /// High-water was crossed and the slow loop has not seen it yet.
    overrun_pending: bool,
    /// Packets dropped since power-up.
    dropped: u32,
}

impl Ingest {
    /// Create an idle ingest path.
    pub const fn new() -> Self {
        Ingest {
            packet: [0; MAX_PACKET_BYTES],
            skip_next: false,
            overrun_pending: false,
            dropped: 0,
        }
    }

    /// Clear per-session back-pressure state.
    pub fn reset(&mut self) {
        self.skip_next = false;
        self.overrun_pending = false;
    }

    /// Take the packet waiting on `link`, either appending it to the ring or
    /// dropping it.
    ///
    /// The wait for the link's receive stage is bounded by `spin_limit`
    /// iterations; the endpoint is re-armed in both paths.
    pub fn receive<L: AudioLink>(
        &mut self,
        link: &mut L,
        store: &mut RingStore,
        indices: &RingIndices,
        spin_limit: u32,
    ) -> Result<Received, L::Error> {
        if self.skip_next {
            self.skip_next = false;
            self.dropped = self.dropped.wrapping_add(1);
            link.rearm()?;
            return Ok(Received::Discarded);
        }

        let size = link.read_packet(&mut self.packet)?.min(MAX_PACKET_BYTES);

        let mut spins = 0;
        while link.receive_busy() {
            if spins >= spin_limit {
                log::warn!("receive stage still busy after {} spins", spins);
                break;
            }
            spins += 1;
            core::hint::spin_loop();
        }
        link.rearm()?;

        let start = indices.producer();
        let end = store.write(start, unpack(&self.packet[..size]));
        indices.publish_producer(end);

        Ok(Received::Appended(size / PACKET_FRAME_BYTES))
    }

    /// Apply the high-water check for this cycle's fill level.
    ///
    /// Returns `true` if back-pressure was raised (next packet will drop).
    pub fn check_high_water(&mut self, fill: usize) -> bool {
        if fill > HIGH_WATER_FRAMES {
            self.skip_next = true;
            self.overrun_pending = true;
            true
        } else {
            false
        }
    }

    /// Whether the previous cycle raised back-pressure. Reading clears it.
    pub fn take_overrun(&mut self) -> bool {
        core::mem::take(&mut self.overrun_pending)
    }

    /// Whether the next packet is going to be dropped.
    pub fn dropping(&self) -> bool {
        self.skip_next
    }

    /// Packets dropped since power-up (wrapping).
    pub fn dropped_packets(&self) -> u32 {
        self.dropped
    }
}

impl Default for Ingest {
    fn default() -> Self {
        Self::new()
    }
}
