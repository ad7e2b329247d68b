//! Sample storage for the three output buffers.

use crate::constants::{ANALOG_MIDSCALE, BUFFER_FRAMES, DIGITAL_FRAME_BYTES};

/// One frame as stored in the three buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// 8-bit unsigned DAC code, left channel.
    pub left: u8,
    /// 8-bit unsigned DAC code, right channel.
    pub right: u8,
    /// I2S words: left then right, each big-endian.
    pub digital: [u8; DIGITAL_FRAME_BYTES],
}

impl Frame {
    /// Silence on every output.
    pub const SILENT: Frame = Frame {
        left: ANALOG_MIDSCALE,
        right: ANALOG_MIDSCALE,
        digital: [0; DIGITAL_FRAME_BYTES],
    };
}

/// Left, right and digital buffers, all `BUFFER_FRAMES` frames long.
///
/// DMA descriptors point into these arrays, so a `RingStore` is meant to be
/// placed in a `static` and never moved once the transfer engine is armed.
pub struct RingStore {
    left: [u8; BUFFER_FRAMES],
    right: [u8; BUFFER_FRAMES],
    digital: [u8; BUFFER_FRAMES * DIGITAL_FRAME_BYTES],
}

impl RingStore {
    /// Buffers pre-filled with silence so a starved engine replays silence
    /// rather than garbage on first start.
    pub const fn new() -> Self {
        RingStore {
            left: [ANALOG_MIDSCALE; BUFFER_FRAMES],
            right: [ANALOG_MIDSCALE; BUFFER_FRAMES],
            digital: [0; BUFFER_FRAMES * DIGITAL_FRAME_BYTES],
        }
    }

    /// Write `frames` starting at frame `start`, wrapping at the end.
    ///
    /// Never blocks and never refuses data: the caller is responsible for
    /// capacity (see the ingest path's overrun handling). Returns the frame
    /// index after the last one written.
    pub fn write<I>(&mut self, start: usize, frames: I) -> usize
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut at = start % BUFFER_FRAMES;
        for frame in frames {
            self.left[at] = frame.left;
            self.right[at] = frame.right;
            let d = at * DIGITAL_FRAME_BYTES;
            self.digital[d..d + DIGITAL_FRAME_BYTES].copy_from_slice(&frame.digital);
            at = (at + 1) % BUFFER_FRAMES;
        }
        at
    }

    /// Read back the frame at `index`.
    pub fn frame(&self, index: usize) -> Frame {
        let at = index % BUFFER_FRAMES;
        let d = at * DIGITAL_FRAME_BYTES;
        let mut digital = [0; DIGITAL_FRAME_BYTES];
        digital.copy_from_slice(&self.digital[d..d + DIGITAL_FRAME_BYTES]);
        Frame {
            left: self.left[at],
            right: self.right[at],
            digital,
        }
    }

    /// Left analog buffer (DMA source).
    pub fn left(&self) -> &[u8; BUFFER_FRAMES] {
        &self.left
    }

    /// Right analog buffer (DMA source).
    pub fn right(&self) -> &[u8; BUFFER_FRAMES] {
        &self.right
    }

    /// Digital buffer (DMA source).
    pub fn digital(&self) -> &[u8; BUFFER_FRAMES * DIGITAL_FRAME_BYTES] {
        &self.digital
    }
}

impl Default for RingStore {
    fn default() -> Self {
        Self::new()
    }
}
