//! Playback transfer descriptor chain.
//!
//! The engine copies one chunk per descriptor and follows `next` links
//! forever, so the chain is a ring of [`NUM_CHUNKS`] links per output:
//!
//! ```text
//! ┌────┐   ┌────┐   ┌────┐         ┌────┐
//! │ d0 │──►│ d1 │──►│ d2 │── … ──►│ d9 │──┐
//! └────┘   └────┘   └────┘         └────┘  │
//!   ▲                                      │
//!   └──────────────────────────────────────┘
//! ```
//!
//! Descriptor `i` covers analog frames `i·CHUNK_FRAMES ..` and digital bytes
//! `i·CHUNK_FRAMES·4 ..`. Only the left analog chain raises the completion
//! interrupt, so there is exactly one
//! [`on_chunk_complete`](crate::ring::RingIndices::on_chunk_complete) per chunk.
//!
//! Descriptor handles are whatever the DMA controller hands out when
//! descriptors are allocated; [`TransferChain::locate`] maps the handle the
//! controller reports as active back to a chunk index.

use core::ops::Range;

use crate::constants::{CHUNK_FRAMES, DIGITAL_FRAME_BYTES, NUM_CHUNKS};

/// Which output a descriptor feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Output {
    /// Left 8-bit DAC.
    Left,
    /// Right 8-bit DAC.
    Right,
    /// I2S transmitter.
    Digital,
}

/// One descriptor in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link<H> {
    /// Handle of this descriptor.
    pub handle: H,
    /// Handle of the descriptor that follows.
    pub next: H,
    /// Byte range in the output's buffer.
    pub source: Range<usize>,
    /// Whether finishing this descriptor raises the completion interrupt.
    pub signals_completion: bool,
}

/// Cyclic descriptor chain for one output.
pub struct TransferChain<H> {
    output: Output,
    handles: [H; NUM_CHUNKS],
}

impl<H: Copy + PartialEq> TransferChain<H> {
    /// Build a chain over pre-allocated descriptor `handles`, in chunk order.
    pub const fn new(output: Output, handles: [H; NUM_CHUNKS]) -> Self {
        TransferChain { output, handles }
    }

    /// Output this chain feeds.
    pub fn output(&self) -> Output {
        self.output
    }

    /// Bytes moved per descriptor.
    pub fn bytes_per_chunk(&self) -> usize {
        match self.output {
            Output::Left | Output::Right => CHUNK_FRAMES,
            Output::Digital => CHUNK_FRAMES * DIGITAL_FRAME_BYTES,
        }
    }

    /// Descriptor for chunk `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= NUM_CHUNKS`.
    pub fn link(&self, index: usize) -> Link<H> {
        let len = self.bytes_per_chunk();
        Link {
            handle: self.handles[index],
            next: self.handles[(index + 1) % NUM_CHUNKS],
            source: index * len..(index + 1) * len,
            signals_completion: self.output == Output::Left,
        }
    }

    /// All descriptors in chunk order.
    pub fn links(&self) -> impl Iterator<Item = Link<H>> + '_ {
        (0..NUM_CHUNKS).map(move |i| self.link(i))
    }

    /// Descriptor the engine starts from.
    pub fn initial(&self) -> H {
        self.handles[0]
    }

    /// Chunk index of descriptor `active`, if it belongs to this chain.
    pub fn locate(&self, active: H) -> Option<usize> {
        self.handles.iter().position(|&h| h == active)
    }
}
