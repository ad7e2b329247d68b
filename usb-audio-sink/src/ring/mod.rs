//! Ring buffer shared by the ingest path and the playback transfer engine.
//!
//! ## Layout
//!
//! ```text
//!                 producer_index (polling loop)
//!                        │
//!   left    ┌────┬────┬──▼─┬────┬────┬────┬────┬────┬────┬────┐  1 B/frame
//!   right   │ c0 │ c1 │ c2 │ c3 │ c4 │ c5 │ c6 │ c7 │ c8 │ c9 │  1 B/frame
//!   digital └────┴─▲──┴────┴────┴────┴────┴────┴────┴────┴────┘  4 B/frame
//!                  │
//!                 consumer_index (completion ISR, one chunk per step)
//! ```
//!
//! All three buffers are indexed by the same frame position; only the byte
//! stride differs. The indices live in [`RingIndices`] so they can be shared
//! with the completion interrupt, while the sample storage in [`RingStore`] is
//! written only by the polling loop and read only by DMA hardware.

pub mod indices;
pub mod store;

pub use indices::{distance, RingIndices};
pub use store::{Frame, RingStore};
