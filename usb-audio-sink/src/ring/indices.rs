//! Producer/consumer indices shared between the polling loop and the
//! transfer-complete interrupt.
//!
//! # Ownership Contract
//!
//! Every field has exactly one writer:
//!
//! | Field | Writer | Readers |
//! |-------|--------|---------|
//! | `producer` | polling loop | ISR, loop |
//! | `consumer` | completion ISR (and lifecycle while the engine is stopped) | loop |
//! | `starved` | completion ISR | loop |
//!
//! With a single writer per word, plain atomic loads and stores are enough;
//! no read-modify-write instruction or critical section is needed, which keeps
//! this usable on cores without `LDREX`/`STREX`.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::constants::{BUFFER_FRAMES, CHUNK_FRAMES, LOW_WATER_FRAMES};

/// Forward distance in frames from `consumer` to `producer`.
///
/// Always computed with unsigned modular arithmetic so that wraparound
/// (`producer < consumer`) yields the true distance.
pub const fn distance(producer: usize, consumer: usize) -> usize {
    (producer % BUFFER_FRAMES + BUFFER_FRAMES - consumer % BUFFER_FRAMES) % BUFFER_FRAMES
}

/// Shared ring indices.
///
/// Intended to live in a `static` so the completion interrupt can reach it:
///
/// ```ignore
/// static INDICES: RingIndices = RingIndices::new();
///
/// #[interrupt]
/// fn DMA_DONE() {
///     INDICES.on_chunk_complete();
/// }
/// ```
pub struct RingIndices {
    /// Next frame the ingest path writes.
    producer: AtomicUsize,
    /// First frame of the chunk the engine transfers next.
    consumer: AtomicUsize,
    /// Completed chunks that found the buffer nearly empty.
    starved: AtomicU32,
    /// Loop-side copy of `starved` as of the last [`take_underrun()`](Self::take_underrun).
    ///
    /// Only the polling loop touches this.
    starved_seen: AtomicU32,
}

impl RingIndices {
    /// Create indices with both positions at frame 0 (empty ring).
    pub const fn new() -> Self {
        RingIndices {
            producer: AtomicUsize::new(0),
            consumer: AtomicUsize::new(0),
            starved: AtomicU32::new(0),
            starved_seen: AtomicU32::new(0),
        }
    }

    /// Current producer position.
    pub fn producer(&self) -> usize {
        self.producer.load(Ordering::Acquire)
    }

    /// Current consumer position.
    pub fn consumer(&self) -> usize {
        self.consumer.load(Ordering::Acquire)
    }

    /// Frames written but not yet handed to the transfer engine.
    pub fn fill(&self) -> usize {
        distance(self.producer(), self.consumer())
    }

    /// Publish a new producer position (polling loop only).
    ///
    /// Release ordering makes the sample writes that preceded this call
    /// visible before the index moves.
    pub fn publish_producer(&self, index: usize) {
        self.producer.store(index % BUFFER_FRAMES, Ordering::Release);
    }

    /// Move the consumer forward by one chunk (completion ISR only).
    pub fn advance_consumer(&self) {
        let next = (self.consumer.load(Ordering::Relaxed) + CHUNK_FRAMES) % BUFFER_FRAMES;
        self.consumer.store(next, Ordering::Release);
    }

    /// Transfer-complete handler.
    ///
    /// Advances the consumer one chunk and records a starvation event if
    /// fewer than two chunks remain. The engine is left running either way;
    /// starvation only replays stale samples.
    ///
    /// O(1), touches only `consumer` and the starvation counter.
    pub fn on_chunk_complete(&self) {
        self.advance_consumer();
        if self.fill() < LOW_WATER_FRAMES {
            let n = self.starved.load(Ordering::Relaxed);
            self.starved.store(n.wrapping_add(1), Ordering::Release);
        }
    }

    /// Whether any starvation event happened since the previous call
    /// (polling loop only). Reading clears the condition.
    pub fn take_underrun(&self) -> bool {
        let now = self.starved.load(Ordering::Acquire);
        let seen = self.starved_seen.load(Ordering::Relaxed);
        self.starved_seen.store(now, Ordering::Relaxed);
        now != seen
    }

    /// Total starvation events since power-up (wrapping).
    pub fn starved_chunks(&self) -> u32 {
        self.starved.load(Ordering::Acquire)
    }

    /// Place both indices at `frame` (lifecycle only, engine stopped).
    pub fn resync(&self, frame: usize) {
        let frame = frame % BUFFER_FRAMES;
        self.consumer.store(frame, Ordering::Release);
        self.producer.store(frame, Ordering::Release);
    }
}

impl Default for RingIndices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_CHUNKS;

    #[test]
    fn distance_matches_forward_walk() {
        // Exhaustive over a coarse grid including both wrap directions.
        for producer in (0..BUFFER_FRAMES).step_by(7) {
            for consumer in (0..BUFFER_FRAMES).step_by(11) {
                let mut walked = 0;
                let mut pos = consumer;
                while pos != producer {
                    pos = (pos + 1) % BUFFER_FRAMES;
                    walked += 1;
                }
                assert_eq!(distance(producer, consumer), walked, "p={producer} c={consumer}");
            }
        }
    }

    #[test]
    fn distance_across_wrap() {
        assert_eq!(distance(10, BUFFER_FRAMES - 10), 20);
        assert_eq!(distance(0, 0), 0);
        assert_eq!(distance(BUFFER_FRAMES - 1, 0), BUFFER_FRAMES - 1);
        assert_eq!(distance(0, 1), BUFFER_FRAMES - 1);
    }

    #[test]
    fn new_is_empty() {
        let idx = RingIndices::new();
        assert_eq!(idx.producer(), 0);
        assert_eq!(idx.consumer(), 0);
        assert_eq!(idx.fill(), 0);
        assert!(!idx.take_underrun());
    }

    #[test]
    fn publish_producer_wraps() {
        let idx = RingIndices::new();
        idx.publish_producer(BUFFER_FRAMES + 5);
        assert_eq!(idx.producer(), 5);
        assert_eq!(idx.fill(), 5);
    }

    #[test]
    fn consumer_advances_one_chunk_and_wraps() {
        let idx = RingIndices::new();
        for i in 1..=NUM_CHUNKS {
            idx.advance_consumer();
            assert_eq!(idx.consumer(), (i * CHUNK_FRAMES) % BUFFER_FRAMES);
        }
        assert_eq!(idx.consumer(), 0);
    }

    #[test]
    fn completion_flags_starvation_below_two_chunks() {
        let idx = RingIndices::new();
        idx.publish_producer(CHUNK_FRAMES * 4);

        // 3 chunks left: fine
        idx.on_chunk_complete();
        assert_eq!(idx.fill(), CHUNK_FRAMES * 3);
        assert!(!idx.take_underrun());

        // 2 chunks left: still fine (strictly below two chunks starves)
        idx.on_chunk_complete();
        assert!(!idx.take_underrun());

        // 1 chunk left: starved
        idx.on_chunk_complete();
        assert!(idx.take_underrun());
        assert!(!idx.take_underrun(), "reading clears the condition");
        assert_eq!(idx.starved_chunks(), 1);
    }

    #[test]
    fn completion_keeps_running_when_empty() {
        let idx = RingIndices::new();
        idx.publish_producer(CHUNK_FRAMES);

        idx.on_chunk_complete();
        assert_eq!(idx.fill(), 0);
        assert!(idx.take_underrun());

        // Engine keeps firing; the consumer runs past the producer and the
        // modular distance wraps to "almost full".
        idx.on_chunk_complete();
        assert_eq!(idx.consumer(), 2 * CHUNK_FRAMES);
        assert_eq!(idx.fill(), BUFFER_FRAMES - CHUNK_FRAMES);
        assert_eq!(idx.starved_chunks(), 1);
    }

    #[test]
    fn resync_aligns_both_indices() {
        let idx = RingIndices::new();
        idx.publish_producer(500);
        idx.advance_consumer();
        idx.resync(7 * CHUNK_FRAMES);
        assert_eq!(idx.producer(), 7 * CHUNK_FRAMES);
        assert_eq!(idx.consumer(), 7 * CHUNK_FRAMES);
        assert_eq!(idx.fill(), 0);
    }
}
