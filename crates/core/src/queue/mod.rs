//! Mailbox between the audio engine's callback context and the simulation
//! thread.
//!
//! The producer half never blocks, never allocates and never logs: a full
//! queue evicts its oldest marker and bumps an atomic counter. The consumer
//! reports evictions the next time it drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::{BeatMarker, TimeSignature, WallClock};

#[derive(Debug)]
struct Shared {
    markers: ArrayQueue<BeatMarker>,
    dropped: AtomicU64,
}

/// Factory for the two halves of the marker mailbox.
pub struct BeatCallbackQueue;

impl BeatCallbackQueue {
    /// Creates a bounded queue. `capacity` is clamped to at least one slot.
    pub fn bounded(capacity: usize, clock: WallClock) -> (BeatSender, BeatReceiver) {
        let shared = Arc::new(Shared {
            markers: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        });
        (
            BeatSender {
                shared: Arc::clone(&shared),
                clock,
            },
            BeatReceiver {
                shared,
                reported_dropped: 0,
            },
        )
    }
}

/// Audio-thread half. Deliberately not `Clone`: there is one producer.
#[derive(Debug)]
pub struct BeatSender {
    shared: Arc<Shared>,
    clock: WallClock,
}

impl BeatSender {
    /// Native beat callback entry point. Stamps the marker with the shared
    /// wall clock and enqueues it.
    pub fn on_beat_marker(
        &self,
        bar: i64,
        beat_in_bar: u32,
        tempo_bpm: f64,
        time_sig_upper: u32,
        time_sig_lower: u32,
    ) {
        self.enqueue(BeatMarker::new(
            bar,
            beat_in_bar,
            tempo_bpm,
            TimeSignature::new(time_sig_upper, time_sig_lower),
            self.clock.now(),
        ));
    }

    /// Pushes a marker, evicting the oldest pending one when full.
    pub fn enqueue(&self, marker: BeatMarker) {
        if self.shared.markers.force_push(marker).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.markers.capacity()
    }
}

/// Simulation-thread half.
#[derive(Debug)]
pub struct BeatReceiver {
    shared: Arc<Shared>,
    reported_dropped: u64,
}

impl BeatReceiver {
    /// Returns every marker enqueued since the last drain, oldest first.
    pub fn drain_all(&mut self) -> Vec<BeatMarker> {
        let mut drained = Vec::with_capacity(self.shared.markers.len());
        while let Some(marker) = self.shared.markers.pop() {
            drained.push(marker);
        }

        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_dropped {
            tracing::warn!(
                dropped = dropped - self.reported_dropped,
                total_dropped = dropped,
                capacity = self.shared.markers.capacity(),
                "beat marker queue overflowed; oldest markers were discarded"
            );
            self.reported_dropped = dropped;
        }

        drained
    }

    /// Total markers evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.shared.markers.len()
    }
}
