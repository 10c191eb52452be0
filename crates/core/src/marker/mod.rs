use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Time signature carried by every beat marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar.
    pub upper: u32,
    /// Note value of one beat.
    pub lower: u32,
}

impl TimeSignature {
    pub const fn new(upper: u32, lower: u32) -> Self {
        Self { upper, lower }
    }

    pub fn is_valid(&self) -> bool {
        self.upper > 0 && self.lower > 0
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Beat boundary notification produced by the audio engine.
///
/// `arrival_timestamp` is wall-clock time (see [`WallClock`]) stamped when the
/// marker left the audio callback. It is not track time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub bar: i64,
    /// 1-based position of the beat within its bar.
    pub beat_in_bar: u32,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub arrival_timestamp: f64,
}

impl BeatMarker {
    pub fn new(
        bar: i64,
        beat_in_bar: u32,
        tempo_bpm: f64,
        time_signature: TimeSignature,
        arrival_timestamp: f64,
    ) -> Self {
        Self {
            bar,
            beat_in_bar,
            tempo_bpm,
            time_signature,
            arrival_timestamp,
        }
    }

    /// Running beat count: `bar * beats_per_bar + (beat_in_bar - 1)`.
    pub fn global_beat_index(&self) -> i64 {
        self.bar * i64::from(self.time_signature.upper) + i64::from(self.beat_in_bar) - 1
    }
}

/// Monotonic wall clock shared by the audio-side producer and the simulation
/// loop. Cloning keeps the same origin.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since the clock was started.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::start()
    }
}
