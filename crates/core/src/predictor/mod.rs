use crate::{BeatAnchor, MeterConfig};

/// Extrapolates beat times and bar positions from a single anchor.
///
/// Nothing here consults the timeline, so every query stays valid for beats
/// past the last confirmed marker and before any timeline entries exist.
#[derive(Debug, Clone, Copy)]
pub struct VirtualBeatPredictor<'a> {
    anchor: &'a BeatAnchor,
    heavy_beat_every: u32,
}

impl<'a> VirtualBeatPredictor<'a> {
    pub fn new(anchor: &'a BeatAnchor, meter: &MeterConfig) -> Self {
        Self {
            anchor,
            heavy_beat_every: meter.heavy_beat_every.max(1),
        }
    }

    pub fn anchor(&self) -> &BeatAnchor {
        self.anchor
    }

    pub fn seconds_per_beat(&self) -> f64 {
        self.anchor.beat_interval()
    }

    /// Track time at which `beat_index` is expected to sound.
    pub fn predicted_time(&self, beat_index: i64) -> f64 {
        let offset = (beat_index - self.anchor.global_beat_index) as f64;
        self.anchor.anchor_time + offset * self.seconds_per_beat()
    }

    /// Beat index whose predicted time is closest to `time`.
    pub fn nearest_beat(&self, time: f64) -> i64 {
        let beats = (time - self.anchor.anchor_time) / self.seconds_per_beat();
        self.anchor.global_beat_index + beats.round() as i64
    }

    /// 1-based position of `beat_index` within its bar.
    pub fn beat_in_bar(&self, beat_index: i64) -> u32 {
        let beats_per_bar = i64::from(self.anchor.beats_per_bar().max(1));
        let first = i64::from(self.anchor.beat_in_bar.max(1)) - 1;
        let offset = first + (beat_index - self.anchor.global_beat_index);
        (offset.rem_euclid(beats_per_bar) + 1) as u32
    }

    pub fn is_heavy_beat(&self, beat_index: i64) -> bool {
        (self.beat_in_bar(beat_index) - 1) % self.heavy_beat_every == 0
    }

    /// Progress through the beat containing `time`, in `[0, 1)`.
    pub fn beat_phase(&self, time: f64) -> f64 {
        let beats = (time - self.anchor.anchor_time) / self.seconds_per_beat();
        let phase = beats - beats.floor();
        if phase >= 1.0 {
            0.0
        } else {
            phase
        }
    }

    /// Seconds from `time` until the next predicted beat.
    pub fn time_until_next_beat(&self, time: f64) -> f64 {
        (1.0 - self.beat_phase(time)) * self.seconds_per_beat()
    }
}
