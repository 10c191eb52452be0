use serde::{Deserialize, Serialize};

use crate::{BeatMarker, TimeSignature};

/// Fastest tempo a marker may carry. Anything quicker is a corrupt marker,
/// not music, and would flood the timeline with entries.
pub const MAX_TEMPO_BPM: f64 = 1000.0;

/// Most recently confirmed beat, used as the reference for all prediction.
///
/// Anchors are replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatAnchor {
    pub global_beat_index: i64,
    /// Track time (seconds) at which this beat sounded.
    pub anchor_time: f64,
    pub tempo_bpm: f64,
    pub beat_in_bar: u32,
    pub bar: i64,
    pub time_signature: TimeSignature,
}

impl BeatAnchor {
    /// Seconds per beat at this anchor's tempo.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.upper
    }
}

/// Why a marker did not become the new anchor.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MarkerRejection {
    #[error("beat {index} does not advance past the current anchor at beat {current}")]
    DuplicateOrOutOfOrder { index: i64, current: i64 },
    #[error("tempo {0} bpm cannot drive a beat interval")]
    InvalidTempo(f64),
    #[error("time signature {upper}/{lower} is not usable")]
    InvalidTimeSignature { upper: u32, lower: u32 },
    #[error("anchor time {0} is not a finite track position")]
    InvalidAnchorTime(f64),
}

/// Owns the current anchor and decides which markers may replace it.
#[derive(Debug, Default, Clone)]
pub struct BeatAnchorTracker {
    current: Option<BeatAnchor>,
}

impl BeatAnchorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(&self) -> Option<&BeatAnchor> {
        self.current.as_ref()
    }

    /// Validates `marker` and, when it advances the beat count, replaces the
    /// anchor. `anchor_time` is the track time the caller correlated with the
    /// marker. Rejections leave the tracker untouched.
    pub fn on_marker_confirmed(
        &mut self,
        marker: &BeatMarker,
        anchor_time: f64,
    ) -> Result<BeatAnchor, MarkerRejection> {
        if !(marker.tempo_bpm > 0.0 && marker.tempo_bpm <= MAX_TEMPO_BPM) {
            return Err(MarkerRejection::InvalidTempo(marker.tempo_bpm));
        }
        if !anchor_time.is_finite() {
            return Err(MarkerRejection::InvalidAnchorTime(anchor_time));
        }
        let sig = marker.time_signature;
        if !sig.is_valid() || marker.beat_in_bar == 0 || marker.beat_in_bar > sig.upper {
            return Err(MarkerRejection::InvalidTimeSignature {
                upper: sig.upper,
                lower: sig.lower,
            });
        }

        let index = marker.global_beat_index();
        if let Some(current) = &self.current {
            if index <= current.global_beat_index {
                return Err(MarkerRejection::DuplicateOrOutOfOrder {
                    index,
                    current: current.global_beat_index,
                });
            }
        }

        let anchor = BeatAnchor {
            global_beat_index: index,
            anchor_time,
            tempo_bpm: marker.tempo_bpm,
            beat_in_bar: marker.beat_in_bar,
            bar: marker.bar,
            time_signature: sig,
        };
        self.current = Some(anchor);
        Ok(anchor)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
