use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::BeatAnchor;

/// Upper bound on entries appended by a single [`BeatTimeline::extend`].
pub const MAX_EXTEND_ENTRIES: usize = 100_000;

/// One predicted beat instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: i64,
    pub predicted_time: f64,
    pub bar: i64,
    pub beat_in_bar: u32,
    pub tempo_bpm: f64,
}

/// Ordered list of predicted beats covering the rest of the track.
///
/// Entries before the most recent anchor are history and are never rewritten;
/// a tempo change only regenerates from its anchor forward.
#[derive(Debug, Default, Clone)]
pub struct BeatTimeline {
    entries: Vec<TimelineEntry>,
    safety_margin: f64,
}

impl BeatTimeline {
    pub fn new(safety_margin: f64) -> Self {
        Self {
            entries: Vec::new(),
            safety_margin,
        }
    }

    /// Discards entries at or after `anchor.global_beat_index` and appends
    /// fresh predictions from the anchor until `track_duration` plus the
    /// safety margin is covered. Returns the number of entries appended.
    ///
    /// A non-finite duration or anchor time appends nothing, and at most
    /// [`MAX_EXTEND_ENTRIES`] entries are appended per call.
    pub fn extend(&mut self, anchor: &BeatAnchor, track_duration: f64) -> usize {
        let keep = self
            .entries
            .partition_point(|entry| entry.index < anchor.global_beat_index);
        self.entries.truncate(keep);

        let interval = anchor.beat_interval();
        if !(interval.is_finite() && interval > 0.0) {
            return 0;
        }
        if !(track_duration.is_finite() && anchor.anchor_time.is_finite()) {
            tracing::warn!(
                track_duration,
                anchor_time = anchor.anchor_time,
                "refusing to extend beat timeline over a non-finite span"
            );
            return 0;
        }

        let horizon = track_duration + self.safety_margin;
        let beats_per_bar = i64::from(anchor.beats_per_bar().max(1));
        let first_offset = i64::from(anchor.beat_in_bar.max(1)) - 1;
        let mut appended = 0;
        for step in 0..MAX_EXTEND_ENTRIES as i64 {
            let time = anchor.anchor_time + step as f64 * interval;
            if time > horizon {
                break;
            }
            let offset = first_offset + step;
            self.entries.push(TimelineEntry {
                index: anchor.global_beat_index + step,
                predicted_time: time,
                bar: anchor.bar + offset.div_euclid(beats_per_bar),
                beat_in_bar: (offset.rem_euclid(beats_per_bar) + 1) as u32,
                tempo_bpm: anchor.tempo_bpm,
            });
            appended += 1;
        }
        if appended == MAX_EXTEND_ENTRIES {
            tracing::warn!(
                from_beat = anchor.global_beat_index,
                horizon,
                "beat timeline truncated at the per-extend entry cap"
            );
        }

        tracing::debug!(
            from_beat = anchor.global_beat_index,
            appended,
            tempo_bpm = anchor.tempo_bpm,
            "extended beat timeline"
        );
        appended
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Looks up the entry for a beat index, if predicted.
    pub fn entry(&self, index: i64) -> Option<&TimelineEntry> {
        self.entries
            .binary_search_by(|entry| entry.index.cmp(&index))
            .ok()
            .map(|position| &self.entries[position])
    }

    /// First entry strictly after `time`.
    pub fn next_after(&self, time: f64) -> Option<&TimelineEntry> {
        let position = self.entries.partition_point(|entry| {
            entry
                .predicted_time
                .partial_cmp(&time)
                .map(|ordering| ordering != Ordering::Greater)
                .unwrap_or(true)
        });
        self.entries.get(position)
    }
}
