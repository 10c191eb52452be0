use serde::{Deserialize, Serialize};

use crate::JudgmentRecord;

/// Notifications handed to gameplay code after each tick or hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmEvent {
    /// A marker was accepted as the new anchor.
    BeatAdvanced {
        global_beat_index: i64,
        bar: i64,
        beat_in_bar: u32,
        tempo_bpm: f64,
    },
    Judged(JudgmentRecord),
    ComboChanged { count: u32 },
}
