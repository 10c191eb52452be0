//! Core library for the beat sync engine.
//!
//! Turns sparse beat markers delivered from an audio engine's callback
//! context into a continuously queryable beat grid, and judges player input
//! against it. Each module owns one subsystem:
//!
//! - [`queue`]: lock-free mailbox between the audio callback and the
//!   simulation thread.
//! - [`anchor`]: the most recent confirmed beat and the rules for replacing it.
//! - [`timeline`]: predicted beat instants covering the rest of the track.
//! - [`predictor`]: extrapolation from the anchor (nearest beat, beat time,
//!   bar position).
//! - [`judgment`]: hit classification with at-most-once consumption per beat.
//! - [`scheduler`]: fire-once actions keyed by beat index.
//! - [`combo`]: streak bookkeeping.
//! - [`engine`]: the per-tick facade tying the above together.

pub mod anchor;
pub mod combo;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod judgment;
pub mod marker;
pub mod predictor;
pub mod queue;
pub mod scheduler;
pub mod timeline;

pub use anchor::{BeatAnchor, BeatAnchorTracker, MarkerRejection, MAX_TEMPO_BPM};
pub use combo::ComboTracker;
pub use config::{
    ComboConfig, EngineConfig, JudgmentConfig, MeterConfig, QueueConfig, TimelineConfig,
};
pub use engine::{EngineStats, PlaybackSource, RhythmEngine, TickReport};
pub use error::{Result, RhythmError};
pub use events::RhythmEvent;
pub use judgment::{
    JudgeError, JudgmentCounts, JudgmentEngine, JudgmentPolicy, JudgmentRecord, Outcome,
};
pub use marker::{BeatMarker, TimeSignature, WallClock};
pub use predictor::VirtualBeatPredictor;
pub use queue::{BeatCallbackQueue, BeatReceiver, BeatSender};
pub use scheduler::{BeatAction, BeatScheduler, ScheduleId};
pub use timeline::{BeatTimeline, TimelineEntry, MAX_EXTEND_ENTRIES};
