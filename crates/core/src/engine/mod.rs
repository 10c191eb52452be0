//! Simulation-thread facade over the rhythm components.
//!
//! The engine is the only consumer of the marker queue. Once per tick it
//! samples the playback position, drains pending markers into the anchor
//! tracker, extends the timeline, advances the scheduler and decays the
//! combo. Hit attempts can be judged at any point between ticks.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    BeatAnchor, BeatAnchorTracker, BeatCallbackQueue, BeatMarker, BeatReceiver, BeatScheduler,
    BeatSender, BeatTimeline, ComboTracker, EngineConfig, JudgeError, JudgmentCounts,
    JudgmentEngine, JudgmentRecord, Result, RhythmEvent, ScheduleId, VirtualBeatPredictor,
    WallClock,
};

/// Events held between drains. Past this the oldest are discarded.
pub const MAX_PENDING_EVENTS: usize = 1024;

/// Queries the engine needs from the audio engine collaborator.
pub trait PlaybackSource {
    /// Current playback position of the track in seconds.
    fn playback_position_seconds(&self) -> f64;
    /// Total length of the track in seconds.
    fn track_duration_seconds(&self) -> f64;
}

/// Wall time and track time sampled together at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClockSync {
    wall: f64,
    track: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub ticks: u64,
    pub markers_accepted: u64,
    pub markers_rejected: u64,
    pub markers_dropped: u64,
    pub timeline_rebuilds: u64,
    pub events_dropped: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: usize,
    pub rejected: usize,
    pub actions_fired: usize,
}

pub struct RhythmEngine<S> {
    config: EngineConfig,
    source: S,
    markers: BeatReceiver,
    tracker: BeatAnchorTracker,
    timeline: BeatTimeline,
    judge: JudgmentEngine,
    scheduler: BeatScheduler,
    combo: ComboTracker,
    sync: Option<ClockSync>,
    events: VecDeque<RhythmEvent>,
    stats: EngineStats,
}

impl<S: PlaybackSource> RhythmEngine<S> {
    /// Creates an engine that consumes an existing receiver.
    pub fn new(config: EngineConfig, source: S, markers: BeatReceiver) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracker: BeatAnchorTracker::new(),
            timeline: BeatTimeline::new(config.timeline.safety_margin_seconds),
            judge: JudgmentEngine::new(config.judgment.clone()),
            scheduler: BeatScheduler::new(),
            combo: ComboTracker::new(&config.combo),
            sync: None,
            events: VecDeque::new(),
            stats: EngineStats::default(),
            config,
            source,
            markers,
        })
    }

    /// Creates an engine together with the sender the audio callback should
    /// use.
    pub fn with_queue(
        config: EngineConfig,
        source: S,
        clock: WallClock,
    ) -> Result<(Self, BeatSender)> {
        let (sender, receiver) = BeatCallbackQueue::bounded(config.queue.capacity, clock);
        let engine = Self::new(config, source, receiver)?;
        Ok((engine, sender))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Processes everything that arrived since the previous tick. `now` is
    /// wall-clock time from the same clock that stamps the markers.
    pub fn tick(&mut self, now: f64) -> TickReport {
        self.stats.ticks += 1;
        let position = self.source.playback_position_seconds();
        self.sync = Some(ClockSync {
            wall: now,
            track: position,
        });

        let mut report = TickReport::default();
        for marker in self.markers.drain_all() {
            match self.process_marker(&marker, now, position) {
                Some(fired) => {
                    report.accepted += 1;
                    report.actions_fired += fired;
                }
                None => report.rejected += 1,
            }
        }
        self.stats.markers_dropped = self.markers.dropped();

        if let Some(count) = self.combo.update(now) {
            self.push_event(RhythmEvent::ComboChanged { count });
        }
        report
    }

    fn process_marker(&mut self, marker: &BeatMarker, now: f64, position: f64) -> Option<usize> {
        let latency = (now - marker.arrival_timestamp).max(0.0);
        let anchor_time = position - latency;
        let previous = self.tracker.anchor().copied();

        let anchor = match self.tracker.on_marker_confirmed(marker, anchor_time) {
            Ok(anchor) => anchor,
            Err(rejection) => {
                self.stats.markers_rejected += 1;
                tracing::warn!(
                    bar = marker.bar,
                    beat_in_bar = marker.beat_in_bar,
                    tempo_bpm = marker.tempo_bpm,
                    reason = %rejection,
                    "discarding beat marker"
                );
                return None;
            }
        };
        self.stats.markers_accepted += 1;
        tracing::debug!(
            beat = anchor.global_beat_index,
            anchor_time = anchor.anchor_time,
            tempo_bpm = anchor.tempo_bpm,
            "beat anchor advanced"
        );

        if self.needs_rebuild(previous.as_ref(), &anchor) {
            let duration = self.source.track_duration_seconds();
            self.timeline.extend(&anchor, duration);
            self.stats.timeline_rebuilds += 1;
        }

        self.push_event(RhythmEvent::BeatAdvanced {
            global_beat_index: anchor.global_beat_index,
            bar: anchor.bar,
            beat_in_bar: anchor.beat_in_bar,
            tempo_bpm: anchor.tempo_bpm,
        });
        Some(self.scheduler.on_beat(anchor.global_beat_index))
    }

    fn needs_rebuild(&self, previous: Option<&BeatAnchor>, anchor: &BeatAnchor) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        if previous.tempo_bpm != anchor.tempo_bpm
            || previous.time_signature != anchor.time_signature
        {
            return true;
        }
        match self.timeline.entry(anchor.global_beat_index) {
            Some(entry) => {
                (entry.predicted_time - anchor.anchor_time).abs()
                    > self.config.timeline.resync_tolerance_seconds
            }
            None => true,
        }
    }

    /// Track time corresponding to wall time `now`, extrapolated from the
    /// last tick's sample.
    pub fn track_time_at(&self, now: f64) -> Option<f64> {
        self.sync.map(|sync| sync.track + (now - sync.wall))
    }

    /// Judges a hit made at wall time `now`.
    pub fn hit(&mut self, now: f64) -> std::result::Result<JudgmentRecord, JudgeError> {
        let time = self.track_time_at(now).ok_or(JudgeError::NotReady)?;
        self.hit_at_track_time(time, now)
    }

    /// Judges a hit at an explicit track time; `now` drives combo decay.
    pub fn hit_at_track_time(
        &mut self,
        time: f64,
        now: f64,
    ) -> std::result::Result<JudgmentRecord, JudgeError> {
        let predictor = self
            .tracker
            .anchor()
            .map(|anchor| VirtualBeatPredictor::new(anchor, &self.config.meter));
        let record = self.judge.judge(predictor.as_ref(), time)?;

        self.push_event(RhythmEvent::Judged(record));
        let combo = if record.success {
            self.combo.on_success(now)
        } else {
            self.combo.on_failure()
        };
        if let Some(count) = combo {
            self.push_event(RhythmEvent::ComboChanged { count });
        }
        Ok(record)
    }

    /// Whether a hit at wall time `now` would currently land.
    pub fn is_on_beat(&self, now: f64) -> bool {
        let Some(time) = self.track_time_at(now) else {
            return false;
        };
        self.judge.is_on_beat(self.predictor().as_ref(), time)
    }

    /// Takes the events produced since the last drain, oldest first. Call
    /// once per tick; at most [`MAX_PENDING_EVENTS`] are retained.
    pub fn drain_events(&mut self) -> Vec<RhythmEvent> {
        self.events.drain(..).collect()
    }

    fn push_event(&mut self, event: RhythmEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
            self.stats.events_dropped += 1;
            if self.stats.events_dropped.is_power_of_two() {
                tracing::warn!(
                    dropped = self.stats.events_dropped,
                    "event buffer full, discarding oldest events; drain every tick"
                );
            }
        }
        self.events.push_back(event);
    }

    pub fn predictor(&self) -> Option<VirtualBeatPredictor<'_>> {
        self.tracker
            .anchor()
            .map(|anchor| VirtualBeatPredictor::new(anchor, &self.config.meter))
    }

    pub fn anchor(&self) -> Option<&BeatAnchor> {
        self.tracker.anchor()
    }

    pub fn global_beat_index(&self) -> Option<i64> {
        self.tracker.anchor().map(|anchor| anchor.global_beat_index)
    }

    pub fn seconds_per_beat(&self) -> Option<f64> {
        self.tracker.anchor().map(BeatAnchor::beat_interval)
    }

    pub fn beat_in_bar(&self, beat_index: i64) -> Option<u32> {
        self.predictor().map(|p| p.beat_in_bar(beat_index))
    }

    pub fn is_heavy_beat(&self, beat_index: i64) -> Option<bool> {
        self.predictor().map(|p| p.is_heavy_beat(beat_index))
    }

    pub fn predicted_time(&self, beat_index: i64) -> Option<f64> {
        self.predictor().map(|p| p.predicted_time(beat_index))
    }

    pub fn nearest_beat(&self, time: f64) -> Option<i64> {
        self.predictor().map(|p| p.nearest_beat(time))
    }

    pub fn timeline(&self) -> &BeatTimeline {
        &self.timeline
    }

    pub fn combo(&self) -> &ComboTracker {
        &self.combo
    }

    pub fn judgment_counts(&self) -> JudgmentCounts {
        self.judge.counts()
    }

    pub fn is_consumed(&self, beat_index: i64) -> bool {
        self.judge.is_consumed(beat_index)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn schedule_at_beat(
        &mut self,
        beat_index: i64,
        action: impl FnOnce(i64) -> Result<()> + 'static,
    ) -> ScheduleId {
        self.scheduler.schedule_at_beat(beat_index, action)
    }

    pub fn schedule_after_beats(
        &mut self,
        offset: i64,
        action: impl FnOnce(i64) -> Result<()> + 'static,
    ) -> ScheduleId {
        self.scheduler.schedule_after_beats(offset, action)
    }

    pub fn cancel_scheduled(&mut self, id: ScheduleId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn pending_actions(&self) -> usize {
        self.scheduler.pending()
    }
}

impl<S> std::fmt::Debug for RhythmEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhythmEngine")
            .field("anchor", &self.tracker.anchor())
            .field("timeline_len", &self.timeline.len())
            .field("combo", &self.combo.count())
            .field("stats", &self.stats)
            .finish()
    }
}
