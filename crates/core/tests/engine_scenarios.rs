use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use beat_sync_core::{
    BeatCallbackQueue, BeatMarker, BeatSender, EngineConfig, JudgeError, Outcome, PlaybackSource,
    RhythmEngine, RhythmEvent, TimeSignature, WallClock,
};

struct ScriptedTrack {
    position: Rc<Cell<f64>>,
    duration: f64,
}

impl PlaybackSource for ScriptedTrack {
    fn playback_position_seconds(&self) -> f64 {
        self.position.get()
    }

    fn track_duration_seconds(&self) -> f64 {
        self.duration
    }
}

struct Harness {
    engine: RhythmEngine<ScriptedTrack>,
    sender: BeatSender,
    position: Rc<Cell<f64>>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        let position = Rc::new(Cell::new(0.0));
        let track = ScriptedTrack {
            position: Rc::clone(&position),
            duration: 60.0,
        };
        let (engine, sender) = RhythmEngine::with_queue(config, track, WallClock::start()).unwrap();
        Self {
            engine,
            sender,
            position,
        }
    }

    /// Delivers a marker with zero latency so track time equals `track_time`.
    /// Wall time and track time are kept equal throughout.
    fn deliver(&mut self, bar: i64, beat: u32, bpm: f64, track_time: f64) {
        self.sender.enqueue(BeatMarker::new(
            bar,
            beat,
            bpm,
            TimeSignature::default(),
            track_time,
        ));
        self.position.set(track_time);
        self.engine.tick(track_time);
    }
}

#[test]
fn perfect_hit_then_duplicate_attempt_on_same_beat() {
    let mut h = Harness::new(EngineConfig::default());
    // bar 2, beat 3 => global beat 10 at 5.0s, 120 bpm
    h.deliver(2, 3, 120.0, 5.0);

    let first = h.engine.hit(5.52).unwrap();
    assert_eq!(first.beat_index, 11);
    assert_abs_diff_eq!(first.delta, 0.02, epsilon = 1e-9);
    assert_eq!(first.outcome, Outcome::Perfect);

    assert_eq!(
        h.engine.hit(5.53),
        Err(JudgeError::AlreadyConsumed { beat: 11 })
    );
    assert_eq!(h.engine.combo().count(), 1);

    let combo_events = h
        .engine
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, RhythmEvent::ComboChanged { .. }))
        .count();
    assert_eq!(combo_events, 1);
}

#[test]
fn schedule_after_beats_fires_exactly_once_at_target() {
    let mut h = Harness::new(EngineConfig::default());
    // global beat 20 = bar 5, beat 1
    h.deliver(5, 1, 120.0, 10.0);
    assert_eq!(h.engine.global_beat_index(), Some(20));

    let fired = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fired);
    h.engine.schedule_after_beats(4, move |beat| {
        sink.borrow_mut().push(beat);
        Ok(())
    });

    for (i, beat) in (2..=4).enumerate() {
        h.deliver(5, beat, 120.0, 10.5 + i as f64 * 0.5);
    }
    assert!(fired.borrow().is_empty());

    h.deliver(6, 1, 120.0, 12.0);
    h.deliver(6, 2, 120.0, 12.5);
    assert_eq!(*fired.borrow(), vec![24]);
    assert_eq!(h.engine.pending_actions(), 0);
}

#[test]
fn out_of_order_marker_is_rejected() {
    let mut h = Harness::new(EngineConfig::default());
    // beat 30 (bar 7, beat 3) then beat 29 (bar 7, beat 2) in the same drain
    h.sender
        .enqueue(BeatMarker::new(7, 3, 120.0, TimeSignature::default(), 15.0));
    h.sender
        .enqueue(BeatMarker::new(7, 2, 120.0, TimeSignature::default(), 15.0));
    h.position.set(15.0);
    let report = h.engine.tick(15.0);

    assert_eq!((report.accepted, report.rejected), (1, 1));
    assert_eq!(h.engine.global_beat_index(), Some(30));
    assert_eq!(h.engine.stats().markers_rejected, 1);
}

#[test]
fn duplicate_markers_leave_state_unchanged() {
    let mut h = Harness::new(EngineConfig::default());
    h.deliver(1, 1, 120.0, 2.0);
    h.deliver(1, 2, 120.0, 2.5);
    h.engine.hit(2.5).unwrap();

    let anchor = *h.engine.anchor().unwrap();
    let timeline = h.engine.timeline().entries().to_vec();
    let consumed: Vec<i64> = (0..10).filter(|b| h.engine.is_consumed(*b)).collect();

    h.deliver(1, 2, 120.0, 2.7);
    h.deliver(1, 1, 120.0, 2.8);

    assert_eq!(h.engine.anchor(), Some(&anchor));
    assert_eq!(h.engine.timeline().entries(), timeline.as_slice());
    let after: Vec<i64> = (0..10).filter(|b| h.engine.is_consumed(*b)).collect();
    assert_eq!(after, consumed);
}

#[test]
fn predictions_are_exact_from_each_anchor() {
    let mut h = Harness::new(EngineConfig::default());
    h.deliver(2, 3, 120.0, 5.0);

    for n in 10..400 {
        let expected = 5.0 + (n - 10) as f64 * 0.5;
        assert_eq!(h.engine.predicted_time(n), Some(expected));
    }

    h.deliver(3, 1, 150.0, 6.0);
    for n in 12..400 {
        let expected = 6.0 + (n - 12) as f64 * (60.0 / 150.0);
        assert_eq!(h.engine.predicted_time(n), Some(expected));
    }
}

#[test]
fn at_most_one_success_per_beat() {
    let mut h = Harness::new(EngineConfig::default());
    let mut successes: HashMap<i64, u32> = HashMap::new();

    for step in 0..32 {
        let bar = 1 + step / 4;
        let beat = (step % 4 + 1) as u32;
        let time = 2.0 + step as f64 * 0.5;
        h.deliver(bar, beat, 120.0, time);

        let jitters = [-0.2, -0.04, -0.01, 0.0, 0.01, 0.03, 0.12, 0.2];
        // replays of earlier beats, reaching past the pruned consumed window
        let replays = (1..=12).map(|back| -0.5 * back as f64);
        let attempts = jitters
            .into_iter()
            .chain(replays)
            .map(|offset| time + offset)
            .chain([2.0, 2.01, 3.0]);
        for at in attempts {
            if let Ok(record) = h.engine.hit(at) {
                if record.success {
                    *successes.entry(record.beat_index).or_default() += 1;
                }
            }
        }
    }

    assert!(!successes.is_empty());
    assert!(successes.values().all(|count| *count == 1));
}

#[test]
fn replaying_an_old_beat_is_refused() {
    let mut h = Harness::new(EngineConfig::default());
    // beats 4..=15 at 2.0s, 2.5s, ...
    for step in 0..12 {
        let time = 2.0 + step as f64 * 0.5;
        h.deliver(1 + step / 4, (step % 4 + 1) as u32, 120.0, time);
        assert!(h.engine.hit(time).unwrap().success);
    }
    assert_eq!(h.engine.combo().count(), 12);

    // beat 5 fell out of the consumed history (5 beats behind beat 15)
    assert_eq!(
        h.engine.hit(2.5),
        Err(JudgeError::StaleBeat { beat: 5, floor: 10 })
    );
    assert_eq!(h.engine.hit(6.0), Err(JudgeError::AlreadyConsumed { beat: 12 }));
    assert_eq!(h.engine.combo().count(), 12);
    assert_eq!(h.engine.judgment_counts().refused, 2);
}

#[test]
fn global_beat_index_never_decreases() {
    let mut h = Harness::new(EngineConfig::default());
    let script = [(1, 1), (1, 2), (1, 1), (2, 4), (2, 3), (3, 1), (3, 1), (4, 2)];
    let mut last = i64::MIN;
    for (i, (bar, beat)) in script.into_iter().enumerate() {
        h.deliver(bar, beat, 120.0, i as f64 * 0.5);
        let current = h.engine.global_beat_index().unwrap();
        assert!(current >= last);
        last = current;
    }
    assert_eq!(last, 17);
}

#[test]
fn combo_resets_after_quiet_period() {
    let mut h = Harness::new(EngineConfig::default());
    h.deliver(1, 1, 120.0, 2.0);
    h.engine.hit(2.0).unwrap();
    h.deliver(1, 2, 120.0, 2.5);
    h.engine.hit(2.51).unwrap();
    assert_eq!(h.engine.combo().count(), 2);

    let reset = h.engine.config().combo.reset_window_seconds;
    h.position.set(2.51 + reset + 0.01);
    h.engine.tick(2.51 + reset + 0.01);
    assert_eq!(h.engine.combo().count(), 0);
    assert_eq!(h.engine.combo().best(), 2);
}

#[test]
fn miss_resets_combo_without_consuming() {
    let mut h = Harness::new(EngineConfig::default());
    h.deliver(1, 1, 120.0, 2.0);
    h.engine.hit(2.0).unwrap();

    let miss = h.engine.hit(2.3).unwrap();
    assert_eq!(miss.outcome, Outcome::Miss);
    assert_eq!(miss.beat_index, 5);
    assert!(!h.engine.is_consumed(5));
    assert_eq!(h.engine.combo().count(), 0);
}

#[test]
fn heavy_beat_and_bar_queries() {
    let mut h = Harness::new(EngineConfig::default());
    h.deliver(3, 2, 120.0, 4.0);

    assert_eq!(h.engine.beat_in_bar(13), Some(2));
    assert_eq!(h.engine.beat_in_bar(16), Some(1));
    assert_eq!(h.engine.is_heavy_beat(14), Some(true));
    assert_eq!(h.engine.is_heavy_beat(15), Some(false));
    assert_eq!(h.engine.seconds_per_beat(), Some(0.5));
}

#[test]
fn markers_from_audio_thread() {
    let clock = WallClock::start();
    let (tx, mut rx) = BeatCallbackQueue::bounded(16, clock);

    let producer = std::thread::spawn(move || {
        for bar in 1..=2 {
            for beat in 1..=4 {
                tx.on_beat_marker(bar, beat, 128.0, 4, 4);
            }
        }
    });
    producer.join().unwrap();

    let indices: Vec<i64> = rx
        .drain_all()
        .iter()
        .map(BeatMarker::global_beat_index)
        .collect();
    assert_eq!(indices, (4..12).collect::<Vec<_>>());
}
