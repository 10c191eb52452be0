use std::panic::{self, AssertUnwindSafe};

use crate::Result;

/// Action run once its target beat has been reached. Receives the beat index
/// being processed when it fires.
pub type BeatAction = Box<dyn FnOnce(i64) -> Result<()>>;

/// Handle returned by the scheduling calls, usable with [`BeatScheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId(u64);

struct ScheduledAction {
    id: ScheduleId,
    target_beat_index: i64,
    action: BeatAction,
}

/// Fire-once actions keyed by global beat index.
#[derive(Default)]
pub struct BeatScheduler {
    pending: Vec<ScheduledAction>,
    current_beat: Option<i64>,
    next_id: u64,
}

impl BeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last beat passed to [`BeatScheduler::on_beat`], if any.
    pub fn current_beat(&self) -> Option<i64> {
        self.current_beat
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Runs `action` on the first processed beat at or after `beat_index`.
    pub fn schedule_at_beat(
        &mut self,
        beat_index: i64,
        action: impl FnOnce(i64) -> Result<()> + 'static,
    ) -> ScheduleId {
        let id = ScheduleId(self.next_id);
        self.next_id += 1;
        self.pending.push(ScheduledAction {
            id,
            target_beat_index: beat_index,
            action: Box::new(action),
        });
        id
    }

    /// Runs `action` `offset` beats after the current one. Negative offsets
    /// are treated as zero; before any beat the count starts at beat 0.
    pub fn schedule_after_beats(
        &mut self,
        offset: i64,
        action: impl FnOnce(i64) -> Result<()> + 'static,
    ) -> ScheduleId {
        let target = self.current_beat.unwrap_or(0) + offset.max(0);
        self.schedule_at_beat(target, action)
    }

    /// Removes a pending action. Returns false if it already fired or never
    /// existed.
    pub fn cancel(&mut self, id: ScheduleId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|scheduled| scheduled.id != id);
        self.pending.len() != before
    }

    /// Advances to `beat` and fires every action whose target has been
    /// reached. A failing or panicking action is logged and does not stop the
    /// others. Returns the number of actions run.
    pub fn on_beat(&mut self, beat: i64) -> usize {
        self.current_beat = Some(beat);

        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|scheduled| scheduled.target_beat_index <= beat);
        self.pending = waiting;

        let fired = due.len();
        for scheduled in due {
            let target_beat = scheduled.target_beat_index;
            let action = scheduled.action;
            match panic::catch_unwind(AssertUnwindSafe(move || action(beat))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(target_beat, beat, error = %err, "scheduled beat action failed");
                }
                Err(_) => {
                    tracing::error!(target_beat, beat, "scheduled beat action panicked");
                }
            }
        }
        fired
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl std::fmt::Debug for BeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatScheduler")
            .field("pending", &self.pending.len())
            .field("current_beat", &self.current_beat)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::RhythmError;

    fn recorder() -> Rc<RefCell<Vec<i64>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn after_beats_fires_once_at_target() {
        let mut scheduler = BeatScheduler::new();
        scheduler.on_beat(20);

        let fired = recorder();
        let sink = Rc::clone(&fired);
        scheduler.schedule_after_beats(4, move |beat| {
            sink.borrow_mut().push(beat);
            Ok(())
        });

        for beat in 21..=23 {
            scheduler.on_beat(beat);
        }
        assert!(fired.borrow().is_empty());

        scheduler.on_beat(24);
        scheduler.on_beat(25);
        assert_eq!(*fired.borrow(), vec![24]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn negative_offset_fires_on_next_beat() {
        let mut scheduler = BeatScheduler::new();
        scheduler.on_beat(7);
        let fired = recorder();
        let sink = Rc::clone(&fired);
        scheduler.schedule_after_beats(-3, move |beat| {
            sink.borrow_mut().push(beat);
            Ok(())
        });

        assert_eq!(scheduler.on_beat(8), 1);
        assert_eq!(*fired.borrow(), vec![8]);
    }

    #[test]
    fn failures_do_not_block_siblings() {
        let mut scheduler = BeatScheduler::new();
        let fired = recorder();

        scheduler.schedule_at_beat(3, |_| Err(RhythmError::msg("boom")));
        scheduler.schedule_at_beat(3, |_| panic!("action panicked"));
        let sink = Rc::clone(&fired);
        scheduler.schedule_at_beat(2, move |beat| {
            sink.borrow_mut().push(beat);
            Ok(())
        });

        assert_eq!(scheduler.on_beat(3), 3);
        assert_eq!(*fired.borrow(), vec![3]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_actions_never_fire() {
        let mut scheduler = BeatScheduler::new();
        let fired = recorder();
        let sink = Rc::clone(&fired);
        let id = scheduler.schedule_at_beat(1, move |beat| {
            sink.borrow_mut().push(beat);
            Ok(())
        });

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.on_beat(5), 0);
        assert!(fired.borrow().is_empty());
    }
}
