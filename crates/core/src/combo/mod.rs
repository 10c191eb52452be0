use crate::ComboConfig;

/// Streak counter driven by judgment outcomes.
///
/// Every method returns the new count when it changed, so callers can emit a
/// combo event only on actual transitions.
#[derive(Debug, Clone)]
pub struct ComboTracker {
    reset_window: f64,
    count: u32,
    best: u32,
    last_hit_time: Option<f64>,
}

impl ComboTracker {
    pub fn new(config: &ComboConfig) -> Self {
        Self {
            reset_window: config.reset_window_seconds,
            count: 0,
            best: 0,
            last_hit_time: None,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Longest streak seen since creation.
    pub fn best(&self) -> u32 {
        self.best
    }

    pub fn last_hit_time(&self) -> Option<f64> {
        self.last_hit_time
    }

    /// Counts a hit at `now`. A streak whose reset window already lapsed is
    /// dropped first, so the hit starts a new streak at 1.
    pub fn on_success(&mut self, now: f64) -> Option<u32> {
        if self.is_expired(now) {
            self.count = 0;
        }
        self.count += 1;
        self.best = self.best.max(self.count);
        self.last_hit_time = Some(now);
        Some(self.count)
    }

    pub fn on_failure(&mut self) -> Option<u32> {
        self.last_hit_time = None;
        self.break_streak()
    }

    /// Deferred timeout check, run once per tick. Resets the streak when
    /// nothing succeeded within the reset window.
    pub fn update(&mut self, now: f64) -> Option<u32> {
        if self.is_expired(now) {
            self.last_hit_time = None;
            self.break_streak()
        } else {
            None
        }
    }

    fn is_expired(&self, now: f64) -> bool {
        self.last_hit_time.is_some_and(|last| now - last > self.reset_window)
    }

    fn break_streak(&mut self) -> Option<u32> {
        if self.count == 0 {
            return None;
        }
        self.count = 0;
        Some(0)
    }
}
