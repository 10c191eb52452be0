//! Hit judgment against the predicted beat grid.
//!
//! Each attempt is matched to the nearest predicted beat and classified by
//! its signed offset `delta = hit_time - beat_time` (positive means late).
//! A beat index can produce at most one successful judgment; misses never
//! consume a beat, so a later attempt at the same beat may still land.
//! Beats that fall below the pruned consumed window are refused outright,
//! whether or not they were judged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{JudgmentConfig, VirtualBeatPredictor};

/// Window layout used to classify a hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentPolicy {
    /// Perfect inside `window`, Miss outside.
    TwoTier { window: f64 },
    /// Perfect inside `perfect_window`, Early/Late up to `max_window`, Miss
    /// beyond. `accept_early_late` decides whether Early/Late count as a
    /// successful hit (consume the beat, extend the combo) or as a failure.
    ThreeTier {
        perfect_window: f64,
        max_window: f64,
        accept_early_late: bool,
    },
}

impl Default for JudgmentPolicy {
    fn default() -> Self {
        Self::ThreeTier {
            perfect_window: 0.05,
            max_window: 0.15,
            accept_early_late: true,
        }
    }
}

impl JudgmentPolicy {
    pub fn classify(&self, delta: f64) -> Outcome {
        let distance = delta.abs();
        match *self {
            Self::TwoTier { window } => {
                if distance <= window {
                    Outcome::Perfect
                } else {
                    Outcome::Miss
                }
            }
            Self::ThreeTier {
                perfect_window,
                max_window,
                ..
            } => {
                if distance <= perfect_window {
                    Outcome::Perfect
                } else if distance > max_window {
                    Outcome::Miss
                } else if delta < 0.0 {
                    Outcome::Early
                } else {
                    Outcome::Late
                }
            }
        }
    }

    /// Whether `outcome` counts as a successful hit under this policy.
    pub fn is_success(&self, outcome: Outcome) -> bool {
        match (*self, outcome) {
            (_, Outcome::Perfect) => true,
            (_, Outcome::Miss) => false,
            (
                Self::ThreeTier {
                    accept_early_late, ..
                },
                Outcome::Early | Outcome::Late,
            ) => accept_early_late,
            (Self::TwoTier { .. }, Outcome::Early | Outcome::Late) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Perfect,
    Early,
    Late,
    Miss,
}

/// Result of one classified hit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    pub beat_index: i64,
    /// Signed offset from the predicted beat in seconds; positive is late.
    pub delta: f64,
    pub outcome: Outcome,
    /// True when the attempt consumed the beat.
    pub success: bool,
}

/// Attempts that were refused before any classification took place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("no beat marker has been confirmed yet")]
    NotReady,
    #[error("beat {beat} is too far ahead of the last confirmed beat {confirmed}")]
    FutureBeat { beat: i64, confirmed: i64 },
    #[error("beat {beat} has already been judged")]
    AlreadyConsumed { beat: i64 },
    #[error("beat {beat} is older than the judged window starting at beat {floor}")]
    StaleBeat { beat: i64, floor: i64 },
    #[error("hit time is not a finite number of seconds")]
    InvalidTime,
}

/// Running totals per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentCounts {
    pub perfect: u64,
    pub early: u64,
    pub late: u64,
    pub miss: u64,
    pub refused: u64,
}

impl JudgmentCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Perfect => self.perfect += 1,
            Outcome::Early => self.early += 1,
            Outcome::Late => self.late += 1,
            Outcome::Miss => self.miss += 1,
        }
    }
}

/// Owns the consumed-beat set and classifies hit attempts.
#[derive(Debug, Clone)]
pub struct JudgmentEngine {
    config: JudgmentConfig,
    consumed: BTreeSet<i64>,
    /// Lowest beat still tracked in `consumed`; anything below is refused.
    consumed_floor: Option<i64>,
    counts: JudgmentCounts,
}

impl JudgmentEngine {
    pub fn new(config: JudgmentConfig) -> Self {
        Self {
            config,
            consumed: BTreeSet::new(),
            consumed_floor: None,
            counts: JudgmentCounts::default(),
        }
    }

    pub fn policy(&self) -> &JudgmentPolicy {
        &self.config.policy
    }

    pub fn counts(&self) -> JudgmentCounts {
        self.counts
    }

    pub fn consumed_beats(&self) -> impl Iterator<Item = i64> + '_ {
        self.consumed.iter().copied()
    }

    pub fn is_consumed(&self, beat: i64) -> bool {
        self.consumed.contains(&beat)
    }

    /// Judges a hit at track time `time`.
    ///
    /// `Ok` carries every classified attempt, including misses; check
    /// [`JudgmentRecord::success`]. `Err` means the attempt was not judged at
    /// all.
    pub fn judge(
        &mut self,
        predictor: Option<&VirtualBeatPredictor<'_>>,
        time: f64,
    ) -> Result<JudgmentRecord, JudgeError> {
        let result = self.evaluate(predictor, time);
        match &result {
            Ok(record) => {
                self.counts.record(record.outcome);
                if record.success {
                    self.consume(record.beat_index);
                }
            }
            Err(_) => self.counts.refused += 1,
        }
        result
    }

    /// Side-effect free check of whether a hit at `time` would succeed,
    /// ignoring whether its beat was already consumed.
    pub fn is_on_beat(&self, predictor: Option<&VirtualBeatPredictor<'_>>, time: f64) -> bool {
        let Some(predictor) = predictor else {
            return false;
        };
        if !time.is_finite() {
            return false;
        }
        let beat = predictor.nearest_beat(time);
        let delta = time - predictor.predicted_time(beat);
        let policy = &self.config.policy;
        policy.is_success(policy.classify(delta))
    }

    fn evaluate(
        &self,
        predictor: Option<&VirtualBeatPredictor<'_>>,
        time: f64,
    ) -> Result<JudgmentRecord, JudgeError> {
        let predictor = predictor.ok_or(JudgeError::NotReady)?;
        if !time.is_finite() {
            return Err(JudgeError::InvalidTime);
        }

        let beat = predictor.nearest_beat(time);
        let delta = time - predictor.predicted_time(beat);

        let confirmed = predictor.anchor().global_beat_index;
        if beat > confirmed + i64::from(self.config.future_beat_allowance) {
            return Err(JudgeError::FutureBeat { beat, confirmed });
        }
        if self.consumed.contains(&beat) {
            return Err(JudgeError::AlreadyConsumed { beat });
        }
        if let Some(floor) = self.consumed_floor {
            if beat < floor {
                return Err(JudgeError::StaleBeat { beat, floor });
            }
        }

        let outcome = self.config.policy.classify(delta);
        Ok(JudgmentRecord {
            beat_index: beat,
            delta,
            outcome,
            success: self.config.policy.is_success(outcome),
        })
    }

    fn consume(&mut self, beat: i64) {
        self.consumed.insert(beat);
        let floor = beat - i64::from(self.config.consumed_history);
        if self.consumed_floor.map_or(true, |current| floor > current) {
            self.consumed_floor = Some(floor);
        }
        let floor = self.consumed_floor.unwrap_or(floor);
        self.consumed = self.consumed.split_off(&floor);
    }

    pub fn reset(&mut self) {
        self.consumed.clear();
        self.consumed_floor = None;
        self.counts = JudgmentCounts::default();
    }
}
