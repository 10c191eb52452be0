use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{JudgmentPolicy, Result, RhythmError};

/// Top-level configuration structure for the rhythm engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub queue: QueueConfig,
    pub timeline: TimelineConfig,
    pub judgment: JudgmentConfig,
    pub combo: ComboConfig,
    pub meter: MeterConfig,
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing sections fall back to their
    /// defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks the values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity must be at least 1"));
        }
        check_window("timeline.safety_margin_seconds", self.timeline.safety_margin_seconds)?;
        check_window(
            "timeline.resync_tolerance_seconds",
            self.timeline.resync_tolerance_seconds,
        )?;
        match self.judgment.policy {
            JudgmentPolicy::TwoTier { window } => check_window("judgment.window", window)?,
            JudgmentPolicy::ThreeTier {
                perfect_window,
                max_window,
                ..
            } => {
                check_window("judgment.perfect_window", perfect_window)?;
                check_window("judgment.max_window", max_window)?;
                if perfect_window > max_window {
                    return Err(invalid(
                        "judgment.perfect_window must not exceed judgment.max_window",
                    ));
                }
            }
        }
        check_window("combo.reset_window_seconds", self.combo.reset_window_seconds)?;
        if self.meter.heavy_beat_every == 0 {
            return Err(invalid("meter.heavy_beat_every must be at least 1"));
        }
        Ok(())
    }
}

fn check_window(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be a finite, non-negative number of seconds")))
    }
}

fn invalid(message: impl Into<String>) -> RhythmError {
    RhythmError::InvalidConfig(message.into())
}

/// Sizing of the audio-thread mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Controls how far the predicted timeline reaches and when it is rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Extra time past the end of the track covered by predicted entries.
    pub safety_margin_seconds: f64,
    /// Drift between a new anchor and its existing timeline entry that forces
    /// a rebuild even when the tempo is unchanged.
    pub resync_tolerance_seconds: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            safety_margin_seconds: 2.0,
            resync_tolerance_seconds: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentConfig {
    pub policy: JudgmentPolicy,
    /// How many beats past the last confirmed one a hit may still be judged.
    pub future_beat_allowance: u32,
    /// Consumed beats older than `latest - consumed_history` are forgotten.
    pub consumed_history: u32,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            policy: JudgmentPolicy::default(),
            future_beat_allowance: 1,
            consumed_history: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    pub reset_window_seconds: f64,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            reset_window_seconds: 2.0,
        }
    }
}

/// Accent layout within a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Beat `b` of a bar (1-based) is heavy when `(b - 1) % heavy_beat_every == 0`.
    pub heavy_beat_every: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self { heavy_beat_every: 2 }
    }
}
