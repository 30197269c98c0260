//! Timing-based classification of loudness crossings into page-turn gestures.
//!
//! Only the time since the last *accepted* crossing matters:
//!
//! * `elapsed <= debounce`: tail or echo of the same sound, suppressed.
//! * `debounce < elapsed <= isolation`: second half of a double gesture, two `Backward`s.
//! * `elapsed > isolation`: a fresh single gesture, one `Forward`.

use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureEvent {
    Forward,
    Backward,
}

impl fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GestureEvent::Forward => f.write_str("forward"),
            GestureEvent::Backward => f.write_str("backward"),
        }
    }
}

/// Outcome of feeding one observation to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// At or below threshold.
    Quiet,
    /// Above threshold but inside the debounce window of the last trigger.
    Suppressed,
    /// Isolated crossing.
    Single,
    /// Crossing paired with the previous trigger.
    Double,
}

impl Verdict {
    /// Events to dispatch, in order. A double gesture sends `Backward` twice.
    pub fn events(self) -> &'static [GestureEvent] {
        match self {
            Verdict::Quiet | Verdict::Suppressed => &[],
            Verdict::Single => &[GestureEvent::Forward],
            Verdict::Double => &[GestureEvent::Backward, GestureEvent::Backward],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifierConfig {
    pub threshold: f32,
    pub debounce: Duration,
    pub isolation: Duration,
}

impl ClassifierConfig {
    pub fn new(threshold: f32, debounce: Duration, isolation: Duration) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Threshold(threshold));
        }
        if debounce >= isolation {
            return Err(ConfigError::WindowOrder { debounce, isolation });
        }
        Ok(Self {
            threshold,
            debounce,
            isolation,
        })
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 15.0,
            debounce: Duration::from_millis(250),
            isolation: Duration::from_millis(2500),
        }
    }
}

/// Timestamps are offsets on a monotonic timeline (session start or stream position).
pub struct GestureClassifier {
    config: ClassifierConfig,
    /// `None` until the first accepted crossing: older than any isolation window.
    last_trigger: Option<Duration>,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            last_trigger: None,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn last_trigger(&self) -> Option<Duration> {
        self.last_trigger
    }

    pub fn observe(&mut self, t: Duration, loudness: f32) -> Verdict {
        if loudness <= self.config.threshold {
            return Verdict::Quiet;
        }

        let verdict = match self.last_trigger {
            None => Verdict::Single,
            // Out-of-order timestamps saturate to zero and land in the debounce branch
            Some(last) => {
                let elapsed = t.saturating_sub(last);
                if elapsed > self.config.isolation {
                    Verdict::Single
                } else if elapsed > self.config.debounce {
                    Verdict::Double
                } else {
                    Verdict::Suppressed
                }
            }
        };

        match verdict {
            Verdict::Single | Verdict::Double => {
                log::debug!("{:?} crossing at {:.3}s (loudness {:.1})", verdict, t.as_secs_f64(), loudness);
                self.last_trigger = Some(t);
            }
            _ => {
                log::debug!("Suppressed crossing at {:.3}s (loudness {:.1})", t.as_secs_f64(), loudness);
            }
        }
        verdict
    }
}
