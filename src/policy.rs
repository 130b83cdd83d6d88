//! Mode selection.
//!
//! Three policies reduce different evidence to the same three-valued
//! decision, all falling back to `Hybrid` when the evidence is inconclusive:
//!
//! - [`select_by_intent_window`] reads only the trailing thoughts' intents.
//! - [`select_by_signals`] fuses sensed signal strength with the last intent.
//! - [`select_by_features`] reads explicit problem features.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::signals::Signal;
use crate::thoughts::{Intent, Thought};

/// How many trailing thoughts the intent-window policy inspects.
pub const INTENT_WINDOW: usize = 3;

/// How many of the strongest signals of each kind feed the signal policy.
pub const SIGNAL_WINDOW: usize = 5;

/// Below this discovery sum, exploration counts as quiet.
const QUIET_DISCOVERY: f64 = 0.2;
/// Above this metric sum, outcomes are still being recorded.
const ACTIVE_METRIC: f64 = 0.3;
/// Above this discovery sum, exploration counts as productive.
const PRODUCTIVE_DISCOVERY: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Scout,
    Adas,
    Hybrid,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scout => "scout",
            Self::Adas => "adas",
            Self::Hybrid => "hybrid",
        }
    }

    /// The intent that makes the intent-window policy pick this mode.
    pub fn canonical_intent(self) -> Intent {
        match self {
            Self::Adas => Intent::Design,
            Self::Scout => Intent::Explore,
            Self::Hybrid => Intent::Balance,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scout" => Ok(Self::Scout),
            "adas" => Ok(Self::Adas),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

// ── Intent window ───────────────────────────────────────

/// Picks a mode from the last [`INTENT_WINDOW`] thoughts.
///
/// Any `explore` wins, then any `design`, otherwise `Hybrid`.
pub fn select_by_intent_window(thoughts: &[Thought]) -> Mode {
    let start = thoughts.len().saturating_sub(INTENT_WINDOW);
    let tail = &thoughts[start..];
    let has = |intent: Intent| tail.iter().any(|t| t.intent == Some(intent));

    if has(Intent::Explore) {
        Mode::Scout
    } else if has(Intent::Design) {
        Mode::Adas
    } else {
        Mode::Hybrid
    }
}

// ── Signals ─────────────────────────────────────────────

/// Summed decayed strengths of the most recent signals of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalReading {
    pub discovery: f64,
    pub metric: f64,
}

impl SignalReading {
    pub fn from_signals(discoveries: &[Signal], metrics: &[Signal]) -> Self {
        Self {
            discovery: discoveries.iter().map(|s| s.strength).sum(),
            metric: metrics.iter().map(|s| s.strength).sum(),
        }
    }
}

/// Picks a mode from sensed signal strength, falling back to the last intent.
///
/// Quiet exploration with outcomes still arriving means the search is
/// stalling, so directed design takes over. Strong discovery flow keeps
/// the scouts out.
pub fn select_by_signals(reading: SignalReading, last_intent: Option<Intent>) -> Mode {
    if reading.discovery < QUIET_DISCOVERY && reading.metric > ACTIVE_METRIC {
        return Mode::Adas;
    }
    if reading.discovery > PRODUCTIVE_DISCOVERY {
        return Mode::Scout;
    }
    match last_intent {
        Some(Intent::Design) => Mode::Adas,
        Some(Intent::Explore) => Mode::Scout,
        _ => Mode::Hybrid,
    }
}

// ── Features ────────────────────────────────────────────

/// Explicit problem features supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModeFeatures {
    pub problem_size: Option<f64>,
    pub time_budget_sec: Option<f64>,
    pub novelty_required: bool,
    pub reliability_required: bool,
}

/// Picks a mode from explicit features. Missing numbers count as 0.
pub fn select_by_features(features: &ModeFeatures) -> Mode {
    if features.reliability_required && !features.novelty_required {
        return Mode::Adas;
    }
    if features.novelty_required && !features.reliability_required {
        return Mode::Scout;
    }
    let size = features.problem_size.unwrap_or(0.0);
    let budget = features.time_budget_sec.unwrap_or(0.0);
    if size > 1000.0 && budget < 60.0 {
        return Mode::Adas;
    }
    Mode::Hybrid
}
