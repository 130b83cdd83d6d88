//! Pheromone-style coordination signals.
//!
//! Callers leave typed, timestamped evidence on disk; later callers sense
//! it with an influence that fades exponentially with age. Decay is
//! computed at read time and never written back, so sensing has no side
//! effects and emitters never need to coordinate with each other.

pub mod colony;
pub mod trails;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use colony::ColonySummary;
pub use trails::PheromoneTrails;

/// Decayed strength at or below which a signal is no longer sensed.
pub const RELEVANCE_FLOOR: f64 = 0.05;

/// The closed set of signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Discovery,
    Request,
    Metric,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [Self::Discovery, Self::Request, Self::Metric];

    /// Directory name of this kind's partition under the signals root.
    pub fn partition(self) -> &'static str {
        match self {
            Self::Discovery => "discoveries",
            Self::Request => "requests",
            Self::Metric => "metrics",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Request => "request",
            Self::Metric => "metric",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" | "discoveries" => Ok(Self::Discovery),
            "request" | "requests" => Ok(Self::Request),
            "metric" | "metrics" => Ok(Self::Metric),
            other => Err(format!("unknown signal kind: {other}")),
        }
    }
}

/// A persisted piece of coordination evidence.
///
/// Stored fields never change after emission. When returned from
/// [`PheromoneTrails::sense`], `strength` holds the decayed value at
/// read time instead of the emitted one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub kind: SignalKind,
    pub content: String,
    /// 0..1
    pub strength: f64,
    /// Epoch milliseconds
    pub created_at: i64,
}

impl Signal {
    /// Strength after exponential decay: `s0 · e^(−λ·Δt)`, `λ = ln 2 / half_life`.
    ///
    /// Ages below zero (clock skew between writers) count as zero, so the
    /// result never exceeds the emitted strength.
    pub fn decayed_strength(&self, now_ms: i64, half_life_secs: f64) -> f64 {
        let age_secs = (now_ms - self.created_at).max(0) as f64 / 1000.0;
        let lambda = std::f64::consts::LN_2 / half_life_secs;
        self.strength * (-lambda * age_secs).exp()
    }
}

/// Clamps an emitted strength into `[0, 1]`. NaN becomes 0.
pub fn clamp_strength(strength: f64) -> f64 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(strength: f64, created_at: i64) -> Signal {
        Signal {
            id: "s1".to_string(),
            kind: SignalKind::Discovery,
            content: "found X".to_string(),
            strength,
            created_at,
        }
    }

    #[test]
    fn test_decay_equals_emitted_at_zero_age() {
        let s = signal(0.7, 1_000);
        assert_eq!(s.decayed_strength(1_000, 3600.0), 0.7);
    }

    #[test]
    fn test_decay_halves_after_half_life() {
        let s = signal(1.0, 0);
        let decayed = s.decayed_strength(3_600_000, 3600.0);
        assert!((decayed - 0.5).abs() < 1e-9, "got {decayed}");

        let quarter = s.decayed_strength(7_200_000, 3600.0);
        assert!((quarter - 0.25).abs() < 1e-9, "got {quarter}");
    }

    #[test]
    fn test_decay_is_monotonic() {
        let s = signal(0.9, 0);
        let mut previous = s.decayed_strength(0, 600.0);
        for step in 1..200 {
            let current = s.decayed_strength(step * 37_000, 600.0);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let s = signal(0.6, 10_000);
        assert_eq!(s.decayed_strength(5_000, 3600.0), 0.6);
    }

    #[test]
    fn test_clamp_strength() {
        assert_eq!(clamp_strength(1.5), 1.0);
        assert_eq!(clamp_strength(-0.2), 0.0);
        assert_eq!(clamp_strength(0.42), 0.42);
        assert_eq!(clamp_strength(f64::NAN), 0.0);
        assert_eq!(clamp_strength(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_kind_partitions() {
        assert_eq!(SignalKind::Discovery.partition(), "discoveries");
        assert_eq!(SignalKind::Request.partition(), "requests");
        assert_eq!(SignalKind::Metric.partition(), "metrics");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("discovery".parse::<SignalKind>().unwrap(), SignalKind::Discovery);
        assert_eq!("metrics".parse::<SignalKind>().unwrap(), SignalKind::Metric);
        assert!("pheromone".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_signal_json_shape() {
        let json = serde_json::to_value(signal(1.0, 42)).unwrap();
        assert_eq!(json["kind"], "discovery");
        assert_eq!(json["createdAt"], 42);
        assert_eq!(json["strength"], 1.0);
    }
}
