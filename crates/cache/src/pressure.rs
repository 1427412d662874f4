//! Memory pressure signal supplied by the host application
//!
//! The cache never measures memory itself. The host reports a coarse
//! [`PressureLevel`] and the cache reacts to it: persistent entries become
//! eligible for reclamation once the level reaches the configured threshold.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Memory pressure level reported by the host
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    /// Plenty of memory available
    #[default]
    Low,
    /// Memory is getting tight
    Medium,
    /// Memory should be released
    High,
}

impl PressureLevel {
    /// All levels in ascending order
    pub const ALL: [PressureLevel; 3] = [PressureLevel::Low, PressureLevel::Medium, PressureLevel::High];

    /// Map a utilization ratio (0.0 to 1.0) to a pressure level
    ///
    /// Convenience for hosts that track their own memory budget:
    /// below 50% is `Low`, below 80% is `Medium`, anything above is `High`.
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            PressureLevel::Low
        } else if utilization < 0.8 {
            PressureLevel::Medium
        } else {
            PressureLevel::High
        }
    }

    fn rank(self) -> u8 {
        match self {
            PressureLevel::Low => 0,
            PressureLevel::Medium => 1,
            PressureLevel::High => 2,
        }
    }

    /// Lowercase name, as used in configuration files and env vars
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureLevel::Low => "low",
            PressureLevel::Medium => "medium",
            PressureLevel::High => "high",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown pressure level name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pressure level: {0:?} (expected low, medium or high)")]
pub struct ParsePressureError(String);

impl FromStr for PressureLevel {
    type Err = ParsePressureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PressureLevel::Low),
            "medium" => Ok(PressureLevel::Medium),
            "high" => Ok(PressureLevel::High),
            _ => Err(ParsePressureError(s.to_string())),
        }
    }
}

/// Current pressure level together with the persistent reclaim threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureSignal {
    level: PressureLevel,
    threshold: PressureLevel,
}

impl PressureSignal {
    /// Create a signal at `level` with the given persistent reclaim threshold
    pub fn new(level: PressureLevel, threshold: PressureLevel) -> Self {
        Self { level, threshold }
    }

    /// Current pressure level
    pub fn level(&self) -> PressureLevel {
        self.level
    }

    /// Minimum level at which persistent entries become reclaimable
    pub fn threshold(&self) -> PressureLevel {
        self.threshold
    }

    /// Record a new level, returning the previous one
    pub fn set(&mut self, level: PressureLevel) -> PressureLevel {
        std::mem::replace(&mut self.level, level)
    }

    /// Change the reclaim threshold
    pub fn set_threshold(&mut self, threshold: PressureLevel) {
        self.threshold = threshold;
    }

    /// Returns true if persistent entries may be reclaimed at the current level
    pub fn persistent_eligible(&self) -> bool {
        self.level >= self.threshold
    }

    /// Number of levels the pressure must drop to fall below the threshold
    ///
    /// Zero when the current level is already below the threshold.
    pub fn levels_above_threshold(&self) -> u8 {
        if self.persistent_eligible() {
            self.level.rank() - self.threshold.rank() + 1
        } else {
            0
        }
    }
}

/// Estimates how much pressure is relieved by reclaiming one entry
///
/// Relief is measured in pressure levels: an estimate of `1.0` means that
/// reclaiming the entry is expected to lower the pressure by one full level.
pub trait PressureRelief<K, V>: Send + Sync {
    /// Estimated relief from reclaiming `value` stored under `key`
    fn relief(&self, key: &K, value: &V) -> f64;
}

impl<K, V, F> PressureRelief<K, V> for F
where
    F: Fn(&K, &V) -> f64 + Send + Sync,
{
    fn relief(&self, key: &K, value: &V) -> f64 {
        self(key, value)
    }
}

/// Fallback reclaim budget when no relief estimator is supplied
///
/// Each eligible sweep reclaims `ceil(fraction * candidates)` persistent
/// entries, and always at least one if any candidate exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchFraction(f64);

impl BatchFraction {
    /// Default fraction of persistent entries reclaimed per eligible sweep
    pub const DEFAULT: f64 = 0.25;

    /// Create a batch fraction, clamped to `(0.0, 1.0]`
    pub fn new(fraction: f64) -> Self {
        if fraction.is_nan() || fraction <= 0.0 {
            Self(Self::DEFAULT)
        } else {
            Self(fraction.min(1.0))
        }
    }

    /// The configured fraction
    pub fn fraction(&self) -> f64 {
        self.0
    }

    /// Number of entries to reclaim out of `candidates`
    pub fn batch_size(&self, candidates: usize) -> usize {
        if candidates == 0 {
            return 0;
        }
        let size = (candidates as f64 * self.0).ceil() as usize;
        size.clamp(1, candidates)
    }
}

impl Default for BatchFraction {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}
