// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Coarse activity vocabulary and platform label normalization

use serde::{Deserialize, Serialize};

/// Internal coarse activity vocabulary.
///
/// The external classifier already applies its own confidence filtering, so
/// no temporal smoothing happens here. Latest label wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityLabel {
    /// Device is at rest.
    Stationary,
    /// On foot, walking pace.
    Walking,
    /// On foot, running pace.
    Running,
    /// Riding in a car, bus, train, or similar.
    InVehicle,
    /// Classifier has no opinion.
    Unknown,
}

impl ActivityLabel {
    /// Coarse speed estimate for this label in m/s.
    ///
    /// These are heuristic constants, not measurements: vehicle ~36 km/h,
    /// running ~10.8 km/h, walking ~5 km/h. `Unknown` has no estimate.
    pub fn speed_estimate(&self) -> Option<f64> {
        match self {
            ActivityLabel::InVehicle => Some(10.0),
            ActivityLabel::Running => Some(3.0),
            ActivityLabel::Walking => Some(1.4),
            ActivityLabel::Stationary => Some(0.0),
            ActivityLabel::Unknown => None,
        }
    }

    /// Whether this label alone is a confident movement verdict.
    pub fn is_on_foot(&self) -> bool {
        matches!(self, ActivityLabel::Walking | ActivityLabel::Running)
    }
}

impl Default for ActivityLabel {
    fn default() -> Self {
        ActivityLabel::Unknown
    }
}

impl std::fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityLabel::Stationary => "stationary",
            ActivityLabel::Walking => "walking",
            ActivityLabel::Running => "running",
            ActivityLabel::InVehicle => "in-vehicle",
            ActivityLabel::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Raw label vocabulary as delivered by platform activity classifiers.
///
/// Platforms disagree on the exact set; this is the superset we normalize
/// from. `Cycling` folds into `InVehicle`: riding a bicycle is movement, but
/// not the on-foot movement the downstream policy cares about, and it gets
/// the same unconditional override as automotive travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawActivityClass {
    Stationary,
    Walking,
    Running,
    Automotive,
    Cycling,
    Unknown,
}

impl From<RawActivityClass> for ActivityLabel {
    fn from(raw: RawActivityClass) -> Self {
        match raw {
            RawActivityClass::Stationary => ActivityLabel::Stationary,
            RawActivityClass::Walking => ActivityLabel::Walking,
            RawActivityClass::Running => ActivityLabel::Running,
            RawActivityClass::Automotive => ActivityLabel::InVehicle,
            RawActivityClass::Cycling => ActivityLabel::InVehicle,
            RawActivityClass::Unknown => ActivityLabel::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_estimates() {
        assert_eq!(ActivityLabel::InVehicle.speed_estimate(), Some(10.0));
        assert_eq!(ActivityLabel::Running.speed_estimate(), Some(3.0));
        assert_eq!(ActivityLabel::Walking.speed_estimate(), Some(1.4));
        assert_eq!(ActivityLabel::Stationary.speed_estimate(), Some(0.0));
        assert_eq!(ActivityLabel::Unknown.speed_estimate(), None);
    }

    #[test]
    fn test_cycling_normalizes_to_vehicle() {
        assert_eq!(
            ActivityLabel::from(RawActivityClass::Cycling),
            ActivityLabel::InVehicle
        );
        assert_eq!(
            ActivityLabel::from(RawActivityClass::Automotive),
            ActivityLabel::InVehicle
        );
    }

    #[test]
    fn test_on_foot_labels() {
        assert!(ActivityLabel::Walking.is_on_foot());
        assert!(ActivityLabel::Running.is_on_foot());
        assert!(!ActivityLabel::InVehicle.is_on_foot());
        assert!(!ActivityLabel::Stationary.is_on_foot());
        assert!(!ActivityLabel::Unknown.is_on_foot());
    }
}
