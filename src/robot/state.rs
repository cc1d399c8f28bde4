//! Robot state: named joint positions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full-robot configuration keyed by joint name
///
/// Joint names are kept sorted so two states with the same positions compare
/// equal and iterate in the same order regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    positions: BTreeMap<String, f64>,
}

impl RobotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from `(joint, position)` pairs
    pub fn from_positions<I, S>(positions: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            positions: positions
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    pub fn set(&mut self, joint: impl Into<String>, position: f64) {
        self.positions.insert(joint.into(), position);
    }

    pub fn position(&self, joint: &str) -> Option<f64> {
        self.positions.get(joint).copied()
    }

    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.positions.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions for `joints` in the given order, `None` if any is missing
    pub fn positions_for(&self, joints: &[String]) -> Option<Vec<f64>> {
        joints.iter().map(|joint| self.position(joint)).collect()
    }

    /// Largest absolute joint displacement between two states over shared joints
    pub fn max_joint_distance(&self, other: &RobotState) -> f64 {
        self.positions
            .iter()
            .filter_map(|(name, a)| other.position(name).map(|b| (a - b).abs()))
            .fold(0.0, f64::max)
    }
}
