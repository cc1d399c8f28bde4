//! Iterative parabolic time parameterization
//!
//! Assigns time stamps to a geometric waypoint sequence so that joint
//! velocities and accelerations stay within configured limits. Segment
//! durations start at the velocity-limited minimum and are stretched
//! iteratively wherever the finite-difference acceleration exceeds the limit.

use crate::robot::{RobotState, RobotTrajectory, TrajectoryPoint};
use crate::services::TimeParameterization;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Velocity and acceleration bound for one joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimit {
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

/// Limits applied during time parameterization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    /// Velocity bound for joints without an override (units/s)
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,

    /// Acceleration bound for joints without an override (units/s^2)
    #[serde(default = "default_max_acceleration")]
    pub max_acceleration: f64,

    /// Per-joint overrides
    #[serde(default)]
    pub joints: HashMap<String, JointLimit>,
}

fn default_max_velocity() -> f64 {
    0.5
}

fn default_max_acceleration() -> f64 {
    1.0
}

impl Default for JointLimits {
    fn default() -> Self {
        Self {
            max_velocity: default_max_velocity(),
            max_acceleration: default_max_acceleration(),
            joints: HashMap::new(),
        }
    }
}

impl JointLimits {
    pub fn for_joint(&self, joint: &str) -> JointLimit {
        self.joints.get(joint).copied().unwrap_or(JointLimit {
            max_velocity: self.max_velocity,
            max_acceleration: self.max_acceleration,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.max_velocity) || !positive(self.max_acceleration) {
            return Err("Default joint limits must be positive".to_string());
        }
        for (joint, limit) in &self.joints {
            if !positive(limit.max_velocity) || !positive(limit.max_acceleration) {
                return Err(format!("Limits for joint '{}' must be positive", joint));
            }
        }
        Ok(())
    }
}

pub struct IterativeParabolicTimeParameterization {
    limits: JointLimits,
    max_iterations: usize,
    min_segment_duration: f64,
}

impl IterativeParabolicTimeParameterization {
    const ACCELERATION_TOLERANCE: f64 = 1e-6;

    pub fn new(limits: JointLimits) -> Self {
        Self {
            limits,
            max_iterations: 100,
            min_segment_duration: 1e-3,
        }
    }

    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    /// Velocity at every waypoint; endpoints are at rest.
    fn waypoint_velocities(positions: &[Vec<f64>], durations: &[f64], joint: usize) -> Vec<f64> {
        let n = positions.len();
        let mut velocities = vec![0.0; n];
        for i in 1..n.saturating_sub(1) {
            let before = (positions[i][joint] - positions[i - 1][joint]) / durations[i - 1];
            let after = (positions[i + 1][joint] - positions[i][joint]) / durations[i];
            velocities[i] = 0.5 * (before + after);
        }
        velocities
    }
}

impl TimeParameterization for IterativeParabolicTimeParameterization {
    fn compute(&self, group: &str, waypoints: &[RobotState]) -> Option<RobotTrajectory> {
        let first = waypoints.first()?;
        let joint_names: Vec<String> = first.joint_names().map(str::to_string).collect();
        let positions = waypoints
            .iter()
            .map(|state| state.positions_for(&joint_names))
            .collect::<Option<Vec<_>>>()?;
        let limits: Vec<JointLimit> = joint_names
            .iter()
            .map(|name| self.limits.for_joint(name))
            .collect();

        // Velocity-limited lower bound per segment
        let mut durations: Vec<f64> = positions
            .windows(2)
            .map(|pair| {
                pair[0]
                    .iter()
                    .zip(&pair[1])
                    .zip(&limits)
                    .map(|((a, b), limit)| (b - a).abs() / limit.max_velocity)
                    .fold(self.min_segment_duration, f64::max)
            })
            .collect();

        let joint_count = joint_names.len();
        let mut iterations = 0;
        loop {
            let mut stretched = false;
            for joint in 0..joint_count {
                let velocities = Self::waypoint_velocities(&positions, &durations, joint);
                let max_acceleration = limits[joint].max_acceleration;
                for (segment, duration) in durations.iter_mut().enumerate() {
                    let acceleration =
                        (velocities[segment + 1] - velocities[segment]).abs() / *duration;
                    if acceleration > max_acceleration * (1.0 + Self::ACCELERATION_TOLERANCE) {
                        *duration *= (acceleration / max_acceleration).sqrt().min(2.0);
                        stretched = true;
                    }
                }
            }
            iterations += 1;
            if !stretched || iterations >= self.max_iterations {
                break;
            }
        }
        debug!(group, iterations, waypoints = positions.len(), "Time parameterization converged");

        let velocities: Vec<Vec<f64>> = (0..joint_count)
            .map(|joint| Self::waypoint_velocities(&positions, &durations, joint))
            .collect();

        let mut trajectory = RobotTrajectory::new(group, joint_names);
        let mut time = 0.0;
        for (i, point_positions) in positions.iter().enumerate() {
            if i > 0 {
                time += durations[i - 1];
            }
            let point_velocities: Vec<f64> = velocities.iter().map(|v| v[i]).collect();
            let point_accelerations: Vec<f64> = velocities
                .iter()
                .map(|v| {
                    if i + 1 < v.len() {
                        (v[i + 1] - v[i]) / durations[i]
                    } else if i > 0 {
                        (v[i] - v[i - 1]) / durations[i - 1]
                    } else {
                        0.0
                    }
                })
                .collect();
            trajectory.points.push(TrajectoryPoint {
                positions: point_positions.clone(),
                velocities: point_velocities,
                accelerations: point_accelerations,
                time_from_start: time,
            });
        }
        Some(trajectory)
    }
}
