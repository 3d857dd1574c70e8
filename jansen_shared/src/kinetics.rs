//! Lumped kinetic model on top of the kinematic sweep.
//!
//! Mass is concentrated at the tracked foot point (`total_mass` spread evenly
//! over every link of every leg), and the crank torque is the magnitude of the
//! resulting joint force acting at the crank radius. Not a per-link
//! Newton-Euler solve.

use serde::Serialize;
use std::f64::consts::TAU;

use crate::config::MechanismConfig;
use crate::geometry::Vector2D;
use crate::trajectory::Trajectory;

/// Lengths and accelerations are carried in centimetres.
pub const CM_TO_M: f64 = 0.01;

/// Forces (N), torque (N·m) and power (W) at one crank angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KineticSample {
    pub index: usize,
    pub theta: f64,
    pub inertial_force: Vector2D,
    pub weight: Vector2D,
    /// Force the linkage has to supply: inertial force minus weight.
    pub joint_force: Vector2D,
    pub joint_force_magnitude: f64,
    pub torque: f64,
    pub power: f64,
    /// Legs summed into this sample; 1 for a single-leg series.
    pub solved_legs: usize,
}

/// Kinetic profile of one leg, or of all legs combined (`leg == None`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KineticSeries {
    pub leg: Option<usize>,
    /// Legs feeding the series; 1 unless combined.
    pub leg_count: usize,
    pub omega_crank: f64,
    /// `None` where the underlying frame is a gap.
    pub samples: Vec<Option<KineticSample>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KineticSummary {
    pub mean_torque: Option<f64>,
    pub peak_torque: Option<f64>,
    pub mean_power: Option<f64>,
    pub peak_power: Option<f64>,
    /// Samples carrying a value.
    pub valid: usize,
    /// Valid samples to which every leg contributed.
    pub full_coverage: usize,
    /// Valid samples missing at least one leg; their load is a lower bound.
    pub partial_coverage: usize,
    pub excluded: usize,
}

impl KineticSeries {
    pub fn valid(&self) -> impl Iterator<Item = &KineticSample> + '_ {
        self.samples.iter().flatten()
    }

    pub fn excluded_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_none()).count()
    }

    pub fn summary(&self) -> KineticSummary {
        let valid: Vec<&KineticSample> = self.valid().collect();
        let n = valid.len();
        let mean = |f: fn(&KineticSample) -> f64| (n > 0).then(|| valid.iter().map(|s| f(s)).sum::<f64>() / n as f64);
        let peak = |f: fn(&KineticSample) -> f64| valid.iter().map(|s| f(s)).reduce(f64::max);
        let full_coverage = valid.iter().filter(|s| s.solved_legs == self.leg_count).count();
        KineticSummary {
            mean_torque: mean(|s| s.torque),
            peak_torque: peak(|s| s.torque),
            mean_power: mean(|s| s.power),
            peak_power: peak(|s| s.power),
            valid: n,
            full_coverage,
            partial_coverage: n - full_coverage,
            excluded: self.samples.len() - n,
        }
    }
}

/// Per-frame forces, crank torque and power for one leg.
pub fn compute_kinetics(trajectory: &Trajectory, config: &MechanismConfig) -> KineticSeries {
    let mass = config.mass_per_link();
    let crank_radius = config.links.oa * CM_TO_M;
    let weight = Vector2D::new(0.0, -mass * config.gravity);

    let samples = trajectory
        .samples
        .iter()
        .map(|sample| {
            sample.frame().map(|frame| {
                let inertial_force = frame.a_g() * (CM_TO_M * mass);
                let joint_force = inertial_force - weight;
                let joint_force_magnitude = joint_force.norm();
                let torque = joint_force_magnitude * crank_radius;
                KineticSample {
                    index: sample.index,
                    theta: sample.theta,
                    inertial_force,
                    weight,
                    joint_force,
                    joint_force_magnitude,
                    torque,
                    power: torque * trajectory.omega_crank,
                    solved_legs: 1,
                }
            })
        })
        .collect();

    KineticSeries {
        leg: Some(trajectory.leg),
        leg_count: 1,
        omega_crank: trajectory.omega_crank,
        samples,
    }
}

/// Load on the single crank shaft driving every leg: per-index sums over the
/// legs that solved there. Each combined sample records how many legs it
/// covers; an index is a gap only when no leg solved.
pub fn combine_kinetics(series: &[KineticSeries]) -> KineticSeries {
    let Some(first) = series.first() else {
        return KineticSeries {
            leg: None,
            leg_count: 0,
            omega_crank: 0.0,
            samples: Vec::new(),
        };
    };
    let len = first.samples.len();

    let samples: Vec<Option<KineticSample>> = (0..len)
        .map(|index| {
            let mut combined = KineticSample {
                index,
                theta: TAU * index as f64 / len as f64,
                inertial_force: Vector2D::zeros(),
                weight: Vector2D::zeros(),
                joint_force: Vector2D::zeros(),
                joint_force_magnitude: 0.0,
                torque: 0.0,
                power: 0.0,
                solved_legs: 0,
            };
            for leg in series.iter().filter_map(|s| s.samples.get(index).and_then(Option::as_ref)) {
                combined.inertial_force += leg.inertial_force;
                combined.weight += leg.weight;
                combined.joint_force += leg.joint_force;
                combined.joint_force_magnitude += leg.joint_force_magnitude;
                combined.torque += leg.torque;
                combined.power += leg.power;
                combined.solved_legs += leg.solved_legs;
            }
            (combined.solved_legs > 0).then_some(combined)
        })
        .collect();

    let combined = KineticSeries {
        leg: None,
        leg_count: series.iter().map(|s| s.leg_count).sum(),
        omega_crank: first.omega_crank,
        samples,
    };
    let summary = combined.summary();
    if summary.partial_coverage > 0 || summary.excluded > 0 {
        tracing::warn!(
            "Combined crank load: {} of {} angles miss at least one leg, {} have no leg solved",
            summary.partial_coverage,
            len,
            summary.excluded
        );
    }
    combined
}
