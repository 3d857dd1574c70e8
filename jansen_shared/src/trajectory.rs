// src/trajectory.rs - multi-leg sweep over one crank revolution
use rayon::prelude::*;
use serde::Serialize;
use std::f64::consts::TAU;

use crate::config::MechanismConfig;
use crate::kinematics::{JointState, KinematicFrame, KinematicsError, frame_from};

/// One point of the crank-angle grid. A failed solve stays in the sequence as
/// a gap so that indices remain phase-comparable across legs.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub theta: f64,
    pub outcome: Result<KinematicFrame, KinematicsError>,
}

impl Sample {
    pub fn frame(&self) -> Option<&KinematicFrame> {
        self.outcome.as_ref().ok()
    }

    pub fn is_valid(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Frames of one leg over a full revolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub leg: usize,
    /// Crank phase of this leg (rad).
    pub phase: f64,
    pub omega_crank: f64,
    pub alpha_crank: f64,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContactSummary {
    pub samples: usize,
    pub in_contact: usize,
    /// Gaps, never counted as support.
    pub excluded: usize,
    /// `in_contact / samples`.
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSummary {
    /// Mean |v_G| over valid frames (cm/s); `None` when nothing converged.
    pub mean: Option<f64>,
    pub max: Option<f64>,
    pub valid: usize,
    pub excluded: usize,
}

/// Stride description of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaitMetrics {
    pub leg: usize,
    /// Horizontal extent of the foot path (cm).
    pub step_length: Option<f64>,
    /// Vertical extent of the foot path (cm).
    pub step_height: Option<f64>,
    pub lowest_foot: Option<f64>,
    pub contact: ContactSummary,
    pub speed: SpeedSummary,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_valid()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.len() - self.valid_count()
    }

    pub fn frames(&self) -> impl Iterator<Item = &KinematicFrame> + '_ {
        self.samples.iter().filter_map(Sample::frame)
    }

    /// Ground contact per sample; `None` for a gap.
    pub fn contacts(&self, tolerance: f64) -> Vec<Option<bool>> {
        self.samples
            .iter()
            .map(|s| s.frame().map(|frame| frame.in_contact(tolerance)))
            .collect()
    }

    pub fn contact_summary(&self, tolerance: f64) -> ContactSummary {
        let contacts = self.contacts(tolerance);
        let in_contact = contacts.iter().filter(|c| **c == Some(true)).count();
        let excluded = contacts.iter().filter(|c| c.is_none()).count();
        let fraction = if contacts.is_empty() {
            0.0
        } else {
            in_contact as f64 / contacts.len() as f64
        };
        ContactSummary {
            samples: contacts.len(),
            in_contact,
            excluded,
            fraction,
        }
    }

    pub fn speed_summary(&self) -> SpeedSummary {
        let speeds: Vec<f64> = self.frames().map(|f| f.v_g().norm()).collect();
        let (mean, max) = if speeds.is_empty() {
            (None, None)
        } else {
            (
                Some(speeds.iter().sum::<f64>() / speeds.len() as f64),
                Some(speeds.iter().copied().fold(f64::MIN, f64::max)),
            )
        };
        SpeedSummary {
            mean,
            max,
            valid: speeds.len(),
            excluded: self.len() - speeds.len(),
        }
    }

    pub fn gait_metrics(&self, tolerance: f64) -> GaitMetrics {
        let extent = |values: Vec<f64>| -> Option<(f64, f64)> {
            if values.is_empty() {
                return None;
            }
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some((lo, hi))
        };
        let xs = extent(self.frames().map(|f| f.foot().x).collect());
        let ys = extent(self.frames().map(|f| f.foot().y).collect());
        GaitMetrics {
            leg: self.leg,
            step_length: xs.map(|(lo, hi)| hi - lo),
            step_height: ys.map(|(lo, hi)| hi - lo),
            lowest_foot: ys.map(|(lo, _)| lo),
            contact: self.contact_summary(tolerance),
            speed: self.speed_summary(),
        }
    }
}

/// Skipped-frame accounting for a sweep that did not fully converge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailure {
    /// `(leg, skipped frames)` for every leg with at least one gap.
    pub skipped: Vec<(usize, usize)>,
    pub total_skipped: usize,
    pub total_samples: usize,
}

/// Trajectories of every leg on a shared crank-angle grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectories {
    pub sample_count: usize,
    pub legs: Vec<Trajectory>,
}

impl Trajectories {
    pub fn get(&self, leg: usize) -> Option<&Trajectory> {
        self.legs.get(leg)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> + '_ {
        self.legs.iter()
    }

    pub fn is_complete(&self) -> bool {
        self.legs.iter().all(|t| t.skipped_count() == 0)
    }

    pub fn partial_failure(&self) -> Option<PartialFailure> {
        let skipped: Vec<(usize, usize)> = self
            .legs
            .iter()
            .map(|t| (t.leg, t.skipped_count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        if skipped.is_empty() {
            return None;
        }
        Some(PartialFailure {
            total_skipped: skipped.iter().map(|(_, n)| n).sum(),
            total_samples: self.sample_count * self.legs.len(),
            skipped,
        })
    }
}

/// Crank angle of sample `index` for a leg at `phase`, wrapped into [0, 2π).
pub fn sample_angle(index: usize, sample_count: usize, phase: f64) -> f64 {
    (TAU * index as f64 / sample_count as f64 + phase).rem_euclid(TAU)
}

/// Sweeps one leg through a revolution, seeding each solve from the previous
/// converged state. A gap resets the seed.
pub fn sweep_leg(
    config: &MechanismConfig,
    leg: usize,
    omega_crank: f64,
    alpha_crank: f64,
    sample_count: usize,
) -> Trajectory {
    let phase = config.leg_phase(leg);
    let mut previous: Option<JointState> = None;
    let mut samples = Vec::with_capacity(sample_count);

    for index in 0..sample_count {
        let theta = sample_angle(index, sample_count, phase);
        let outcome = frame_from(theta, omega_crank, alpha_crank, config, previous.as_ref());
        previous = match &outcome {
            Ok(frame) => Some(frame.joints),
            Err(err) => {
                tracing::debug!("Leg {} sample {} skipped: {}", leg, index, err);
                None
            }
        };
        samples.push(Sample { index, theta, outcome });
    }

    let trajectory = Trajectory {
        leg,
        phase,
        omega_crank,
        alpha_crank,
        samples,
    };
    if trajectory.skipped_count() > 0 {
        tracing::warn!(
            "Leg {}: {} of {} frames did not solve",
            leg,
            trajectory.skipped_count(),
            sample_count
        );
    }
    trajectory
}

/// Builds the trajectory of every leg, one parallel task per leg.
///
/// Fails only for an infeasible configuration or an empty grid; frames that
/// do not solve are recorded as gaps (see [`Trajectories::partial_failure`]).
pub fn build_trajectories(
    config: &MechanismConfig,
    omega_crank: f64,
    alpha_crank: f64,
    sample_count: usize,
) -> Result<Trajectories, KinematicsError> {
    config.validate()?;
    if sample_count == 0 {
        return Err(KinematicsError::InvalidParameters(
            "sample count must be at least 1".to_string(),
        ));
    }
    if !omega_crank.is_finite() || !alpha_crank.is_finite() {
        return Err(KinematicsError::InvalidParameters(format!(
            "crank speed/acceleration must be finite, got {} / {}",
            omega_crank, alpha_crank
        )));
    }

    let legs: Vec<Trajectory> = (0..config.leg_count)
        .into_par_iter()
        .map(|leg| sweep_leg(config, leg, omega_crank, alpha_crank, sample_count))
        .collect();

    let trajectories = Trajectories { sample_count, legs };
    match trajectories.partial_failure() {
        Some(failure) => tracing::info!(
            "Built {} legs x {} samples, {} frames skipped",
            config.leg_count,
            sample_count,
            failure.total_skipped
        ),
        None => tracing::info!("Built {} legs x {} samples", config.leg_count, sample_count),
    }
    Ok(trajectories)
}
