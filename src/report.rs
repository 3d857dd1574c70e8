// src/report.rs - sweep summary (JSON) and per-sample export (CSV)
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

use jansen_shared::config::MechanismConfig;
use jansen_shared::kinetics::{KineticSeries, KineticSummary, combine_kinetics, compute_kinetics};
use jansen_shared::trajectory::{GaitMetrics, PartialFailure, Trajectories};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegReport {
    #[serde(flatten)]
    pub gait: GaitMetrics,
    pub kinetics: KineticSummary,
}

/// Everything a sweep produced, minus the raw frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub sample_count: usize,
    pub leg_count: usize,
    pub crank_speed: f64,
    pub crank_acceleration: f64,
    pub mass_per_link: f64,
    pub legs: Vec<LegReport>,
    /// Mean of the per-leg ground contact fractions.
    pub contact_fraction: f64,
    /// Mean foot speed over every valid frame of every leg (cm/s).
    pub mean_foot_speed: Option<f64>,
    pub partial_failure: Option<PartialFailure>,
    /// Load on the shared crank shaft, all legs summed.
    pub crank_load: KineticSummary,
}

impl SimulationReport {
    pub fn new(trajectories: &Trajectories, config: &MechanismConfig) -> Self {
        let tolerance = config.contact_tolerance;
        let kinetics: Vec<KineticSeries> = trajectories.iter().map(|t| compute_kinetics(t, config)).collect();

        let legs: Vec<LegReport> = trajectories
            .iter()
            .zip(&kinetics)
            .map(|(t, k)| LegReport {
                gait: t.gait_metrics(tolerance),
                kinetics: k.summary(),
            })
            .collect();

        let contact_fraction = if legs.is_empty() {
            0.0
        } else {
            legs.iter().map(|l| l.gait.contact.fraction).sum::<f64>() / legs.len() as f64
        };
        let speeds: Vec<f64> = trajectories
            .iter()
            .flat_map(|t| t.frames().map(|f| f.v_g().norm()))
            .collect();
        let mean_foot_speed = (!speeds.is_empty()).then(|| speeds.iter().sum::<f64>() / speeds.len() as f64);

        let (crank_speed, crank_acceleration) = trajectories
            .get(0)
            .map(|t| (t.omega_crank, t.alpha_crank))
            .unwrap_or_default();

        Self {
            sample_count: trajectories.sample_count,
            leg_count: trajectories.legs.len(),
            crank_speed,
            crank_acceleration,
            mass_per_link: config.mass_per_link(),
            legs,
            contact_fraction,
            mean_foot_speed,
            partial_failure: trajectories.partial_failure(),
            crank_load: combine_kinetics(&kinetics).summary(),
        }
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Serialize)]
struct SampleRecord {
    leg: usize,
    index: usize,
    theta: f64,
    valid: bool,
    gx: Option<f64>,
    gy: Option<f64>,
    vx: Option<f64>,
    vy: Option<f64>,
    ax: Option<f64>,
    ay: Option<f64>,
    contact: Option<bool>,
    error: Option<String>,
}

/// One row per leg and sample; gaps keep their row with empty state columns.
pub fn write_samples_csv<W: Write>(
    trajectories: &Trajectories,
    contact_tolerance: f64,
    writer: W,
) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for trajectory in trajectories.iter() {
        for sample in &trajectory.samples {
            let frame = sample.frame();
            wtr.serialize(SampleRecord {
                leg: trajectory.leg,
                index: sample.index,
                theta: sample.theta,
                valid: frame.is_some(),
                gx: frame.map(|f| f.foot().x),
                gy: frame.map(|f| f.foot().y),
                vx: frame.map(|f| f.v_g().x),
                vy: frame.map(|f| f.v_g().y),
                ax: frame.map(|f| f.a_g().x),
                ay: frame.map(|f| f.a_g().y),
                contact: frame.map(|f| f.in_contact(contact_tolerance)),
                error: sample.outcome.as_ref().err().map(|e| e.to_string()),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}
