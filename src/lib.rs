// src/lib.rs - host side of the walker: config files, reports, sweep driver
pub mod config;
pub mod report;

use config::{ConfigError, SimulationConfig};
use jansen_shared::config::MechanismConfig;
use jansen_shared::kinematics::KinematicsError;
use jansen_shared::trajectory::{Trajectories, build_trajectories};
use report::SimulationReport;

pub use jansen_shared;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Sweep failed: {0}")]
    Kinematics(#[from] KinematicsError),
}

/// Result of running the configured sweep.
#[derive(Debug, Clone)]
pub struct SweepOutput {
    pub mechanism: MechanismConfig,
    pub trajectories: Trajectories,
    pub report: SimulationReport,
}

pub fn run_sweep(config: &SimulationConfig) -> Result<SweepOutput, SweepError> {
    let mechanism = config.mechanism()?;
    let sweep = &config.sweep;
    tracing::info!(
        "Sweeping {} legs, {} samples at {} rad/s",
        mechanism.leg_count,
        sweep.samples,
        sweep.crank_speed
    );
    let trajectories = build_trajectories(&mechanism, sweep.crank_speed, sweep.crank_acceleration, sweep.samples)?;
    let report = SimulationReport::new(&trajectories, &mechanism);
    Ok(SweepOutput {
        mechanism,
        trajectories,
        report,
    })
}
