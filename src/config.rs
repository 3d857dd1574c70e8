//! # Simulation Configuration
//!
//! One TOML file describes the walker and the sweep to run over it. Every
//! section is optional and falls back to the eight-legged reference walker.
//!
//! ## Example
//!
//! ```toml
//! [mechanism]
//! c = [-4.3, -1.2]
//!
//! [mechanism.links]
//! oa = 0.7
//!
//! [mechanism.assembly]
//! g = "right"
//!
//! [body]
//! mass = 2.5
//!
//! [legs]
//! count = 6
//!
//! [sweep]
//! samples = 720
//! crank_speed = 6.4
//! ```

// src/config.rs - simulation config file
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use jansen_shared::config::{AssemblyModes, LinkLengths, MechanismConfig, SolverSettings};
use jansen_shared::geometry::Point2D;
use jansen_shared::kinematics::KinematicsError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid mechanism: {0}")]
    Mechanism(#[from] KinematicsError),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub mechanism: MechanismSection,
    #[serde(default)]
    pub body: BodyConfig,
    #[serde(default)]
    pub legs: LegsConfig,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Fixed pivots (cm, `[x, y]`) and link geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MechanismSection {
    #[serde(default = "default_o")]
    pub o: [f64; 2],
    #[serde(default = "default_c")]
    pub c: [f64; 2],
    #[serde(default = "default_d")]
    pub d: [f64; 2],
    #[serde(default)]
    pub links: LinkLengths,
    #[serde(default)]
    pub assembly: AssemblyModes,
}

impl Default for MechanismSection {
    fn default() -> Self {
        Self {
            o: default_o(),
            c: default_c(),
            d: default_d(),
            links: LinkLengths::default(),
            assembly: AssemblyModes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BodyConfig {
    /// Total walker mass (kg).
    #[serde(default = "default_mass")]
    pub mass: f64,
    #[serde(default = "default_gravity")]
    pub gravity: f64,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            mass: default_mass(),
            gravity: default_gravity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LegsConfig {
    #[serde(default = "default_leg_count")]
    pub count: usize,
    /// Crank phase between consecutive legs; 360° / count when unset.
    #[serde(default)]
    pub phase_offset_deg: Option<f64>,
}

impl Default for LegsConfig {
    fn default() -> Self {
        Self {
            count: default_leg_count(),
            phase_offset_deg: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SweepConfig {
    /// Samples per crank revolution.
    #[serde(default = "default_samples")]
    pub samples: usize,
    /// Crank speed (rad/s).
    #[serde(default = "default_crank_speed")]
    pub crank_speed: f64,
    /// Crank acceleration (rad/s²).
    #[serde(default)]
    pub crank_acceleration: f64,
    /// Foot height (cm) at or below which a leg is grounded.
    #[serde(default)]
    pub contact_tolerance: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            crank_speed: default_crank_speed(),
            crank_acceleration: 0.0,
            contact_tolerance: 0.0,
        }
    }
}

fn default_o() -> [f64; 2] { [0.0, 0.0] }
fn default_c() -> [f64; 2] { [-4.3, -1.2] }
fn default_d() -> [f64; 2] { [-2.0, 1.3] }
fn default_mass() -> f64 { 2.5 }
fn default_gravity() -> f64 { 9.81 }
fn default_leg_count() -> usize { 8 }
fn default_samples() -> usize { 360 }
fn default_crank_speed() -> f64 { 1.0 }

impl SimulationConfig {
    /// Builds and validates the solver-side mechanism description.
    pub fn mechanism(&self) -> Result<MechanismConfig, ConfigError> {
        let point = |p: [f64; 2]| Point2D::new(p[0], p[1]);
        let m = &self.mechanism;
        let mut builder = MechanismConfig::builder()
            .anchors(point(m.o), point(m.c), point(m.d))
            .links(m.links)
            .assembly(m.assembly)
            .total_mass(self.body.mass)
            .gravity(self.body.gravity)
            .legs(self.legs.count)
            .contact_tolerance(self.sweep.contact_tolerance)
            .solver(self.solver);
        if let Some(deg) = self.legs.phase_offset_deg {
            builder = builder.phase_offset(deg.to_radians());
        }
        Ok(builder.build()?)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SimulationConfig, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jansen_shared::config::Link;
    use jansen_shared::geometry::Branch;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = SimulationConfig::default();
        assert_eq!(config.legs.count, 8);
        assert_eq!(config.sweep.samples, 360);
        assert_eq!(config.body.mass, 2.5);
        assert_eq!(config.mechanism().unwrap(), MechanismConfig::reference());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("walker.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[mechanism.links]\noa = 0.7\n\n[legs]\ncount = 6\n\n[sweep]\nsamples = 90").unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.sweep.samples, 90);
        // Defaults for missing fields
        assert_eq!(config.mechanism.links.ab, 3.0);
        assert_eq!(config.sweep.crank_speed, 1.0);

        let mechanism = config.mechanism().unwrap();
        assert_eq!(mechanism.links.get(Link::Oa), 0.7);
        assert_eq!(mechanism.leg_count, 6);
        assert!((mechanism.phase_offset - 60f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(&file_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_anchor_and_assembly_parsing() {
        let toml = r#"
            [mechanism]
            c = [-4.0, -1.0]

            [mechanism.assembly]
            g = "left"

            [legs]
            count = 4
            phase_offset_deg = 30.0
        "#;
        let config: SimulationConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mechanism.c, [-4.0, -1.0]);
        assert_eq!(config.mechanism.o, [0.0, 0.0]);
        assert_eq!(config.mechanism.assembly.g, Branch::Left);
        assert_eq!(config.mechanism.assembly.b, Branch::Right);
        let mechanism = config.mechanism().unwrap();
        assert!((mechanism.phase_offset - 30f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_infeasible_mechanism_rejected() {
        let toml = "[mechanism.links]\neg = 9.5\nef = 3.7\nfg = 5.65\n";
        let config: SimulationConfig = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.mechanism(),
            Err(ConfigError::Mechanism(KinematicsError::InfeasibleConfiguration(_)))
        ));

        let config: SimulationConfig = toml::from_str("[legs]\ncount = 100000\n").unwrap();
        assert!(matches!(
            config.mechanism(),
            Err(ConfigError::Mechanism(KinematicsError::InfeasibleConfiguration(_)))
        ));
    }
}
