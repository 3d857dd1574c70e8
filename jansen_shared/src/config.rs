//! Mechanism configuration: fixed geometry, body parameters and solver limits.
//!
//! A [`MechanismConfig`] is built once, validated, and then only ever passed by
//! reference to the solver stages.

use serde::{Deserialize, Serialize};

use crate::geometry::{Branch, Point2D};
use crate::kinematics::KinematicsError;

/// Number of rigid links carried by one leg, used to spread the total mass.
pub const LINKS_PER_LEG: usize = 8;

/// Upper bound on `leg_count`.
pub const MAX_LEGS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchors {
    /// Crank pivot.
    pub o: Point2D,
    /// Pivot of the BC rocker.
    pub c: Point2D,
    /// Pivot of the DE rocker.
    pub d: Point2D,
}

/// Link lengths in centimetres. Missing entries take the reference length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkLengths {
    pub oa: f64,
    pub ab: f64,
    pub bf: f64,
    pub bc: f64,
    pub de: f64,
    pub ef: f64,
    pub fg: f64,
    pub eg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    Oa,
    Ab,
    Bf,
    Bc,
    De,
    Ef,
    Fg,
    Eg,
}

impl Default for LinkLengths {
    fn default() -> Self {
        Self {
            oa: 1.0,
            ab: 3.0,
            bf: 4.34,
            bc: 2.28,
            de: 3.8,
            ef: 3.7,
            fg: 5.65,
            eg: 9.1,
        }
    }
}

impl LinkLengths {
    pub fn get(&self, link: Link) -> f64 {
        match link {
            Link::Oa => self.oa,
            Link::Ab => self.ab,
            Link::Bf => self.bf,
            Link::Bc => self.bc,
            Link::De => self.de,
            Link::Ef => self.ef,
            Link::Fg => self.fg,
            Link::Eg => self.eg,
        }
    }

    pub fn set(&mut self, link: Link, length: f64) {
        match link {
            Link::Oa => self.oa = length,
            Link::Ab => self.ab = length,
            Link::Bf => self.bf = length,
            Link::Bc => self.bc = length,
            Link::De => self.de = length,
            Link::Ef => self.ef = length,
            Link::Fg => self.fg = length,
            Link::Eg => self.eg = length,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Link, f64)> + '_ {
        [
            Link::Oa,
            Link::Ab,
            Link::Bf,
            Link::Bc,
            Link::De,
            Link::Ef,
            Link::Fg,
            Link::Eg,
        ]
        .into_iter()
        .map(move |link| (link, self.get(link)))
    }
}

/// Mirror solution picked for B, E and G whenever no previous state is
/// available to continue from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssemblyModes {
    /// Side of A -> C on which B sits.
    #[serde(default)]
    pub b: Branch,
    /// Side of D -> F on which E sits.
    #[serde(default)]
    pub e: Branch,
    /// Side of F -> E on which G sits.
    #[serde(default)]
    pub g: Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Residual norm (cm) below which a position solve has converged.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Relative determinant |det| / (|c1| |c2|) under which a loop Jacobian is
    /// treated as singular.
    #[serde(default = "default_singular_tolerance")]
    pub singular_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            singular_tolerance: default_singular_tolerance(),
        }
    }
}

fn default_tolerance() -> f64 { 1e-6 }
fn default_max_iterations() -> usize { 50 }
fn default_singular_tolerance() -> f64 { 1e-9 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismConfig {
    pub anchors: Anchors,
    pub links: LinkLengths,
    #[serde(default)]
    pub assembly: AssemblyModes,
    /// Total mass of the walker (kg).
    pub total_mass: f64,
    /// Gravitational acceleration (m/s²).
    pub gravity: f64,
    pub leg_count: usize,
    /// Crank phase between consecutive legs (rad).
    pub phase_offset: f64,
    /// Foot height (cm) at or below which a leg counts as grounded.
    #[serde(default)]
    pub contact_tolerance: f64,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl MechanismConfig {
    /// The eight-legged reference walker: O=(0,0), C=(-4.3,-1.2), D=(-2,1.3),
    /// legs 45° apart.
    pub fn reference() -> Self {
        Self {
            anchors: Anchors {
                o: Point2D::new(0.0, 0.0),
                c: Point2D::new(-4.3, -1.2),
                d: Point2D::new(-2.0, 1.3),
            },
            links: LinkLengths::default(),
            assembly: AssemblyModes::default(),
            total_mass: 2.5,
            gravity: 9.81,
            leg_count: 8,
            phase_offset: 45f64.to_radians(),
            contact_tolerance: 0.0,
            solver: SolverSettings::default(),
        }
    }

    pub fn builder() -> MechanismConfigBuilder {
        MechanismConfigBuilder::new()
    }

    /// Mass lumped onto each link for the kinetic model (kg).
    pub fn mass_per_link(&self) -> f64 {
        self.total_mass / self.leg_count.saturating_mul(LINKS_PER_LEG) as f64
    }

    /// Crank phase of leg `leg` relative to leg 0.
    pub fn leg_phase(&self, leg: usize) -> f64 {
        leg as f64 * self.phase_offset
    }

    /// Uniformly scales the geometry (anchors, link lengths, contact height).
    pub fn scaled(&self, factor: f64) -> Result<Self, KinematicsError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(KinematicsError::InvalidParameters(format!(
                "scale factor must be finite and > 0, got {}",
                factor
            )));
        }
        let mut scaled = self.clone();
        scaled.anchors.o = Point2D::from(self.anchors.o.coords * factor);
        scaled.anchors.c = Point2D::from(self.anchors.c.coords * factor);
        scaled.anchors.d = Point2D::from(self.anchors.d.coords * factor);
        for (link, length) in self.links.iter() {
            scaled.links.set(link, length * factor);
        }
        scaled.contact_tolerance = self.contact_tolerance * factor;
        scaled.validate()?;
        Ok(scaled)
    }

    /// Returns a copy with one link length changed, validated.
    pub fn with_link(&self, link: Link, length: f64) -> Result<Self, KinematicsError> {
        let mut updated = self.clone();
        updated.links.set(link, length);
        updated.validate()?;
        Ok(updated)
    }

    /// Rejects configurations whose loops can never close.
    pub fn validate(&self) -> Result<(), KinematicsError> {
        let infeasible = |msg: String| Err(KinematicsError::InfeasibleConfiguration(msg));

        for (link, length) in self.links.iter() {
            if !length.is_finite() || length <= 0.0 {
                return infeasible(format!("link {:?} must be finite and > 0, got {}", link, length));
            }
        }
        for (name, p) in [("O", self.anchors.o), ("C", self.anchors.c), ("D", self.anchors.d)] {
            if !p.x.is_finite() || !p.y.is_finite() {
                return infeasible(format!("anchor {} is not finite", name));
            }
        }
        if !self.total_mass.is_finite() || self.total_mass <= 0.0 {
            return infeasible(format!("total mass must be > 0, got {}", self.total_mass));
        }
        if !self.gravity.is_finite() || self.gravity <= 0.0 {
            return infeasible(format!("gravity must be > 0, got {}", self.gravity));
        }
        if self.leg_count == 0 || self.leg_count > MAX_LEGS {
            return infeasible(format!("leg count must be in 1..={}, got {}", MAX_LEGS, self.leg_count));
        }
        if !self.phase_offset.is_finite() || !self.contact_tolerance.is_finite() {
            return infeasible("phase offset and contact tolerance must be finite".to_string());
        }
        let solver = &self.solver;
        if !(solver.tolerance > 0.0) || solver.max_iterations == 0 || !(solver.singular_tolerance >= 0.0) {
            return infeasible(format!("invalid solver settings: {:?}", solver));
        }

        let l = &self.links;

        // Rigid triangle E-F-G.
        if l.eg >= l.ef + l.fg || l.ef >= l.fg + l.eg || l.fg >= l.ef + l.eg {
            return infeasible(format!(
                "triangle E-F-G cannot close: EF={} FG={} EG={}",
                l.ef, l.fg, l.eg
            ));
        }

        // Loop O-A-B-C: |A-C| sweeps [|r - OA|, r + OA] over one revolution.
        let r = (self.anchors.c - self.anchors.o).norm();
        let (reach_min, reach_max) = ((r - l.oa).abs(), r + l.oa);
        let (close_min, close_max) = ((l.ab - l.bc).abs(), l.ab + l.bc);
        if reach_min > close_max || reach_max < close_min {
            return infeasible(format!(
                "loop O-A-B-C never closes: |A-C| in [{:.4}, {:.4}], AB/BC span [{:.4}, {:.4}]",
                reach_min, reach_max, close_min, close_max
            ));
        }

        // Loop D-E-F: F is never further from D than |C-D| + BC + BF.
        let df_max = (self.anchors.c - self.anchors.d).norm() + l.bc + l.bf;
        if (l.de - l.ef).abs() > df_max {
            return infeasible(format!(
                "loop D-E-F never closes: |DE-EF|={:.4} exceeds reachable |F-D|={:.4}",
                (l.de - l.ef).abs(),
                df_max
            ));
        }

        Ok(())
    }
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self::reference()
    }
}

/// Build a validated [`MechanismConfig`], starting from the reference walker.
#[derive(Debug, Clone)]
pub struct MechanismConfigBuilder {
    config: MechanismConfig,
}

impl MechanismConfigBuilder {
    pub fn new() -> Self {
        Self { config: MechanismConfig::reference() }
    }
    pub fn anchors(mut self, o: Point2D, c: Point2D, d: Point2D) -> Self {
        self.config.anchors = Anchors { o, c, d };
        self
    }
    pub fn links(mut self, links: LinkLengths) -> Self {
        self.config.links = links;
        self
    }
    pub fn link(mut self, link: Link, length: f64) -> Self {
        self.config.links.set(link, length);
        self
    }
    pub fn assembly(mut self, assembly: AssemblyModes) -> Self {
        self.config.assembly = assembly;
        self
    }
    pub fn total_mass(mut self, total_mass: f64) -> Self {
        self.config.total_mass = total_mass;
        self
    }
    pub fn gravity(mut self, gravity: f64) -> Self {
        self.config.gravity = gravity;
        self
    }
    /// Sets the leg count and spreads the legs evenly over one revolution.
    pub fn legs(mut self, leg_count: usize) -> Self {
        self.config.leg_count = leg_count;
        if leg_count > 0 {
            self.config.phase_offset = std::f64::consts::TAU / leg_count as f64;
        }
        self
    }
    pub fn phase_offset(mut self, phase_offset: f64) -> Self {
        self.config.phase_offset = phase_offset;
        self
    }
    pub fn contact_tolerance(mut self, contact_tolerance: f64) -> Self {
        self.config.contact_tolerance = contact_tolerance;
        self
    }
    pub fn solver(mut self, solver: SolverSettings) -> Self {
        self.config.solver = solver;
        self
    }
    pub fn build(self) -> Result<MechanismConfig, KinematicsError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for MechanismConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_is_valid() {
        let config = MechanismConfig::reference();
        assert!(config.validate().is_ok());
        assert_eq!(config.leg_count, 8);
        assert!((config.phase_offset - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_open_triangle_rejected() {
        let result = MechanismConfig::builder().link(Link::Eg, 9.5).build();
        assert!(matches!(result, Err(KinematicsError::InfeasibleConfiguration(_))));
    }

    #[test]
    fn test_non_positive_length_rejected() {
        let result = MechanismConfig::builder().link(Link::Bc, 0.0).build();
        assert!(matches!(result, Err(KinematicsError::InfeasibleConfiguration(_))));
        let result = MechanismConfig::builder().link(Link::Oa, f64::NAN).build();
        assert!(matches!(result, Err(KinematicsError::InfeasibleConfiguration(_))));
    }

    #[test]
    fn test_four_bar_that_never_closes_rejected() {
        // AB + BC = 2.0 while |A-C| never drops below 4.46 - 1.0
        let result = MechanismConfig::builder()
            .link(Link::Ab, 1.0)
            .link(Link::Bc, 1.0)
            .build();
        assert!(matches!(result, Err(KinematicsError::InfeasibleConfiguration(_))));
    }

    #[test]
    fn test_rocker_loop_that_never_closes_rejected() {
        let result = MechanismConfig::builder()
            .link(Link::De, 40.0)
            .link(Link::Ef, 3.7)
            .build();
        assert!(matches!(result, Err(KinematicsError::InfeasibleConfiguration(_))));
    }

    #[test]
    fn test_body_parameters_validated() {
        assert!(MechanismConfig::builder().total_mass(0.0).build().is_err());
        assert!(MechanismConfig::builder().gravity(-9.81).build().is_err());
        assert!(MechanismConfig::builder().legs(0).build().is_err());
        assert!(MechanismConfig::builder().legs(MAX_LEGS).build().is_ok());
        assert!(matches!(
            MechanismConfig::builder().legs(usize::MAX).build(),
            Err(KinematicsError::InfeasibleConfiguration(_))
        ));
    }

    #[test]
    fn test_legs_spread_evenly() {
        let config = MechanismConfig::builder().legs(6).build().unwrap();
        assert!((config.phase_offset - std::f64::consts::TAU / 6.0).abs() < 1e-12);
        assert!((config.leg_phase(3) - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_mass_per_link() {
        let config = MechanismConfig::builder().total_mass(6.4).build().unwrap();
        assert!((config.mass_per_link() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_config() {
        let config = MechanismConfig::reference();
        let scaled = config.scaled(5.0).unwrap();
        assert!((scaled.links.eg - 45.5).abs() < 1e-12);
        assert!((scaled.anchors.c.x + 21.5).abs() < 1e-12);
        assert_eq!(scaled.total_mass, config.total_mass);
        assert!(config.scaled(0.0).is_err());
    }

    #[test]
    fn test_with_link_validates() {
        let config = MechanismConfig::reference();
        let longer = config.with_link(Link::Fg, 6.0).unwrap();
        assert_eq!(longer.links.fg, 6.0);
        assert_eq!(config.links.fg, 5.65);
        assert!(config.with_link(Link::Eg, 20.0).is_err());
    }
}
