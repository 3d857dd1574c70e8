//! Multi-loop kinematic solver.
//!
//! Three stages, each consuming the immutable output of the previous one:
//!
//! 1. [`solve_positions`]: Gauss-Newton on the loop length constraints
//! 2. [`solve_velocities`]: loop closure differentiated once, three 2×2 solves
//! 3. [`solve_accelerations`]: loop closure differentiated twice
//!
//! [`frame_at`] chains them for a single crank angle.

pub mod acceleration;
pub mod position;
pub mod velocity;

use nalgebra::Matrix2;
use serde::Serialize;
use thiserror::Error;

use crate::config::MechanismConfig;
use crate::geometry::{Point2D, Vector2D};

pub use acceleration::{AccelerationState, solve_accelerations};
pub use position::{JointState, solve_positions};
pub use velocity::{LinkAngles, VelocityState, solve_velocities};

/// The vector loops of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoopId {
    /// O-A-B-C, driven by the crank.
    CrankRocker,
    /// D-E-F, driven by F.
    Rocker,
    /// Rigid ternary link E-F-G.
    Triangle,
}

impl std::fmt::Display for LoopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopId::CrankRocker => write!(f, "O-A-B-C"),
            LoopId::Rocker => write!(f, "D-E-F"),
            LoopId::Triangle => write!(f, "E-F-G"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("Infeasible configuration: {0}")]
    InfeasibleConfiguration(String),
    #[error("Position solve did not converge at θ={theta:.6} rad (residual {last_residual:.3e} after {iterations} iterations)")]
    ConvergenceFailure {
        theta: f64,
        last_residual: f64,
        iterations: usize,
    },
    #[error("Singular Jacobian in loop {loop_id} at θ={theta:.6} rad")]
    SingularJacobian { theta: f64, loop_id: LoopId },
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl KinematicsError {
    /// Per-frame failures that a sweep records as a gap and steps over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KinematicsError::ConvergenceFailure { .. } | KinematicsError::SingularJacobian { .. }
        )
    }
}

/// Full kinematic state of one leg at one crank angle. Only built from
/// converged solves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KinematicFrame {
    pub theta: f64,
    pub joints: JointState,
    pub velocity: VelocityState,
    pub acceleration: AccelerationState,
}

impl KinematicFrame {
    pub fn foot(&self) -> Point2D {
        self.joints.g
    }

    pub fn v_g(&self) -> Vector2D {
        self.velocity.v_g
    }

    pub fn a_g(&self) -> Vector2D {
        self.acceleration.a_g
    }

    /// True when the foot is at or below `tolerance` (cm).
    pub fn in_contact(&self, tolerance: f64) -> bool {
        self.joints.g.y <= tolerance
    }
}

/// Single-frame query without warm start.
pub fn frame_at(
    theta: f64,
    omega_crank: f64,
    alpha_crank: f64,
    config: &MechanismConfig,
) -> Result<KinematicFrame, KinematicsError> {
    frame_from(theta, omega_crank, alpha_crank, config, None)
}

/// Single-frame query seeded from a nearby converged state, for callers that
/// step the crank a little at a time (animation loops, sweeps).
pub fn frame_from(
    theta: f64,
    omega_crank: f64,
    alpha_crank: f64,
    config: &MechanismConfig,
    previous: Option<&JointState>,
) -> Result<KinematicFrame, KinematicsError> {
    let joints = solve_positions(theta, config, previous)?;
    let velocity = solve_velocities(theta, omega_crank, &joints, config)?;
    let acceleration = solve_accelerations(theta, omega_crank, alpha_crank, &joints, &velocity, config)?;
    Ok(KinematicFrame {
        theta,
        joints,
        velocity,
        acceleration,
    })
}

/// Solves `c1 * x + c2 * y = rhs` for one loop.
pub(crate) fn solve_loop(
    c1: Vector2D,
    c2: Vector2D,
    rhs: Vector2D,
    theta: f64,
    loop_id: LoopId,
    config: &MechanismConfig,
) -> Result<(f64, f64), KinematicsError> {
    let jacobian = Matrix2::from_columns(&[c1, c2]);
    let scale = c1.norm() * c2.norm();
    let det = jacobian.determinant();
    if scale == 0.0 || (det / scale).abs() < config.solver.singular_tolerance {
        tracing::debug!("Loop {} singular at θ={:.4}: det={:.3e}", loop_id, theta, det);
        return Err(KinematicsError::SingularJacobian { theta, loop_id });
    }
    let inverse = jacobian
        .try_inverse()
        .ok_or(KinematicsError::SingularJacobian { theta, loop_id })?;
    let x = inverse * rhs;
    Ok((x.x, x.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_loop_identity() {
        let config = MechanismConfig::reference();
        let (x, y) = solve_loop(
            Vector2D::new(2.0, 0.0),
            Vector2D::new(0.0, 4.0),
            Vector2D::new(1.0, 1.0),
            0.0,
            LoopId::CrankRocker,
            &config,
        )
        .unwrap();
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_solve_loop_parallel_columns() {
        let config = MechanismConfig::reference();
        let result = solve_loop(
            Vector2D::new(1.0, 1.0),
            Vector2D::new(-2.0, -2.0),
            Vector2D::new(1.0, 0.0),
            1.25,
            LoopId::Triangle,
            &config,
        );
        assert_eq!(
            result,
            Err(KinematicsError::SingularJacobian {
                theta: 1.25,
                loop_id: LoopId::Triangle
            })
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(KinematicsError::SingularJacobian { theta: 0.0, loop_id: LoopId::Rocker }.is_recoverable());
        assert!(!KinematicsError::InfeasibleConfiguration("x".into()).is_recoverable());
    }

    #[test]
    fn test_frame_at_reachable_angle() {
        let config = MechanismConfig::reference();
        let frame = frame_at(std::f64::consts::PI, 1.0, 0.0, &config).unwrap();
        assert_eq!(frame.foot(), frame.joints.g);
        assert!(frame.in_contact(config.contact_tolerance));
        assert!(frame.v_g().norm() > 0.0);
    }

    #[test]
    fn test_frame_at_dead_zone_fails() {
        // O-A-B-C cannot assemble with the crank at 15°
        let config = MechanismConfig::reference();
        let result = frame_at(15f64.to_radians(), 1.0, 0.0, &config);
        assert!(matches!(result, Err(KinematicsError::ConvergenceFailure { .. })));
    }
}
