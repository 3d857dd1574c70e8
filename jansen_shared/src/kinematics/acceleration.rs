// src/kinematics/acceleration.rs - loop closure differentiated twice
use serde::Serialize;

use super::{JointState, KinematicsError, LoopId, VelocityState, solve_loop};
use crate::config::MechanismConfig;
use crate::geometry::{Vector2D, tangent, unit};

/// Angular accelerations (rad/s²) and point accelerations (cm/s²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerationState {
    pub alpha_crank: f64,
    pub alpha_ab: f64,
    pub alpha_bc: f64,
    pub alpha_de: f64,
    pub alpha_ef: f64,
    pub alpha_fg: f64,
    pub alpha_eg: f64,
    pub a_a: Vector2D,
    pub a_e: Vector2D,
    pub a_f: Vector2D,
    pub a_g: Vector2D,
}

/// Centripetal term ω² L ê(angle) of a link turning at `omega`.
fn centripetal(omega: f64, length: f64, angle: f64) -> Vector2D {
    unit(angle) * (omega * omega * length)
}

/// Propagates the crank acceleration through the three loops, reusing the
/// link orientations already carried by `velocities`.
pub fn solve_accelerations(
    theta: f64,
    omega_crank: f64,
    alpha_crank: f64,
    _joints: &JointState,
    velocities: &VelocityState,
    config: &MechanismConfig,
) -> Result<AccelerationState, KinematicsError> {
    let l = &config.links;
    let angles = &velocities.angles;
    let v = velocities;

    let a_a = tangent(angles.crank) * (alpha_crank * l.oa) - centripetal(omega_crank, l.oa, angles.crank);

    let (alpha_ab, alpha_bc) = solve_loop(
        tangent(angles.ab) * l.ab,
        tangent(angles.bc) * l.bc,
        -a_a + centripetal(v.omega_ab, l.ab, angles.ab) + centripetal(v.omega_bc, l.bc, angles.bc),
        theta,
        LoopId::CrankRocker,
        config,
    )?;

    let af = l.ab + l.bf;
    let a_f = a_a + tangent(angles.ab) * (alpha_ab * af) - centripetal(v.omega_ab, af, angles.ab);

    let (alpha_de, alpha_ef) = solve_loop(
        tangent(angles.de) * l.de,
        tangent(angles.ef) * l.ef,
        a_f + centripetal(v.omega_de, l.de, angles.de) + centripetal(v.omega_ef, l.ef, angles.ef),
        theta,
        LoopId::Rocker,
        config,
    )?;
    let a_e = tangent(angles.de) * (alpha_de * l.de) - centripetal(v.omega_de, l.de, angles.de);

    let (alpha_fg, alpha_eg) = solve_loop(
        tangent(angles.fg) * l.fg,
        tangent(angles.eg) * -l.eg,
        a_e - a_f + centripetal(v.omega_fg, l.fg, angles.fg) - centripetal(v.omega_eg, l.eg, angles.eg),
        theta,
        LoopId::Triangle,
        config,
    )?;
    let a_g = a_f + tangent(angles.fg) * (alpha_fg * l.fg) - centripetal(v.omega_fg, l.fg, angles.fg);

    Ok(AccelerationState {
        alpha_crank,
        alpha_ab,
        alpha_bc,
        alpha_de,
        alpha_ef,
        alpha_fg,
        alpha_eg,
        a_a,
        a_e,
        a_f,
        a_g,
    })
}
