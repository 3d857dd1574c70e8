// src/kinematics/velocity.rs - loop closure differentiated once
use serde::Serialize;

use super::{JointState, KinematicsError, LoopId, solve_loop};
use crate::config::MechanismConfig;
use crate::geometry::{Vector2D, angle_of, tangent};

/// Link orientations of one solved configuration (rad). Computed once here
/// and handed on to the acceleration stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkAngles {
    pub crank: f64,
    pub ab: f64,
    pub bc: f64,
    pub de: f64,
    pub ef: f64,
    pub fg: f64,
    pub eg: f64,
}

impl LinkAngles {
    pub fn from_joints(theta: f64, joints: &JointState) -> Self {
        Self {
            crank: theta,
            ab: angle_of(&joints.a, &joints.b),
            bc: angle_of(&joints.b, &joints.c),
            de: angle_of(&joints.d, &joints.e),
            ef: angle_of(&joints.e, &joints.f),
            fg: angle_of(&joints.f, &joints.g),
            eg: angle_of(&joints.e, &joints.g),
        }
    }
}

/// Angular velocities (rad/s) and point velocities (cm/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityState {
    pub omega_crank: f64,
    pub angles: LinkAngles,
    pub omega_ab: f64,
    pub omega_bc: f64,
    pub omega_de: f64,
    pub omega_ef: f64,
    pub omega_fg: f64,
    pub omega_eg: f64,
    pub v_a: Vector2D,
    pub v_e: Vector2D,
    pub v_f: Vector2D,
    pub v_g: Vector2D,
}

/// Propagates the crank speed through the three loops.
pub fn solve_velocities(
    theta: f64,
    omega_crank: f64,
    joints: &JointState,
    config: &MechanismConfig,
) -> Result<VelocityState, KinematicsError> {
    let l = &config.links;
    let angles = LinkAngles::from_joints(theta, joints);

    let v_a = tangent(theta) * (omega_crank * l.oa);

    // v_A + ω_AB L_AB t(AB) + ω_BC L_BC t(BC) = 0
    let (omega_ab, omega_bc) = solve_loop(
        tangent(angles.ab) * l.ab,
        tangent(angles.bc) * l.bc,
        -v_a,
        theta,
        LoopId::CrankRocker,
        config,
    )?;

    // F rides on the extension of AB
    let v_f = v_a + tangent(angles.ab) * (omega_ab * (l.ab + l.bf));

    // ω_DE L_DE t(DE) + ω_EF L_EF t(EF) = v_F
    let (omega_de, omega_ef) = solve_loop(
        tangent(angles.de) * l.de,
        tangent(angles.ef) * l.ef,
        v_f,
        theta,
        LoopId::Rocker,
        config,
    )?;
    let v_e = tangent(angles.de) * (omega_de * l.de);

    // v_F + ω_FG L_FG t(FG) = v_E + ω_EG L_EG t(EG)
    let (omega_fg, omega_eg) = solve_loop(
        tangent(angles.fg) * l.fg,
        tangent(angles.eg) * -l.eg,
        v_e - v_f,
        theta,
        LoopId::Triangle,
        config,
    )?;
    let v_g = v_f + tangent(angles.fg) * (omega_fg * l.fg);

    Ok(VelocityState {
        omega_crank,
        angles,
        omega_ab,
        omega_bc,
        omega_de,
        omega_ef,
        omega_fg,
        omega_eg,
        v_a,
        v_e,
        v_f,
        v_g,
    })
}
