// src/kinematics/position.rs - nonlinear position solve of the floating joints
//
// Unknowns are packed as [Bx, By, Ex, Ey, Fx, Fy, Gx, Gy]. The system keeps
// the redundant |E-F| closure next to the D-E-F one and adds the rigid
// extension of AB through F, so it is solved in the least-squares sense.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use super::KinematicsError;
use crate::config::MechanismConfig;
use crate::geometry::{Joint, Point2D, Vector2D, circle_intersection, cross, unit};

const UNKNOWNS: usize = 8;
const EQUATIONS: usize = 9;
/// Singular values below this are dropped from the Gauss-Newton step.
const SVD_EPSILON: f64 = 1e-12;

const SLOT_B: usize = 0;
const SLOT_E: usize = 1;
const SLOT_F: usize = 2;
const SLOT_G: usize = 3;

/// Positions of all eight points of one leg at crank angle `theta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointState {
    pub theta: f64,
    pub o: Point2D,
    pub a: Point2D,
    pub b: Point2D,
    pub c: Point2D,
    pub d: Point2D,
    pub e: Point2D,
    pub f: Point2D,
    pub g: Point2D,
}

impl JointState {
    pub fn get(&self, joint: Joint) -> Point2D {
        match joint {
            Joint::O => self.o,
            Joint::A => self.a,
            Joint::B => self.b,
            Joint::C => self.c,
            Joint::D => self.d,
            Joint::E => self.e,
            Joint::F => self.f,
            Joint::G => self.g,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, Point2D)> + '_ {
        Joint::ALL.into_iter().map(move |joint| (joint, self.get(joint)))
    }

    /// Largest violation (cm) of any link length, including the crank.
    pub fn max_residual(&self, config: &MechanismConfig) -> f64 {
        let l = &config.links;
        [
            ((self.a - self.o).norm() - l.oa).abs(),
            ((self.b - self.a).norm() - l.ab).abs(),
            ((self.b - self.c).norm() - l.bc).abs(),
            ((self.f - self.b).norm() - l.bf).abs(),
            ((self.f - self.a).norm() - (l.ab + l.bf)).abs(),
            ((self.e - self.d).norm() - l.de).abs(),
            ((self.f - self.e).norm() - l.ef).abs(),
            ((self.g - self.f).norm() - l.fg).abs(),
            ((self.g - self.e).norm() - l.eg).abs(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    fn unknowns(&self) -> DVector<f64> {
        pack([self.b, self.e, self.f, self.g])
    }
}

/// Crank pin A in closed form.
pub fn crank_point(theta: f64, config: &MechanismConfig) -> Point2D {
    config.anchors.o + unit(theta) * config.links.oa
}

/// Resolves B, E, F and G for crank angle `theta`.
///
/// `previous` is the converged state of a nearby crank angle. Continuing from
/// it keeps the solve on the same assembly branch; without it (or when it no
/// longer converges) a guess is synthesised from `config.assembly`.
pub fn solve_positions(
    theta: f64,
    config: &MechanismConfig,
    previous: Option<&JointState>,
) -> Result<JointState, KinematicsError> {
    config.validate()?;
    let a = crank_point(theta, config);

    if let Some(previous) = previous {
        match gauss_newton(theta, &a, previous.unknowns(), config) {
            Ok(x) => return Ok(unpack(theta, a, &x, config)),
            Err(err) => {
                tracing::debug!("Warm start failed at θ={:.4}: {}; retrying from assembly guess", theta, err);
            }
        }
    }

    let x = gauss_newton(theta, &a, initial_guess(&a, config), config)?;
    Ok(unpack(theta, a, &x, config))
}

fn pack(points: [Point2D; 4]) -> DVector<f64> {
    DVector::from_iterator(UNKNOWNS, points.iter().flat_map(|p| [p.x, p.y]))
}

fn slot(x: &DVector<f64>, slot: usize) -> Point2D {
    Point2D::new(x[2 * slot], x[2 * slot + 1])
}

fn unpack(theta: f64, a: Point2D, x: &DVector<f64>, config: &MechanismConfig) -> JointState {
    JointState {
        theta,
        o: config.anchors.o,
        a,
        b: slot(x, SLOT_B),
        c: config.anchors.c,
        d: config.anchors.d,
        e: slot(x, SLOT_E),
        f: slot(x, SLOT_F),
        g: slot(x, SLOT_G),
    }
}

fn initial_guess(a: &Point2D, config: &MechanismConfig) -> DVector<f64> {
    let l = &config.links;
    let anchors = &config.anchors;
    let modes = &config.assembly;

    let assembled = circle_intersection(a, l.ab, &anchors.c, l.bc, modes.b).and_then(|b| {
        let f = b + (b - *a) / l.ab * l.bf;
        let e = circle_intersection(&anchors.d, l.de, &f, l.ef, modes.e)?;
        let g = circle_intersection(&f, l.fg, &e, l.eg, modes.g)?;
        Some([b, e, f, g])
    });

    let points = assembled.unwrap_or_else(|| {
        tracing::trace!("No closed-form assembly at A=({:.3}, {:.3}), using offset guess", a.x, a.y);
        let x_hat = Vector2D::x();
        let b = *a + x_hat * l.ab;
        let f = b + x_hat * l.bf;
        let g = f + x_hat * l.fg;
        let e = anchors.d + x_hat * l.de;
        [b, e, f, g]
    });
    pack(points)
}

#[derive(Debug, Clone, Copy)]
enum End {
    Fixed(Point2D),
    Free(usize),
}

impl End {
    fn at(&self, x: &DVector<f64>) -> Point2D {
        match *self {
            End::Fixed(p) => p,
            End::Free(s) => slot(x, s),
        }
    }
}

/// Distance constraints |p - q| = length, in residual order.
fn distance_constraints(a: &Point2D, config: &MechanismConfig) -> [(End, End, f64); 8] {
    let l = &config.links;
    let anchors = &config.anchors;
    [
        (End::Free(SLOT_B), End::Fixed(*a), l.ab),
        (End::Free(SLOT_B), End::Fixed(anchors.c), l.bc),
        (End::Free(SLOT_F), End::Free(SLOT_B), l.bf),
        (End::Free(SLOT_E), End::Fixed(anchors.d), l.de),
        (End::Free(SLOT_F), End::Free(SLOT_E), l.ef),
        (End::Free(SLOT_G), End::Free(SLOT_F), l.fg),
        (End::Free(SLOT_G), End::Free(SLOT_E), l.eg),
        // triangle closure, kept alongside the D-E-F one
        (End::Free(SLOT_E), End::Free(SLOT_F), l.ef),
    ]
}

fn residuals(a: &Point2D, x: &DVector<f64>, config: &MechanismConfig) -> DVector<f64> {
    let mut r = DVector::zeros(EQUATIONS);
    for (row, (p, q, length)) in distance_constraints(a, config).iter().enumerate() {
        r[row] = (p.at(x) - q.at(x)).norm() - length;
    }
    let l = &config.links;
    let b = slot(x, SLOT_B);
    let f = slot(x, SLOT_F);
    r[EQUATIONS - 1] = cross(&(b - *a), &(f - b)) / (l.ab * l.bf);
    r
}

fn jacobian(a: &Point2D, x: &DVector<f64>, config: &MechanismConfig) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(EQUATIONS, UNKNOWNS);
    for (row, (p, q, _)) in distance_constraints(a, config).iter().enumerate() {
        let diff = p.at(x) - q.at(x);
        let n = diff.norm();
        if n <= f64::EPSILON {
            continue;
        }
        let grad = diff / n;
        if let End::Free(s) = *p {
            j[(row, 2 * s)] += grad.x;
            j[(row, 2 * s + 1)] += grad.y;
        }
        if let End::Free(s) = *q {
            j[(row, 2 * s)] -= grad.x;
            j[(row, 2 * s + 1)] -= grad.y;
        }
    }

    // d/dB and d/dF of (B - A) x (F - B)
    let l = &config.links;
    let scale = l.ab * l.bf;
    let u = slot(x, SLOT_B) - *a;
    let v = slot(x, SLOT_F) - slot(x, SLOT_B);
    let row = EQUATIONS - 1;
    j[(row, 2 * SLOT_B)] = (v.y + u.y) / scale;
    j[(row, 2 * SLOT_B + 1)] = -(v.x + u.x) / scale;
    j[(row, 2 * SLOT_F)] = -u.y / scale;
    j[(row, 2 * SLOT_F + 1)] = u.x / scale;
    j
}

fn gauss_newton(
    theta: f64,
    a: &Point2D,
    mut x: DVector<f64>,
    config: &MechanismConfig,
) -> Result<DVector<f64>, KinematicsError> {
    let settings = &config.solver;
    let mut r = residuals(a, &x, config);
    let mut norm = r.norm();

    for iteration in 0..settings.max_iterations {
        if !norm.is_finite() {
            break;
        }
        if norm < settings.tolerance {
            tracing::trace!("Converged at θ={:.4} after {} iterations (residual {:.3e})", theta, iteration, norm);
            return Ok(x);
        }
        let step = jacobian(a, &x, config)
            .svd(true, true)
            .solve(&(-&r), SVD_EPSILON)
            .map_err(|_| KinematicsError::ConvergenceFailure {
                theta,
                last_residual: norm,
                iterations: iteration,
            })?;
        x += step;
        r = residuals(a, &x, config);
        norm = r.norm();
    }

    if norm < settings.tolerance {
        return Ok(x);
    }
    Err(KinematicsError::ConvergenceFailure {
        theta,
        last_residual: if norm.is_finite() { norm } else { f64::INFINITY },
        iterations: settings.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Link, MechanismConfig};
    use crate::geometry::Branch;
    use std::f64::consts::{PI, TAU};

    /// Crank shortened so that O-A-B-C closes over the whole revolution.
    fn full_rotation_config() -> MechanismConfig {
        MechanismConfig::builder().link(Link::Oa, 0.7).build().unwrap()
    }

    #[test]
    fn test_anchors_and_crank_pin() {
        let config = MechanismConfig::reference();
        let joints = solve_positions(PI, &config, None).unwrap();
        assert_eq!(joints.o, config.anchors.o);
        assert_eq!(joints.c, config.anchors.c);
        assert_eq!(joints.d, config.anchors.d);
        assert!((joints.a.x + 1.0).abs() < 1e-12);
        assert!(joints.a.y.abs() < 1e-12);

        // anchors stay put, every other point follows the crank
        let moved = solve_positions(4.0, &config, None).unwrap();
        for (joint, p) in joints.iter() {
            assert_eq!(p == moved.get(joint), joint.is_anchor(), "{}", joint);
        }
    }

    #[test]
    fn test_constraints_hold_over_revolution() {
        let config = full_rotation_config();
        let mut previous = None;
        for k in 0..72 {
            let theta = TAU * k as f64 / 72.0;
            let joints = solve_positions(theta, &config, previous.as_ref()).unwrap();
            assert!(
                joints.max_residual(&config) < 1e-6,
                "residual {} at θ={}",
                joints.max_residual(&config),
                theta
            );
            previous = Some(joints);
        }
    }

    #[test]
    fn test_f_on_extension_of_ab() {
        let config = MechanismConfig::reference();
        let joints = solve_positions(2.0, &config, None).unwrap();
        let along = (joints.b - joints.a).normalize();
        let expected = joints.b + along * config.links.bf;
        assert!((joints.f - expected).norm() < 1e-6);
    }

    #[test]
    fn test_cold_solve_is_deterministic() {
        let config = MechanismConfig::reference();
        let first = solve_positions(3.0, &config, None).unwrap();
        let second = solve_positions(3.0, &config, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_periodic_in_crank_angle() {
        let config = full_rotation_config();
        let start = solve_positions(0.0, &config, None).unwrap();
        let end = solve_positions(TAU, &config, None).unwrap();
        for (joint, p) in start.iter() {
            assert!((p - end.get(joint)).norm() < 1e-6, "{} differs", joint);
        }
    }

    #[test]
    fn test_warm_start_follows_branch() {
        let config = MechanismConfig::reference();
        let cold = solve_positions(1.6, &config, None).unwrap();
        let warm = solve_positions(1.6, &config, Some(&solve_positions(1.58, &config, None).unwrap())).unwrap();
        for (joint, p) in cold.iter() {
            assert!((p - warm.get(joint)).norm() < 1e-6, "{} jumped branch", joint);
        }
    }

    #[test]
    fn test_perturbed_seed_converges() {
        let config = MechanismConfig::reference();
        let exact = solve_positions(PI, &config, None).unwrap();
        let mut seed = exact;
        seed.b += Vector2D::new(0.3, 0.3);
        seed.e += Vector2D::new(0.3, 0.3);
        seed.f += Vector2D::new(0.3, 0.3);
        seed.g += Vector2D::new(0.3, 0.3);
        let solved = solve_positions(PI, &config, Some(&seed)).unwrap();
        assert!((solved.g - exact.g).norm() < 1e-6);
    }

    #[test]
    fn test_converged_seed_is_returned_unchanged() {
        let config = MechanismConfig::reference();
        let exact = solve_positions(PI, &config, None).unwrap();
        let x = gauss_newton(PI, &exact.a, exact.unknowns(), &config).unwrap();
        assert_eq!(x, exact.unknowns());
        assert!(residuals(&exact.a, &x, &config).norm() < config.solver.tolerance);
    }

    #[test]
    fn test_assembly_mode_selects_mirror() {
        let config = MechanismConfig::reference();
        let mut flipped = config.clone();
        flipped.assembly.g = Branch::Left;
        let right = solve_positions(PI, &config, None).unwrap();
        let left = solve_positions(PI, &flipped, None).unwrap();
        assert!((right.b - left.b).norm() < 1e-9);
        assert!((right.g - left.g).norm() > 1.0);
        assert!(left.max_residual(&flipped) < 1e-6);
    }

    #[test]
    fn test_unreachable_angle_reports_residual() {
        let config = MechanismConfig::reference();
        match solve_positions(0.0, &config, None) {
            Err(KinematicsError::ConvergenceFailure { theta, last_residual, .. }) => {
                assert_eq!(theta, 0.0);
                assert!(!(last_residual < config.solver.tolerance));
            }
            other => panic!("expected convergence failure, got {:?}", other),
        }
    }

    #[test]
    fn test_infeasible_config_rejected_before_solving() {
        let mut config = MechanismConfig::reference();
        config.links.eg = config.links.ef + config.links.fg + 0.5;
        assert!(matches!(
            solve_positions(PI, &config, None),
            Err(KinematicsError::InfeasibleConfiguration(_))
        ));
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let config = MechanismConfig::reference();
        let a = crank_point(PI, &config);
        let x = solve_positions(PI, &config, None).unwrap().unknowns() + DVector::from_element(UNKNOWNS, 0.05);
        let analytic = jacobian(&a, &x, &config);
        let h = 1e-7;
        for col in 0..UNKNOWNS {
            let mut xp = x.clone();
            xp[col] += h;
            let mut xm = x.clone();
            xm[col] -= h;
            let fd = (residuals(&a, &xp, &config) - residuals(&a, &xm, &config)) / (2.0 * h);
            for row in 0..EQUATIONS {
                assert!(
                    (fd[row] - analytic[(row, col)]).abs() < 1e-6,
                    "row {} col {}: fd {} analytic {}",
                    row,
                    col,
                    fd[row],
                    analytic[(row, col)]
                );
            }
        }
    }
}
