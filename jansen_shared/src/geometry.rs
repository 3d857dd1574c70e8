// src/geometry.rs - planar helpers shared by the solver stages
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A joint position in centimetres.
pub type Point2D = Point2<f64>;

/// Linear velocity or acceleration of a joint (cm/s, cm/s²).
pub type Vector2D = Vector2<f64>;

/// Labels of the eight tracked points of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Joint {
    O,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Joint {
    pub const ALL: [Joint; 8] = [
        Joint::O,
        Joint::A,
        Joint::B,
        Joint::C,
        Joint::D,
        Joint::E,
        Joint::F,
        Joint::G,
    ];

    /// Anchors never move, whatever the crank angle.
    pub fn is_anchor(self) -> bool {
        matches!(self, Joint::O | Joint::C | Joint::D)
    }
}

impl std::fmt::Display for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Side of the directed line between two circle centres on which an
/// intersection point lies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Left,
    #[default]
    Right,
}

/// Unit vector along `angle`.
pub fn unit(angle: f64) -> Vector2D {
    Vector2D::new(angle.cos(), angle.sin())
}

/// Unit tangent (-sin, cos): derivative of `unit` with respect to `angle`.
pub fn tangent(angle: f64) -> Vector2D {
    Vector2D::new(-angle.sin(), angle.cos())
}

/// Orientation of the segment `from -> to`.
pub fn angle_of(from: &Point2D, to: &Point2D) -> f64 {
    let d = to - from;
    d.y.atan2(d.x)
}

/// Wraps an angle into [-π, π).
pub fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    (angle + PI).rem_euclid(TAU) - PI
}

/// 2D cross product (z component).
pub fn cross(u: &Vector2D, v: &Vector2D) -> f64 {
    u.x * v.y - u.y * v.x
}

/// Intersection of the circle (`p`, `r1`) with the circle (`q`, `r2`) on the
/// requested side of `p -> q`. `None` when the circles do not meet.
pub fn circle_intersection(p: &Point2D, r1: f64, q: &Point2D, r2: f64, branch: Branch) -> Option<Point2D> {
    let pq = q - p;
    let d = pq.norm();
    if d <= f64::EPSILON || d > r1 + r2 || d < (r1 - r2).abs() {
        return None;
    }
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h = (r1 * r1 - a * a).max(0.0).sqrt();
    let along = pq / d;
    let left = Vector2D::new(-along.y, along.x);
    let mid = p + along * a;
    Some(match branch {
        Branch::Left => mid + left * h,
        Branch::Right => mid - left * h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_intersection_branches() {
        let p = Point2D::new(0.0, 0.0);
        let q = Point2D::new(2.0, 0.0);
        let left = circle_intersection(&p, 2.0, &q, 2.0, Branch::Left).unwrap();
        let right = circle_intersection(&p, 2.0, &q, 2.0, Branch::Right).unwrap();
        assert_relative_eq!(left.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(left.y, 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(right.y, -(3.0_f64.sqrt()), epsilon = 1e-12);
    }

    #[test]
    fn test_circle_intersection_disjoint() {
        let p = Point2D::new(0.0, 0.0);
        let q = Point2D::new(10.0, 0.0);
        assert!(circle_intersection(&p, 2.0, &q, 2.0, Branch::Left).is_none());
        // one circle inside the other
        assert!(circle_intersection(&p, 8.0, &Point2D::new(1.0, 0.0), 1.0, Branch::Left).is_none());
    }

    #[test]
    fn test_anchor_joints() {
        let anchors: Vec<Joint> = Joint::ALL.into_iter().filter(|j| j.is_anchor()).collect();
        assert_eq!(anchors, vec![Joint::O, Joint::C, Joint::D]);
        assert_eq!(Joint::G.to_string(), "G");
    }

    #[test]
    fn test_wrap_angle() {
        use std::f64::consts::PI;
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(0.25), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_tangent_is_derivative_of_unit() {
        let h = 1e-6;
        let angle = 0.7;
        let fd = (unit(angle + h) - unit(angle - h)) / (2.0 * h);
        let t = tangent(angle);
        assert_relative_eq!(fd.x, t.x, epsilon = 1e-8);
        assert_relative_eq!(fd.y, t.y, epsilon = 1e-8);
    }
}
