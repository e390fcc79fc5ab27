//! Geometry helpers shared by the stereo solvers.
//!
//! - rotation between ground coordinates and the shower plane
//! - 2D line intersection
//! - weighted perpendicular-distance fit of a point to a bundle of lines

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Horizontal direction magnitude below which the shower is treated as
/// vertical and the rotation is the identity.
pub const VERTICAL_TOLERANCE: f64 = 1e-9;

/// Relative cross-product magnitude below which two lines are parallel.
pub const PARALLEL_TOLERANCE: f64 = 1e-9;

/// Slope reported for lines whose x direction vanishes.
pub const SLOPE_SENTINEL: f64 = 1.0e9;

/// Point (or vector) in a plane.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    #[must_use]
    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[inline]
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Infinite line through `origin` along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Line2 {
    pub origin: Point2,
    pub direction: Point2,
}

impl Line2 {
    /// Line through `origin` along `(dx, dy)`. The direction is not normalised.
    #[must_use]
    pub const fn new(origin: Point2, dx: f64, dy: f64) -> Self {
        Self {
            origin,
            direction: Point2::new(dx, dy),
        }
    }

    /// Line through `origin` with slope `dy/dx = slope`.
    #[must_use]
    pub fn with_slope(origin: Point2, slope: f64) -> Self {
        Self::new(origin, 1.0, slope)
    }

    /// Slope of the line, or `SLOPE_SENTINEL` for (near) vertical lines.
    #[must_use]
    pub fn slope(&self) -> f64 {
        if self.direction.x.abs() < VERTICAL_TOLERANCE {
            SLOPE_SENTINEL
        } else {
            self.direction.y / self.direction.x
        }
    }

    /// Unit normal `(-dy, dx) / |d|`, `None` for a zero direction.
    fn unit_normal(&self) -> Option<Point2> {
        let norm = self.direction.norm();
        if norm > 0.0 && norm.is_finite() {
            Some(Point2::new(
                -self.direction.y / norm,
                self.direction.x / norm,
            ))
        } else {
            None
        }
    }
}

/// Perpendicular distance from `point` to `line` (zero-direction lines give
/// the distance to their origin).
#[must_use]
pub fn perpendicular_distance(point: Point2, line: &Line2) -> f64 {
    match line.unit_normal() {
        Some(n) => (n.x * (point.x - line.origin.x) + n.y * (point.y - line.origin.y)).abs(),
        None => point.distance_squared(&line.origin).sqrt(),
    }
}

/// Intersection of two parametric lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineIntersection {
    pub point: Point2,
    /// Path parameter along the first line (`origin + a1 * direction`).
    pub a1: f64,
    /// Path parameter along the second line.
    pub a2: f64,
}

impl LineIntersection {
    /// Both lines reach the intersection moving forward along their
    /// direction.
    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.a1 > 0.0 && self.a2 > 0.0
    }
}

/// Solves `p1 + a1 d1 = p2 + a2 d2`.
///
/// Returns `None` when either direction is zero or the lines are parallel.
#[must_use]
pub fn intersect_lines(first: &Line2, second: &Line2) -> Option<LineIntersection> {
    let d1 = first.direction;
    let d2 = second.direction;
    let n1 = d1.norm();
    let n2 = d2.norm();
    if n1 == 0.0 || n2 == 0.0 {
        return None;
    }

    let cross = d1.x * d2.y - d1.y * d2.x;
    if cross.abs() < PARALLEL_TOLERANCE * n1 * n2 {
        return None;
    }

    let rx = second.origin.x - first.origin.x;
    let ry = second.origin.y - first.origin.y;
    let a1 = (rx * d2.y - ry * d2.x) / cross;
    let a2 = (rx * d1.y - ry * d1.x) / cross;

    Some(LineIntersection {
        point: Point2::new(first.origin.x + a1 * d1.x, first.origin.y + a1 * d1.y),
        a1,
        a2,
    })
}

/// Result of [`weighted_perpendicular_fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerpendicularFit {
    pub point: Point2,
    /// Weighted mean squared perpendicular residual.
    pub variance: f64,
}

/// Point minimising the weighted sum of squared perpendicular distances to
/// a set of lines.
///
/// Returns `None` for fewer than two usable lines, a non-positive total
/// weight, or an ill-conditioned system (all lines parallel).
///
/// # Panics
///
/// Panics if `lines` and `weights` differ in length; that is a caller bug.
#[must_use]
pub fn weighted_perpendicular_fit(lines: &[Line2], weights: &[f64]) -> Option<PerpendicularFit> {
    assert_eq!(
        lines.len(),
        weights.len(),
        "weighted_perpendicular_fit: one weight per line"
    );

    let mut sum_w = 0.0;
    let mut a11 = 0.0;
    let mut a12 = 0.0;
    let mut a22 = 0.0;
    let mut b1 = 0.0;
    let mut b2 = 0.0;
    let mut used = 0usize;

    for (line, &w) in lines.iter().zip(weights) {
        let Some(n) = line.unit_normal() else {
            continue;
        };
        if w <= 0.0 || !w.is_finite() {
            continue;
        }
        let c = n.x * line.origin.x + n.y * line.origin.y;
        sum_w += w;
        a11 += w * n.x * n.x;
        a12 += w * n.x * n.y;
        a22 += w * n.y * n.y;
        b1 += w * n.x * c;
        b2 += w * n.y * c;
        used += 1;
    }

    if used < 2 || sum_w <= 0.0 {
        return None;
    }

    a11 /= sum_w;
    a12 /= sum_w;
    a22 /= sum_w;
    b1 /= sum_w;
    b2 /= sum_w;

    let det = a11 * a22 - a12 * a12;
    if det.abs() < 1e-12 {
        return None;
    }
    let point = Point2::new((b1 * a22 - b2 * a12) / det, (a11 * b2 - a12 * b1) / det);
    if !point.is_finite() {
        return None;
    }

    let mut sum_r2 = 0.0;
    for (line, &w) in lines.iter().zip(weights) {
        if w <= 0.0 || !w.is_finite() || line.unit_normal().is_none() {
            continue;
        }
        let r = perpendicular_distance(point, line);
        sum_r2 += w * r * r;
    }

    Some(PerpendicularFit {
        point,
        variance: sum_r2 / sum_w,
    })
}

/// Direction cosines `(dl, dm, dn)` pointing at (zenith, azimuth), both in
/// degrees. Ground frame: x east, y north, z up; azimuth from north to east.
#[must_use]
pub fn direction_cosines(zenith_deg: f64, azimuth_deg: f64) -> [f64; 3] {
    let ze = zenith_deg.to_radians();
    let az = azimuth_deg.to_radians();
    [ze.sin() * az.sin(), ze.sin() * az.cos(), ze.cos()]
}

/// Inverse of [`direction_cosines`]; returns (zenith, azimuth) in degrees,
/// azimuth in `[0, 360)`.
#[must_use]
pub fn zenith_azimuth(direction: [f64; 3]) -> (f64, f64) {
    let [dl, dm, dn] = direction;
    let zenith = dl.hypot(dm).atan2(dn).to_degrees();
    let azimuth = dl.atan2(dm).to_degrees().rem_euclid(360.0);
    (zenith, azimuth)
}

/// Orthonormal frame whose z axis is a shower direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowerFrame {
    rows: [[f64; 3]; 3],
}

impl ShowerFrame {
    /// Frame for direction cosines `dl`, `dm` (`dn` follows from
    /// normalisation). Vertical directions give the identity.
    #[must_use]
    pub fn new(dl: f64, dm: f64) -> Self {
        let sv = dl.hypot(dm);
        if sv <= VERTICAL_TOLERANCE {
            return Self {
                rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            };
        }
        let dn = (1.0 - sv * sv).max(0.0).sqrt();
        Self {
            rows: [
                [dl * dn / sv, dm * dn / sv, -sv],
                [-dm / sv, dl / sv, 0.0],
                [dl, dm, dn],
            ],
        }
    }

    /// Frame pointing at (zenith, azimuth) in degrees.
    #[must_use]
    pub fn from_pointing(zenith_deg: f64, azimuth_deg: f64) -> Self {
        let [dl, dm, _] = direction_cosines(zenith_deg, azimuth_deg);
        Self::new(dl, dm)
    }

    /// Ground coordinates into the shower frame.
    #[must_use]
    pub fn to_shower(&self, p: [f64; 3]) -> [f64; 3] {
        let r = &self.rows;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2],
        ]
    }

    /// Shower-frame coordinates back to ground (transpose).
    #[must_use]
    pub fn to_ground(&self, p: [f64; 3]) -> [f64; 3] {
        let r = &self.rows;
        [
            r[0][0] * p[0] + r[1][0] * p[1] + r[2][0] * p[2],
            r[0][1] * p[0] + r[1][1] * p[1] + r[2][1] * p[2],
            r[0][2] * p[0] + r[1][2] * p[1] + r[2][2] * p[2],
        ]
    }

    /// The frame's z axis in ground coordinates.
    #[must_use]
    pub fn axis(&self) -> [f64; 3] {
        self.rows[2]
    }
}

/// Rotates `point` into the shower plane defined by direction cosines
/// `dl`, `dm`; `invert` applies the reverse transform.
#[must_use]
pub fn rotate_to_shower_plane(dl: f64, dm: f64, point: [f64; 3], invert: bool) -> [f64; 3] {
    let frame = ShowerFrame::new(dl, dm);
    if invert {
        frame.to_ground(point)
    } else {
        frame.to_shower(point)
    }
}
