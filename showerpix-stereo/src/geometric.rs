//! Geometric stereo reconstruction from image axes alone.
//!
//! The direction is the weighted mean of the pairwise intersections of the
//! image major axes in the camera. The core is the point closest to the
//! lines running from every telescope (in the shower plane) along its image
//! axis.
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use showerpix_core::{
    intersect_lines, weighted_perpendicular_fit, Line2, Point2, ShowerFrame,
};

use crate::event::{Pointing, StereoImage};
use crate::plane::{project_telescope, shower_plane_to_ground};
use crate::{CORE_SENTINEL, DIRECTION_SENTINEL};

/// Configuration for the geometric solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometricConfig {
    /// Image pairs closer than this to parallel (degrees) are skipped.
    pub min_pair_angle: f64,
}

impl Default for GeometricConfig {
    fn default() -> Self {
        Self {
            min_pair_angle: 10.0,
        }
    }
}

/// Direction and core from axis intersections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricSolution {
    /// Source position in the camera frame (degrees).
    pub direction: Point2,
    /// Mean pairwise squared distance of the accepted intersections.
    pub direction_dispersion: f64,
    /// Ground impact point (metres).
    pub core: Point2,
    /// Weighted mean squared perpendicular residual of the core fit.
    pub core_dispersion: f64,
    pub n_images: usize,
    /// Image pairs that contributed to the direction.
    pub n_pairs: usize,
}

impl GeometricSolution {
    #[must_use]
    pub fn invalid(n_images: usize) -> Self {
        Self {
            direction: Point2::new(DIRECTION_SENTINEL, DIRECTION_SENTINEL),
            direction_dispersion: DIRECTION_SENTINEL,
            core: Point2::new(CORE_SENTINEL, CORE_SENTINEL),
            core_dispersion: CORE_SENTINEL,
            n_images,
            n_pairs: 0,
        }
    }

    #[must_use]
    pub fn has_direction(&self) -> bool {
        self.n_pairs > 0
    }

    #[must_use]
    pub fn has_core(&self) -> bool {
        self.has_direction() && !crate::is_core_sentinel(self.core)
    }
}

/// Axis-intersection stereo solver.
#[derive(Clone, Debug, Default)]
pub struct GeometricSolver {
    config: GeometricConfig,
}

impl GeometricSolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: GeometricConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GeometricConfig {
        &self.config
    }

    /// Reconstructs direction and core. Images without positive size and
    /// length are ignored; fewer than two usable images give sentinels.
    #[must_use]
    pub fn solve(&self, images: &[StereoImage], pointing: &Pointing) -> GeometricSolution {
        let usable: Vec<&StereoImage> = images
            .iter()
            .filter(|img| img.moments.size > 0.0 && img.moments.length > 0.0)
            .collect();
        let n = usable.len();
        if n < 2 {
            return GeometricSolution::invalid(n);
        }

        let Some((direction, direction_dispersion, n_pairs)) = self.direction(&usable) else {
            return GeometricSolution::invalid(n);
        };

        let frame = ShowerFrame::from_pointing(pointing.zenith, pointing.azimuth);
        let (core, core_dispersion) = match core_fit(&frame, &usable, direction) {
            Some(fit) => fit,
            None => (Point2::new(CORE_SENTINEL, CORE_SENTINEL), CORE_SENTINEL),
        };

        GeometricSolution {
            direction,
            direction_dispersion,
            core,
            core_dispersion,
            n_images: n,
            n_pairs,
        }
    }

    fn direction(&self, images: &[&StereoImage]) -> Option<(Point2, f64, usize)> {
        let min_angle = self.config.min_pair_angle;
        let mut points = Vec::new();
        let mut weights = Vec::new();

        for (i, a) in images.iter().enumerate() {
            for b in &images[i + 1..] {
                let (ma, mb) = (&a.moments, &b.moments);
                let delta = (ma.phi - mb.phi).rem_euclid(180.0);
                if delta < min_angle || delta > 180.0 - min_angle {
                    continue;
                }
                let line_a = Line2::new(Point2::new(ma.cen_x, ma.cen_y), ma.cosphi, ma.sinphi);
                let line_b = Line2::new(Point2::new(mb.cen_x, mb.cen_y), mb.cosphi, mb.sinphi);
                let Some(hit) = intersect_lines(&line_a, &line_b) else {
                    continue;
                };

                let w = 1.0 / (1.0 / ma.size + 1.0 / mb.size)
                    * ma.elongation()
                    * mb.elongation()
                    * delta.to_radians().sin();
                points.push(hit.point);
                weights.push(w * w);
            }
        }

        let total: f64 = weights.iter().sum();
        if points.is_empty() || total <= 0.0 || !total.is_finite() {
            log::debug!("geometric direction: no usable image pairs");
            return None;
        }

        let direction = Point2::new(
            points.iter().zip(&weights).map(|(p, w)| w * p.x).sum::<f64>() / total,
            points.iter().zip(&weights).map(|(p, w)| w * p.y).sum::<f64>() / total,
        );
        if !direction.is_finite() {
            return None;
        }

        let mut sum = 0.0;
        let mut pairs = 0usize;
        for (i, p) in points.iter().enumerate() {
            for q in &points[i + 1..] {
                sum += p.distance_squared(q);
                pairs += 1;
            }
        }
        let dispersion = if pairs > 0 { sum / pairs as f64 } else { 0.0 };

        Some((direction, dispersion, points.len()))
    }
}

fn core_fit(frame: &ShowerFrame, images: &[&StereoImage], source: Point2) -> Option<(Point2, f64)> {
    let mut lines = Vec::with_capacity(images.len());
    let mut weights = Vec::with_capacity(images.len());
    for img in images {
        let m = &img.moments;
        let origin = project_telescope(frame, &img.position, source);
        lines.push(Line2::new(origin, m.cen_x - source.x, m.cen_y - source.y));
        let w = m.size * m.elongation();
        weights.push(w * w);
    }

    let fit = weighted_perpendicular_fit(&lines, &weights)?;
    let core = shower_plane_to_ground(frame, fit.point);
    if !core.is_finite() || !fit.variance.is_finite() {
        return None;
    }
    Some((core, fit.variance))
}
