//! Combination of per-telescope disp solutions into an event direction and
//! core.
//!
//! Every image offers two candidate source positions, one on each side of
//! its centroid along the major axis. The combiner picks one candidate per
//! image so that the chosen points agree, then averages them.
//!
//! All positions here are in the camera frame. The flip to the external
//! sky convention happens once, in [`to_sky_convention`].
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use serde::{Deserialize, Serialize};

use showerpix_core::{Error, ImageMoments, Point2, Result, ShowerFrame, TelescopePosition};

use crate::disp::DispEstimate;
use crate::plane::{project_telescope, shower_plane_to_ground};
use crate::{is_direction_sentinel, CORE_SENTINEL, DIRECTION_SENTINEL};

/// Upper bound on the exhaustive search multiplicity (`2^n` combinations).
pub const MAX_EXHAUSTIVE_IMAGES: usize = 16;

/// Configuration for the direction combiner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Two images whose axes are closer than this (degrees) are rejected.
    pub min_image_angle: f64,
    /// Largest multiplicity resolved by exhaustive search, between 2 and
    /// [`MAX_EXHAUSTIVE_IMAGES`].
    pub max_exhaustive_images: usize,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            min_image_angle: 10.0,
            max_exhaustive_images: 4,
        }
    }
}

impl CombinerConfig {
    #[must_use]
    pub fn with_min_image_angle(mut self, degrees: f64) -> Self {
        self.min_image_angle = degrees;
        self
    }

    #[must_use]
    pub fn with_max_exhaustive_images(mut self, n: usize) -> Self {
        self.max_exhaustive_images = n;
        self
    }

    /// Checks the settings are usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for an angle outside `[0, 90]` degrees
    /// or an exhaustive limit outside `2..=MAX_EXHAUSTIVE_IMAGES`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=90.0).contains(&self.min_image_angle) {
            return Err(Error::ConfigError(format!(
                "min_image_angle must be within [0, 90] degrees, got {}",
                self.min_image_angle
            )));
        }
        if !(2..=MAX_EXHAUSTIVE_IMAGES).contains(&self.max_exhaustive_images) {
            return Err(Error::ConfigError(format!(
                "max_exhaustive_images must be within 2..={MAX_EXHAUSTIVE_IMAGES}, got {}",
                self.max_exhaustive_images
            )));
        }
        Ok(())
    }
}

/// One image as seen by the combiner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispImage {
    pub centroid: Point2,
    pub cosphi: f64,
    pub sinphi: f64,
    pub disp: f64,
    pub weight: f64,
}

impl DispImage {
    #[must_use]
    pub fn new(moments: &ImageMoments, estimate: &DispEstimate) -> Self {
        Self {
            centroid: Point2::new(moments.cen_x, moments.cen_y),
            cosphi: moments.cosphi,
            sinphi: moments.sinphi,
            disp: estimate.disp,
            weight: image_weight(moments, estimate),
        }
    }

    /// The two source candidates `centroid ± disp * (cosphi, sinphi)`.
    #[must_use]
    pub fn candidates(&self) -> [Point2; 2] {
        let dx = self.disp * self.cosphi;
        let dy = self.disp * self.sinphi;
        [
            Point2::new(self.centroid.x + dx, self.centroid.y + dy),
            Point2::new(self.centroid.x - dx, self.centroid.y - dy),
        ]
    }

    fn nearest_candidate(&self, seed: Point2) -> Point2 {
        let [plus, minus] = self.candidates();
        if minus.distance_squared(&seed) < plus.distance_squared(&seed) {
            minus
        } else {
            plus
        }
    }
}

/// Weight of one image in the direction average: inverse variance when the
/// backend reports an uncertainty, `size * (1 - width/length)` otherwise.
#[must_use]
pub fn image_weight(moments: &ImageMoments, estimate: &DispEstimate) -> f64 {
    match estimate.uncertainty {
        Some(sigma) if sigma > 0.0 && sigma.is_finite() => 1.0 / (sigma * sigma),
        _ => moments.size * moments.elongation(),
    }
}

/// Angle between two image axes in degrees, in `[0, 90]`.
#[must_use]
pub fn axis_angle(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 * b.0 + a.1 * b.1).abs().min(1.0).acos().to_degrees()
}

/// Largest pairwise axis angle among the images, zero for fewer than two.
#[must_use]
pub fn max_axis_angle(images: &[DispImage]) -> f64 {
    let mut max = 0.0_f64;
    for (i, a) in images.iter().enumerate() {
        for b in &images[i + 1..] {
            max = max.max(axis_angle((a.cosphi, a.sinphi), (b.cosphi, b.sinphi)));
        }
    }
    max
}

/// Flips camera-frame coordinates into the external sky convention
/// (y axis reversed). Sentinel values pass through unchanged.
#[must_use]
pub fn to_sky_convention(point: Point2) -> Point2 {
    if is_direction_sentinel(point) {
        return point;
    }
    Point2::new(point.x, -point.y)
}

/// Combined direction of one event (camera frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionEstimate {
    pub direction: Point2,
    /// Mean pairwise squared distance of the chosen candidates.
    pub dispdiff: f64,
    pub n_images: usize,
    /// Candidate chosen for each input image.
    pub chosen: Vec<Point2>,
}

impl DirectionEstimate {
    #[must_use]
    pub fn invalid(n_images: usize) -> Self {
        Self {
            direction: Point2::new(DIRECTION_SENTINEL, DIRECTION_SENTINEL),
            dispdiff: DIRECTION_SENTINEL,
            n_images,
            chosen: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.chosen.is_empty()
    }
}

fn weighted_mean(points: &[Point2], weights: &[f64]) -> Point2 {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        let x = points.iter().zip(weights).map(|(p, w)| w * p.x).sum::<f64>() / total;
        let y = points.iter().zip(weights).map(|(p, w)| w * p.y).sum::<f64>() / total;
        Point2::new(x, y)
    } else {
        let n = points.len() as f64;
        Point2::new(
            points.iter().map(|p| p.x).sum::<f64>() / n,
            points.iter().map(|p| p.y).sum::<f64>() / n,
        )
    }
}

fn pairwise_squared(points: &[Point2]) -> (f64, usize) {
    let mut sum = 0.0;
    let mut pairs = 0;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            sum += a.distance_squared(b);
            pairs += 1;
        }
    }
    (sum, pairs)
}

/// Candidate choice minimising the total pairwise squared distance over
/// all `2^n` sign combinations. Ties keep the lowest combination index.
fn exhaustive_choice(images: &[DispImage]) -> Vec<Point2> {
    let candidates: Vec<[Point2; 2]> = images.iter().map(DispImage::candidates).collect();
    let mut best: Option<(f64, Vec<Point2>)> = None;
    let mut chosen = Vec::with_capacity(images.len());

    for mask in 0..(1_usize << images.len()) {
        chosen.clear();
        chosen.extend(
            candidates
                .iter()
                .enumerate()
                .map(|(i, pair)| pair[(mask >> i) & 1]),
        );
        let (cost, _) = pairwise_squared(&chosen);
        let better = match &best {
            Some((best_cost, _)) => cost < *best_cost,
            None => true,
        };
        if better {
            best = Some((cost, chosen.clone()));
        }
    }

    best.map(|(_, points)| points).unwrap_or_default()
}

/// Multi-telescope disp combiner.
#[derive(Clone, Debug, Default)]
pub struct DispCombiner {
    config: CombinerConfig,
}

impl DispCombiner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: CombinerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Resolves the disp ambiguity and averages the chosen candidates.
    ///
    /// Small multiplicities are solved exhaustively. Larger ones (or any
    /// multiplicity with a `seed`) take for every image the candidate
    /// nearest the seed; without a seed, the exhaustive solution of the
    /// highest-weight images serves as one. The exhaustive limit is clamped
    /// to `2..=MAX_EXHAUSTIVE_IMAGES`.
    #[must_use]
    pub fn combine(&self, images: &[DispImage], seed: Option<Point2>) -> DirectionEstimate {
        let n = images.len();
        if n < 2 {
            return DirectionEstimate::invalid(n);
        }
        if n == 2 {
            let angle = axis_angle(
                (images[0].cosphi, images[0].sinphi),
                (images[1].cosphi, images[1].sinphi),
            );
            if angle < self.config.min_image_angle {
                log::debug!("image axes {angle:.2} deg apart, below minimum");
                return DirectionEstimate::invalid(n);
            }
        }

        let limit = self
            .config
            .max_exhaustive_images
            .clamp(2, MAX_EXHAUSTIVE_IMAGES);
        let chosen = match seed {
            Some(seed) => images.iter().map(|img| img.nearest_candidate(seed)).collect(),
            None if n <= limit => exhaustive_choice(images),
            None => {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| images[b].weight.total_cmp(&images[a].weight));
                let strongest: Vec<DispImage> =
                    order[..limit].iter().map(|&i| images[i]).collect();
                let seed_points = exhaustive_choice(&strongest);
                let seed_weights: Vec<f64> = strongest.iter().map(|img| img.weight).collect();
                let seed = weighted_mean(&seed_points, &seed_weights);
                images.iter().map(|img| img.nearest_candidate(seed)).collect()
            }
        };

        let weights: Vec<f64> = images.iter().map(|img| img.weight).collect();
        let direction = weighted_mean(&chosen, &weights);
        if !direction.is_finite() {
            return DirectionEstimate::invalid(n);
        }
        let (sum, pairs) = pairwise_squared(&chosen);

        DirectionEstimate {
            direction,
            dispdiff: sum / pairs as f64,
            n_images: n,
            chosen,
        }
    }
}

/// One telescope's input to the disp core estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreImage {
    pub position: TelescopePosition,
    pub centroid: Point2,
    /// Telescope distance from the core reported by the disp backend.
    pub core_distance: f64,
    /// `size * (1 - width/length)`.
    pub weight: f64,
}

/// Ground core of one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoreEstimate {
    pub core: Point2,
    /// Weighted mean squared distance of the single-telescope cores from
    /// the combined one (shower plane).
    pub dispersion: f64,
    pub n_images: usize,
}

impl CoreEstimate {
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            core: Point2::new(CORE_SENTINEL, CORE_SENTINEL),
            dispersion: CORE_SENTINEL,
            n_images: 0,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.n_images > 0
    }
}

/// Core from disp-backend core distances.
///
/// The image of a shower extends from the source towards the core, so each
/// telescope places the core at its shower-plane position plus
/// `core_distance` along `centroid - source`. The per-telescope cores are
/// averaged with the image weights and mapped back to the ground.
#[must_use]
pub fn disp_core(frame: &ShowerFrame, source: Point2, images: &[CoreImage]) -> CoreEstimate {
    if !source.is_finite() || is_direction_sentinel(source) {
        return CoreEstimate::invalid();
    }

    let mut points = Vec::with_capacity(images.len());
    let mut weights = Vec::with_capacity(images.len());
    for img in images {
        let dx = img.centroid.x - source.x;
        let dy = img.centroid.y - source.y;
        let norm = dx.hypot(dy);
        if norm <= 0.0 || !img.core_distance.is_finite() || img.core_distance < 0.0 {
            continue;
        }
        let t = project_telescope(frame, &img.position, source);
        points.push(Point2::new(
            t.x + img.core_distance * dx / norm,
            t.y + img.core_distance * dy / norm,
        ));
        weights.push(img.weight);
    }
    if points.is_empty() {
        return CoreEstimate::invalid();
    }

    let mean = weighted_mean(&points, &weights);
    let total: f64 = weights.iter().sum();
    let dispersion = if total > 0.0 {
        points
            .iter()
            .zip(&weights)
            .map(|(p, w)| w * p.distance_squared(&mean))
            .sum::<f64>()
            / total
    } else {
        points.iter().map(|p| p.distance_squared(&mean)).sum::<f64>() / points.len() as f64
    };

    let core = shower_plane_to_ground(frame, mean);
    if !core.is_finite() {
        return CoreEstimate::invalid();
    }
    CoreEstimate {
        core,
        dispersion,
        n_images: points.len(),
    }
}
