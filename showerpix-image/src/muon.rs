//! Muon-ring fitting.
//!
//! The ring centre is found by a coordinate search that minimises the
//! charge-weighted variance of the pixel radii. The fitted ring is then
//! validated by the fraction of pixels close to the radius and by its
//! azimuthal coverage.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use showerpix_core::{CameraGeometry, MuonRing, PixelSample};

/// Steps of the light-yield integral over the ring azimuth.
const YIELD_STEPS: usize = 360;

/// Configuration for the muon-ring fitter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MuonConfig {
    /// The image needs more than this many pixels.
    pub min_pixels: usize,
    /// Positive trial step at iteration zero; decays as `1 / (1 + k^0.3)`.
    pub initial_step: f64,
    /// Fixed step tried in the opposite direction.
    pub fallback_step: f64,
    pub max_iterations: usize,
    /// Consecutive iterations without improvement before stopping.
    pub max_stale_iterations: usize,
    /// Half-width of the radius band in units of the radius sigma.
    pub band_sigma: f64,
    /// Minimum fraction of pixels inside the band.
    pub min_band_fraction: f64,
    pub azimuth_bins: usize,
    /// Minimum in-band pixels in every azimuth bin.
    pub min_pixels_per_bin: usize,
}

impl Default for MuonConfig {
    fn default() -> Self {
        Self {
            min_pixels: 10,
            initial_step: 0.1,
            fallback_step: 0.05,
            max_iterations: 100,
            max_stale_iterations: 20,
            band_sigma: 1.5,
            min_band_fraction: 0.7,
            azimuth_bins: 8,
            min_pixels_per_bin: 2,
        }
    }
}

impl MuonConfig {
    /// Set the search step sizes.
    #[must_use]
    pub fn with_steps(mut self, initial: f64, fallback: f64) -> Self {
        self.initial_step = initial;
        self.fallback_step = fallback;
        self
    }

    /// Set the iteration limits.
    #[must_use]
    pub fn with_iterations(mut self, max: usize, max_stale: usize) -> Self {
        self.max_iterations = max;
        self.max_stale_iterations = max_stale;
        self
    }

    /// Set the band half-width in radius sigmas.
    #[must_use]
    pub fn with_band_sigma(mut self, band_sigma: f64) -> Self {
        self.band_sigma = band_sigma;
        self
    }

    /// Set the azimuthal coverage requirement.
    #[must_use]
    pub fn with_coverage(mut self, bins: usize, min_per_bin: usize) -> Self {
        self.azimuth_bins = bins;
        self.min_pixels_per_bin = min_per_bin;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct RingPixel {
    x: f64,
    y: f64,
    weight: f64,
}

/// Weighted mean radius and variance about `(x0, y0)`.
fn radius_stats(pixels: &[RingPixel], x0: f64, y0: f64) -> (f64, f64) {
    let mut sum_w = 0.0;
    let mut sum_r = 0.0;
    let mut sum_r2 = 0.0;
    for p in pixels {
        let r = (p.x - x0).hypot(p.y - y0);
        sum_w += p.weight;
        sum_r += p.weight * r;
        sum_r2 += p.weight * r * r;
    }
    let mean = sum_r / sum_w;
    let variance = (sum_r2 / sum_w - mean * mean).max(0.0);
    (mean, variance)
}

/// Mean relative Cherenkov yield around a ring seen at impact fraction `f`.
fn relative_yield(f: f64) -> f64 {
    let dphi = 2.0 * PI / YIELD_STEPS as f64;
    let sum: f64 = (0..YIELD_STEPS)
        .map(|i| {
            let s = ((i as f64 + 0.5) * dphi).sin();
            (1.0 - f * f * s * s).max(0.0).sqrt()
        })
        .sum();
    sum / YIELD_STEPS as f64
}

/// Iterative muon-ring fitter.
#[derive(Clone, Debug, Default)]
pub struct MuonRingFitter {
    config: MuonConfig,
}

impl MuonRingFitter {
    /// Create with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(config: MuonConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &MuonConfig {
        &self.config
    }

    /// Fits a ring to the image/border pixels of `sample`.
    ///
    /// Images with too few pixels give the all-zero invalid ring.
    #[must_use]
    pub fn fit(&self, camera: &CameraGeometry, sample: &PixelSample) -> MuonRing {
        let mut pixels: Vec<RingPixel> = (0..sample.len())
            .filter(|&i| sample.in_image(i))
            .map(|i| {
                let (x, y) = camera.position(i);
                RingPixel {
                    x,
                    y,
                    weight: sample.charge[i].max(0.0),
                }
            })
            .collect();

        if pixels.len() <= self.config.min_pixels {
            return MuonRing::default();
        }
        if pixels.iter().map(|p| p.weight).sum::<f64>() <= 0.0 {
            pixels.iter_mut().for_each(|p| p.weight = 1.0);
        }

        let (x0, y0) = self.search_centre(&pixels);
        let (radius, variance) = radius_stats(&pixels, x0, y0);
        let radius_sigma = variance.sqrt();

        self.validate(camera, sample, x0, y0, radius, radius_sigma)
    }

    fn search_centre(&self, pixels: &[RingPixel]) -> (f64, f64) {
        let total: f64 = pixels.iter().map(|p| p.weight).sum();
        let mut centre = [
            pixels.iter().map(|p| p.weight * p.x).sum::<f64>() / total,
            pixels.iter().map(|p| p.weight * p.y).sum::<f64>() / total,
        ];
        let mut best = radius_stats(pixels, centre[0], centre[1]).1;
        let mut stale = 0;

        for k in 0..self.config.max_iterations {
            let step = self.config.initial_step / (1.0 + (k as f64).powf(0.3));
            let mut improved = false;

            for axis in 0..2 {
                for delta in [step, -self.config.fallback_step] {
                    let mut trial = centre;
                    trial[axis] += delta;
                    let variance = radius_stats(pixels, trial[0], trial[1]).1;
                    if variance < best {
                        best = variance;
                        centre = trial;
                        improved = true;
                        break;
                    }
                }
            }

            if improved {
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.max_stale_iterations {
                    log::trace!("muon fit converged after {} iterations", k + 1);
                    break;
                }
            }
        }

        (centre[0], centre[1])
    }

    fn validate(
        &self,
        camera: &CameraGeometry,
        sample: &PixelSample,
        x0: f64,
        y0: f64,
        radius: f64,
        radius_sigma: f64,
    ) -> MuonRing {
        let half_width = (self.config.band_sigma * radius_sigma).max(1e-9 * radius.max(1.0));
        let bins = self.config.azimuth_bins.max(1);
        let bin_width = 360.0 / bins as f64;

        let mut per_bin = vec![0_usize; bins];
        let mut n_pixels = 0;
        let mut n_band = 0;
        let mut size = 0.0;
        let mut harmonic = (0.0, 0.0);

        for i in (0..sample.len()).filter(|&i| sample.in_image(i)) {
            n_pixels += 1;
            let (x, y) = camera.position(i);
            let (dx, dy) = (x - x0, y - y0);
            if (dx.hypot(dy) - radius).abs() > half_width {
                continue;
            }
            n_band += 1;
            let q = sample.charge[i];
            let phi = dy.atan2(dx);
            size += q;
            harmonic.0 += q * phi.cos();
            harmonic.1 += q * phi.sin();

            let bin = (phi.to_degrees().rem_euclid(360.0) / bin_width) as usize;
            per_bin[bin.min(bins - 1)] += 1;
        }

        let band_fraction = n_band as f64 / n_pixels as f64;
        let covered = per_bin
            .iter()
            .all(|&count| count >= self.config.min_pixels_per_bin);
        let valid = band_fraction >= self.config.min_band_fraction && covered;

        let impact_fraction = if size > 0.0 {
            (2.0 * harmonic.0.hypot(harmonic.1) / size).clamp(0.0, 1.0)
        } else {
            0.0
        };

        MuonRing {
            x0,
            y0,
            radius,
            radius_sigma,
            valid,
            size,
            impact_fraction,
            corrected_size: size / relative_yield(impact_fraction),
            n_band_pixels: n_band,
        }
    }
}
