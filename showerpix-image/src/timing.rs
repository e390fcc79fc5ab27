//! Timing-gradient fit along the image major axis.
//!
//! 1. Project every usable image pixel onto the major axis
//! 2. Per-point time error from the pixel charge
//! 3. IQR outlier rejection on the projected positions
//! 4. Weighted straight-line fit of time against position
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use showerpix_core::{CameraGeometry, ImageMoments, PixelSample, TimingFit, TIME_SENTINEL};

/// Configuration for the timing fitter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimingConfig {
    /// Points required after outlier rejection.
    pub min_points: usize,
    /// Points required before outlier rejection is attempted.
    pub outlier_min_points: usize,
    /// Multiple of the inter-quartile range accepted beyond each quartile.
    pub iqr_factor: f64,
    /// Rescale errors so the largest equals `error_ceiling`.
    pub rescale_errors: bool,
    pub error_ceiling: f64,
    /// Error assigned to pixels with non-positive charge.
    pub default_error: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_points: 3,
            outlier_min_points: 10,
            iqr_factor: 1.5,
            rescale_errors: true,
            error_ceiling: 1.0,
            default_error: 1.0,
        }
    }
}

impl TimingConfig {
    /// Set the minimum number of fit points.
    #[must_use]
    pub fn with_min_points(mut self, n: usize) -> Self {
        self.min_points = n;
        self
    }

    /// Set the number of points needed before outlier rejection runs.
    #[must_use]
    pub fn with_outlier_min_points(mut self, n: usize) -> Self {
        self.outlier_min_points = n;
        self
    }

    /// Set the IQR multiple used for outlier rejection.
    #[must_use]
    pub fn with_iqr_factor(mut self, factor: f64) -> Self {
        self.iqr_factor = factor;
        self
    }

    /// Enable or disable error rescaling.
    #[must_use]
    pub fn with_rescale_errors(mut self, rescale: bool) -> Self {
        self.rescale_errors = rescale;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct TimePoint {
    xpos: f64,
    time: f64,
    error: f64,
}

/// Timing-gradient fitter.
#[derive(Clone, Debug, Default)]
pub struct TimingFitter {
    config: TimingConfig,
}

impl TimingFitter {
    /// Create with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(config: TimingConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Fits time against position along the major axis of `moments`.
    ///
    /// Returns [`TimingFit::invalid`] when fewer than `min_points` usable
    /// points remain or the positions are degenerate.
    #[must_use]
    pub fn fit(
        &self,
        camera: &CameraGeometry,
        sample: &PixelSample,
        moments: &ImageMoments,
    ) -> TimingFit {
        if !moments.has_image() {
            return TimingFit::invalid();
        }

        let mut points: Vec<TimePoint> = (0..sample.len())
            .filter(|&i| sample.in_image(i) && !sample.low_gain[i])
            .filter(|&i| sample.time[i] > TIME_SENTINEL + 1.0)
            .map(|i| {
                let (x, y) = camera.position(i);
                let q = sample.charge[i];
                TimePoint {
                    xpos: (x - moments.cen_x) * moments.cosphi
                        + (y - moments.cen_y) * moments.sinphi,
                    time: sample.time[i],
                    error: if q > 0.0 {
                        1.0 / q
                    } else {
                        self.config.default_error
                    },
                }
            })
            .collect();

        if self.config.rescale_errors {
            let max_error = points.iter().map(|p| p.error).fold(0.0, f64::max);
            if max_error > 0.0 {
                let scale = self.config.error_ceiling / max_error;
                points.iter_mut().for_each(|p| p.error *= scale);
            }
        }

        if points.len() >= self.config.outlier_min_points {
            reject_position_outliers(&mut points, self.config.iqr_factor);
        }

        if points.len() < self.config.min_points {
            return TimingFit::invalid();
        }

        linear_fit(&points).unwrap_or_else(TimingFit::invalid)
    }
}

/// Linear-interpolated percentile of sorted data, `p` in `[0, 1]`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted {
        [] => return 0.0,
        [only] => return *only,
        _ => {}
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn reject_position_outliers(points: &mut Vec<TimePoint>, iqr_factor: f64) {
    if points.len() < 2 {
        return;
    }
    let mut sorted: Vec<f64> = points.iter().map(|p| p.xpos).collect();
    sorted.sort_by(f64::total_cmp);
    let range = sorted[sorted.len() - 1] - sorted[0];
    if range <= f64::EPSILON {
        return;
    }

    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - iqr_factor * iqr;
    let upper = q3 + iqr_factor * iqr;
    points.retain(|p| p.xpos >= lower && p.xpos <= upper);
}

fn linear_fit(points: &[TimePoint]) -> Option<TimingFit> {
    let mut s = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for p in points {
        let w = 1.0 / (p.error * p.error);
        if !w.is_finite() {
            return None;
        }
        s += w;
        sx += w * p.xpos;
        sy += w * p.time;
        sxx += w * p.xpos * p.xpos;
        sxy += w * p.xpos * p.time;
    }

    let delta = s * sxx - sx * sx;
    if delta <= f64::EPSILON * s * sxx.max(1.0) {
        return None;
    }

    let gradient = (s * sxy - sx * sy) / delta;
    let intercept = (sxx * sy - sx * sxy) / delta;

    let chi2 = points
        .iter()
        .map(|p| {
            let r = (p.time - intercept - gradient * p.xpos) / p.error;
            r * r
        })
        .sum();

    let t_min = points.iter().map(|p| p.time).fold(f64::INFINITY, f64::min);
    let t_max = points.iter().map(|p| p.time).fold(f64::NEG_INFINITY, f64::max);
    let t_mean = points.iter().map(|p| p.time).sum::<f64>() / points.len() as f64;

    Some(TimingFit {
        intercept,
        intercept_error: (sxx / delta).sqrt(),
        gradient,
        gradient_error: (s / delta).sqrt(),
        chi2,
        t_min,
        t_max,
        t_mean,
        n_points: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use showerpix_core::TIMING_SENTINEL;

    /// Pixels on the x axis at the given positions, one per entry.
    fn axis_camera(xs: &[f64]) -> CameraGeometry {
        CameraGeometry::from_positions(xs.to_vec(), vec![0.0; xs.len()], 0.0).unwrap()
    }

    fn axis_moments(cen_x: f64) -> ImageMoments {
        ImageMoments {
            cen_x,
            cosphi: 1.0,
            sinphi: 0.0,
            size: 100.0,
            length: 1.0,
            ntubes: 10,
            ..ImageMoments::default()
        }
    }

    #[test]
    fn test_recovers_linear_gradient() {
        let xs: Vec<f64> = (0..8).map(|i| 0.1 * f64::from(i)).collect();
        let camera = axis_camera(&xs);
        let mut sample = PixelSample::new(xs.len());
        for (i, &x) in xs.iter().enumerate() {
            sample.set(i, 50.0 + i as f64, 2.0 + 3.0 * (x - 0.35), true, false);
        }

        let fit = TimingFitter::new().fit(&camera, &sample, &axis_moments(0.35));
        assert!(fit.is_valid());
        assert_eq!(fit.n_points, 8);
        assert_relative_eq!(fit.gradient, 3.0, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 2.0, epsilon = 1e-9);
        assert!(fit.chi2 < 1e-12);
        assert!(fit.gradient_error > 0.0);
        assert_relative_eq!(fit.t_min, 2.0 - 1.05, epsilon = 1e-9);
        assert_relative_eq!(fit.t_max, 2.0 + 1.05, epsilon = 1e-9);
    }

    #[test]
    fn test_position_outlier_rejected() {
        let mut xs: Vec<f64> = (0..12).map(|i| 0.1 * f64::from(i)).collect();
        xs.push(10.0);
        let camera = axis_camera(&xs);
        let mut sample = PixelSample::new(xs.len());
        for (i, &x) in xs.iter().enumerate() {
            let time = if x > 5.0 { 500.0 } else { 1.0 + 2.0 * x };
            sample.set(i, 20.0, time, true, false);
        }

        let fit = TimingFitter::new().fit(&camera, &sample, &axis_moments(0.0));
        assert_eq!(fit.n_points, 12);
        assert_relative_eq!(fit.gradient, 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_points_is_sentinel() {
        let camera = axis_camera(&[0.0, 0.1, 0.2]);
        let mut sample = PixelSample::new(3);
        sample.set(0, 10.0, 1.0, true, false);
        sample.set(1, 10.0, 2.0, true, false);
        // image pixel without a pulse
        sample.set(2, 10.0, TIME_SENTINEL, true, false);

        let fit = TimingFitter::new().fit(&camera, &sample, &axis_moments(0.1));
        assert!(!fit.is_valid());
        assert!((fit.gradient - TIMING_SENTINEL).abs() < f64::EPSILON);
    }

    #[test]
    fn test_low_gain_pixels_skipped() {
        let xs = [0.0, 0.1, 0.2, 0.3];
        let camera = axis_camera(&xs);
        let mut sample = PixelSample::new(4);
        for (i, &x) in xs.iter().enumerate() {
            sample.set(i, 10.0, 4.0 * x, true, false);
        }
        sample.time[3] = 99.0;
        sample.low_gain[3] = true;

        let fit = TimingFitter::new().fit(&camera, &sample, &axis_moments(0.0));
        assert_eq!(fit.n_points, 3);
        assert_relative_eq!(fit.gradient, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_positions_invalid() {
        // all pixels project onto the same axis position
        let camera =
            CameraGeometry::from_positions(vec![0.0; 4], vec![0.0, 1.0, 2.0, 3.0], 0.0).unwrap();
        let mut sample = PixelSample::new(4);
        for i in 0..4 {
            sample.set(i, 10.0, 1.0, true, false);
        }
        let fit = TimingFitter::new().fit(&camera, &sample, &axis_moments(0.0));
        assert!(!fit.is_valid());
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&data, 0.25), 2.0);
        assert_relative_eq!(percentile(&data, 0.5), 3.0);
        assert_relative_eq!(percentile(&[0.0, 1.0], 0.75), 0.75);
        assert_relative_eq!(percentile(&[7.0], 0.25), 7.0);
        assert_relative_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_outlier_rejection_without_points() {
        let config = TimingConfig::default()
            .with_outlier_min_points(0)
            .with_min_points(0);
        let fitter = TimingFitter::with_config(config);

        // no image pixel carries a pulse time
        let camera = axis_camera(&[0.0, 0.1, 0.2]);
        let mut sample = PixelSample::new(3);
        for i in 0..3 {
            sample.set(i, 10.0, TIME_SENTINEL, true, false);
        }
        let fit = fitter.fit(&camera, &sample, &axis_moments(0.1));
        assert!(!fit.is_valid());

        // a single usable point survives rejection untouched
        sample.time[1] = 4.0;
        let fit = fitter.fit(&camera, &sample, &axis_moments(0.1));
        assert!(!fit.is_valid());

        let mut points = vec![TimePoint {
            xpos: 0.5,
            time: 1.0,
            error: 1.0,
        }];
        reject_position_outliers(&mut points, 1.5);
        assert_eq!(points.len(), 1);
        reject_position_outliers(&mut Vec::new(), 1.5);
    }
}
