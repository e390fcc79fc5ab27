//! Hillas moment calculation.
//!
//! Charge-weighted second and third moments of the cleaned image pixels,
//! reduced to centroid, length, width, orientation and the derived shape
//! quantities (miss, alpha, azwidth, asymmetry, loss, fui).
#![allow(
    clippy::cast_precision_loss,
    clippy::similar_names,
    clippy::many_single_char_names,
    clippy::doc_markdown
)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use showerpix_core::{CameraGeometry, ImageMoments, PixelSample};

/// Configuration for the moment calculator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MomentConfig {
    /// Weight pixels by charge squared instead of charge.
    pub square_weights: bool,
    /// Ellipse scale (in units of length/width) used for `fui`.
    pub cover_factor: f64,
    /// Magnitude below which moments are treated as exactly zero.
    pub zero_tolerance: f64,
}

impl Default for MomentConfig {
    fn default() -> Self {
        Self {
            square_weights: false,
            cover_factor: 2.0,
            zero_tolerance: 1e-8,
        }
    }
}

impl MomentConfig {
    /// Set charge-squared weighting.
    #[must_use]
    pub fn with_square_weights(mut self, square: bool) -> Self {
        self.square_weights = square;
        self
    }

    /// Set the `fui` ellipse cover factor.
    #[must_use]
    pub fn with_cover_factor(mut self, factor: f64) -> Self {
        self.cover_factor = factor;
        self
    }

    /// Set the zero tolerance.
    #[must_use]
    pub fn with_zero_tolerance(mut self, tolerance: f64) -> Self {
        self.zero_tolerance = tolerance;
        self
    }
}

/// Raw weighted sums up to third order.
#[derive(Debug, Default, Clone, Copy)]
struct MomentSums {
    w: f64,
    x: f64,
    y: f64,
    x2: f64,
    y2: f64,
    xy: f64,
    x3: f64,
    y3: f64,
    x2y: f64,
    xy2: f64,
}

impl MomentSums {
    #[inline]
    fn add(&mut self, x: f64, y: f64, w: f64) {
        self.w += w;
        self.x += x * w;
        self.y += y * w;
        self.x2 += x * x * w;
        self.y2 += y * y * w;
        self.xy += x * y * w;
        self.x3 += x * x * x * w;
        self.y3 += y * y * y * w;
        self.x2y += x * x * y * w;
        self.xy2 += x * y * y * w;
    }
}

/// Hillas parameter calculator.
///
/// Stateless apart from its configuration: the same pixel sample always
/// produces a bit-identical record.
#[derive(Clone, Debug, Default)]
pub struct MomentCalculator {
    config: MomentConfig,
}

impl MomentCalculator {
    /// Create with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MomentConfig::default(),
        }
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(config: MomentConfig) -> Self {
        Self { config }
    }

    /// Replace the configuration.
    pub fn configure(&mut self, config: MomentConfig) {
        self.config = config;
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &MomentConfig {
        &self.config
    }

    /// Computes the image parameters of one telescope image.
    ///
    /// `sample` must have been validated against `camera`. An empty image (or
    /// one with non-positive total weight) returns the all-zero "no image"
    /// record.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn calculate(&self, camera: &CameraGeometry, sample: &PixelSample) -> ImageMoments {
        let tol = self.config.zero_tolerance;

        let mut sums = MomentSums::default();
        let mut size = 0.0;
        let mut max_charge = f64::MIN;
        let mut edge_charge = 0.0;
        let mut edge_or_dead_charge = 0.0;
        let mut ntubes = 0usize;

        for pixel in 0..sample.len() {
            if !sample.in_image(pixel) {
                continue;
            }
            let q = sample.charge[pixel];
            let w = if self.config.square_weights { q * q } else { q };
            let (x, y) = camera.position(pixel);
            sums.add(x, y, w);

            size += q;
            max_charge = max_charge.max(q);
            ntubes += 1;
            if camera.is_edge(pixel) {
                edge_charge += q;
                edge_or_dead_charge += q;
            } else if camera.touches_dead(pixel, &sample.dead) {
                edge_or_dead_charge += q;
            }
        }

        if ntubes == 0 || sums.w <= 0.0 {
            return ImageMoments {
                ntubes,
                size: size.max(0.0),
                ..ImageMoments::default()
            };
        }

        let xmean = sums.x / sums.w;
        let ymean = sums.y / sums.w;
        let x2mean = sums.x2 / sums.w;
        let y2mean = sums.y2 / sums.w;
        let xymean = sums.xy / sums.w;
        let distance = xmean.hypot(ymean);

        let zero_small = |v: f64| if v.abs() < tol { 0.0 } else { v };
        let sdevx2 = zero_small(x2mean - xmean * xmean);
        let sdevy2 = zero_small(y2mean - ymean * ymean);
        let sdevxy = zero_small(xymean - xmean * ymean);

        let d = sdevy2 - sdevx2;
        let z = (d * d + 4.0 * sdevxy * sdevxy).sqrt();
        let length = (0.5 * (sdevx2 + sdevy2 + z)).max(0.0).sqrt();
        let width = (0.5 * (sdevx2 + sdevy2 - z)).max(0.0).sqrt();

        let (cosphi, sinphi) = if sdevxy.abs() > tol {
            // major-axis eigenvector, signed so the centroid projects forward
            let ax = 2.0 * sdevxy;
            let ay = d + z;
            let norm = ax.hypot(ay);
            let (c, s) = (ax / norm, ay / norm);
            if c * xmean + s * ymean < 0.0 {
                (-c, -s)
            } else {
                (c, s)
            }
        } else if z > tol {
            if sdevx2 >= sdevy2 {
                (1.0, 0.0)
            } else {
                (0.0, 1.0)
            }
        } else if distance > tol {
            (-ymean / distance, xmean / distance)
        } else {
            (1.0, 0.0)
        };

        let miss = (-sinphi * xmean + cosphi * ymean).abs().min(distance);
        let sin_alpha = if distance > tol {
            (miss / distance).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let alpha = sin_alpha.asin().to_degrees();
        let azwidth = (width * width + (length * length - width * width) * sin_alpha * sin_alpha)
            .max(0.0)
            .sqrt();

        let asymmetry = if length > tol {
            let x3mean = sums.x3 / sums.w;
            let y3mean = sums.y3 / sums.w;
            let x2ymean = sums.x2y / sums.w;
            let xy2mean = sums.xy2 / sums.w;
            let sdevx3 = x3mean - 3.0 * xmean * x2mean + 2.0 * xmean.powi(3);
            let sdevy3 = y3mean - 3.0 * ymean * y2mean + 2.0 * ymean.powi(3);
            let sdevx2y =
                x2ymean - 2.0 * xymean * xmean - x2mean * ymean + 2.0 * xmean * xmean * ymean;
            let sdevxy2 =
                xy2mean - 2.0 * xymean * ymean - y2mean * xmean + 2.0 * xmean * ymean * ymean;
            let m3 = cosphi.powi(3) * sdevx3
                + 3.0 * cosphi * cosphi * sinphi * sdevx2y
                + 3.0 * cosphi * sinphi * sinphi * sdevxy2
                + sinphi.powi(3) * sdevy3;
            m3.cbrt() / length
        } else {
            0.0
        };

        let (loss, loss_and_dead) = if size > 0.0 {
            (
                (edge_charge / size).clamp(0.0, 1.0),
                (edge_or_dead_charge / size).clamp(0.0, 1.0),
            )
        } else {
            (0.0, 0.0)
        };

        let fui = self.fraction_under_ellipse(
            camera, sample, xmean, ymean, length, width, cosphi, sinphi,
        );

        ImageMoments {
            cen_x: xmean,
            cen_y: ymean,
            length,
            width,
            cosphi,
            sinphi,
            phi: sinphi.atan2(cosphi).to_degrees(),
            size,
            max_charge,
            asymmetry,
            loss,
            loss_and_dead,
            distance,
            miss,
            alpha,
            azwidth,
            fui,
            ntubes,
        }
    }

    /// Fraction of live pixels inside the scaled image ellipse that belong to
    /// the image. Zero when the ellipse is degenerate.
    #[allow(clippy::too_many_arguments)]
    fn fraction_under_ellipse(
        &self,
        camera: &CameraGeometry,
        sample: &PixelSample,
        cen_x: f64,
        cen_y: f64,
        length: f64,
        width: f64,
        cosphi: f64,
        sinphi: f64,
    ) -> f64 {
        let a = self.config.cover_factor * length;
        let b = self.config.cover_factor * width;
        if a <= self.config.zero_tolerance || b <= self.config.zero_tolerance {
            return 0.0;
        }

        let mut inside = 0usize;
        let mut inside_image = 0usize;
        for pixel in 0..sample.len() {
            if sample.dead[pixel] {
                continue;
            }
            let (x, y) = camera.position(pixel);
            let dx = x - cen_x;
            let dy = y - cen_y;
            let u = (dx * cosphi + dy * sinphi) / a;
            let v = (-dx * sinphi + dy * cosphi) / b;
            if u * u + v * v <= 1.0 {
                inside += 1;
                if sample.in_image(pixel) {
                    inside_image += 1;
                }
            }
        }

        if inside == 0 {
            0.0
        } else {
            inside_image as f64 / inside as f64
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    fn line_camera() -> CameraGeometry {
        // five pixels on the x axis at x = 1..5, plus one off-axis pixel
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 3.0];
        let y = vec![0.0, 0.0, 0.0, 0.0, 0.0, 3.0];
        CameraGeometry::from_positions(x, y, 1.01).unwrap()
    }

    #[test]
    fn test_empty_image_is_no_image_state() {
        let camera = line_camera();
        let sample = PixelSample::new(camera.len());
        let moments = MomentCalculator::new().calculate(&camera, &sample);
        assert_eq!(moments, ImageMoments::default());
        assert!(!moments.has_image());
    }

    #[test]
    fn test_axis_aligned_image() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        for pixel in 0..5 {
            sample.set(pixel, 10.0, 0.0, true, false);
        }
        let moments = MomentCalculator::new().calculate(&camera, &sample);

        assert_relative_eq!(moments.cen_x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(moments.cen_y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(moments.size, 50.0);
        // variance of {1..5} is 2
        assert_relative_eq!(moments.length, 2.0_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(moments.width, 0.0);
        assert_eq!((moments.cosphi, moments.sinphi), (1.0, 0.0));
        assert_relative_eq!(moments.miss, 0.0);
        assert_relative_eq!(moments.alpha, 0.0);
        assert_eq!(moments.ntubes, 5);
        // collinear image: no ellipse area
        assert_eq!(moments.fui, 0.0);
    }

    #[test]
    fn test_single_pixel_is_finite() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        sample.set(5, 42.0, 0.0, true, false);
        let moments = MomentCalculator::new().calculate(&camera, &sample);

        assert_eq!(moments.length, 0.0);
        assert_eq!(moments.width, 0.0);
        assert_relative_eq!(moments.distance, 3.0_f64.hypot(3.0), epsilon = 1e-12);
        // perpendicular to the centroid vector
        assert_relative_eq!(moments.alpha, 90.0, epsilon = 1e-5);
        assert!(moments.asymmetry.is_finite());
        assert_eq!(moments.asymmetry, 0.0);
    }

    #[test]
    fn test_asymmetry_sign_follows_tail() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        // bright head at small x, long tail towards large x
        for (pixel, q) in [(0, 40.0), (1, 20.0), (2, 10.0), (3, 5.0), (4, 5.0)] {
            sample.set(pixel, q, 0.0, true, false);
        }
        let moments = MomentCalculator::new().calculate(&camera, &sample);
        assert_eq!((moments.cosphi, moments.sinphi), (1.0, 0.0));
        assert!(moments.asymmetry > 0.0);

        let mut mirrored = PixelSample::new(camera.len());
        for (pixel, q) in [(4, 40.0), (3, 20.0), (2, 10.0), (1, 5.0), (0, 5.0)] {
            mirrored.set(pixel, q, 0.0, true, false);
        }
        let flipped = MomentCalculator::new().calculate(&camera, &mirrored);
        assert!(flipped.asymmetry < 0.0);
    }

    #[test]
    fn test_loss_counts_edge_charge() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        // pixels 0 and 4 have a single neighbour, pixels 1..3 have two
        for pixel in 0..5 {
            sample.set(pixel, 10.0, 0.0, true, false);
        }
        let moments = MomentCalculator::new().calculate(&camera, &sample);
        assert!(camera.is_edge(0) && camera.is_edge(4) && !camera.is_edge(2));
        assert_relative_eq!(moments.loss, 0.4, epsilon = 1e-12);

        sample.dead[5] = true;
        let unchanged = MomentCalculator::new().calculate(&camera, &sample);
        assert_relative_eq!(unchanged.loss_and_dead, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_dead_neighbour_adds_charge_to_loss_and_dead() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        sample.set(0, 10.0, 0.0, true, false);
        sample.set(1, 10.0, 0.0, true, false);
        sample.set(2, 20.0, 0.0, true, false);
        let calc = MomentCalculator::new();

        let before = calc.calculate(&camera, &sample);
        assert_relative_eq!(before.loss, 0.25, epsilon = 1e-12);
        assert_relative_eq!(before.loss_and_dead, 0.25, epsilon = 1e-12);

        // pixel 3 sits next to the interior image pixel 2
        sample.dead[3] = true;
        assert!(!camera.is_edge(2) && camera.touches_dead(2, &sample.dead));
        let after = calc.calculate(&camera, &sample);
        assert_relative_eq!(after.loss, before.loss, epsilon = 1e-12);
        assert_relative_eq!(
            after.loss_and_dead - after.loss,
            sample.charge[2] / after.size,
            epsilon = 1e-12
        );
        assert_relative_eq!(after.loss_and_dead, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_square_weights_pull_centroid_towards_bright_pixel() {
        let camera = line_camera();
        let mut sample = PixelSample::new(camera.len());
        sample.set(0, 30.0, 0.0, true, false);
        sample.set(1, 10.0, 0.0, true, false);

        let linear = MomentCalculator::new().calculate(&camera, &sample);
        let squared =
            MomentCalculator::with_config(MomentConfig::default().with_square_weights(true))
                .calculate(&camera, &sample);

        assert_relative_eq!(linear.cen_x, 1.25, epsilon = 1e-12);
        assert_relative_eq!(squared.cen_x, 1.1, epsilon = 1e-12);
        // size is always the plain charge sum
        assert_relative_eq!(squared.size, 40.0);
    }

    #[test]
    fn test_config_builders() {
        let config = MomentConfig::default()
            .with_cover_factor(1.5)
            .with_zero_tolerance(1e-10)
            .with_square_weights(true);
        let mut calc = MomentCalculator::new();
        calc.configure(config.clone());
        assert_eq!(calc.config(), &config);
        assert!((calc.config().cover_factor - 1.5).abs() < f64::EPSILON);
    }
}
