#![allow(clippy::float_cmp, clippy::cast_precision_loss)]
use approx::assert_relative_eq;
use showerpix_core::{CameraGeometry, PixelSample};
use showerpix_image::{parameterize_image, ImageConfig, MomentCalculator, TimingFitter};

/// Small deterministic generator so the property checks are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn random_image(camera: &CameraGeometry, rng: &mut Lcg) -> PixelSample {
    let mut sample = PixelSample::new(camera.len());
    let cx = rng.next_f64() * 1.6 - 0.8;
    let cy = rng.next_f64() * 1.6 - 0.8;
    let angle = rng.next_f64() * std::f64::consts::PI;
    let (c, s) = (angle.cos(), angle.sin());
    let sl = 0.1 + 0.3 * rng.next_f64();
    let sw = 0.05 + 0.1 * rng.next_f64();
    for i in 0..camera.len() {
        let (x, y) = camera.position(i);
        let u = ((x - cx) * c + (y - cy) * s) / sl;
        let v = (-(x - cx) * s + (y - cy) * c) / sw;
        let q = 200.0 * (-0.5 * (u * u + v * v)).exp() * (0.5 + rng.next_f64());
        if q > 10.0 {
            sample.set(i, q, 10.0 + u, true, false);
        } else if q > 5.0 {
            sample.set(i, q, 10.0 + u, false, true);
        }
        sample.dead[i] = rng.next_f64() < 0.02;
    }
    sample
}

#[test]
fn test_shape_invariants_on_random_images() {
    let camera = CameraGeometry::hexagonal(10, 0.1).unwrap();
    let calc = MomentCalculator::new();
    let mut rng = Lcg(42);

    for _ in 0..200 {
        let sample = random_image(&camera, &mut rng);
        let m = calc.calculate(&camera, &sample);
        if !m.has_image() {
            continue;
        }
        assert!(m.width >= 0.0);
        assert!(m.length >= m.width, "length {} < width {}", m.length, m.width);
        assert!((0.0..=1.0).contains(&m.loss));
        assert!((0.0..=1.0).contains(&m.loss_and_dead));
        assert!(m.loss_and_dead >= m.loss);
        assert!((0.0..=1.0).contains(&m.fui));
        assert!(m.alpha.is_finite() && (0.0..=90.0).contains(&m.alpha));
        assert!(m.miss <= m.distance);
        assert!(m.azwidth >= m.width - 1e-12 && m.azwidth <= m.length + 1e-12);
        assert_relative_eq!(m.cosphi.hypot(m.sinphi), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_circular_cluster() {
    let camera = CameraGeometry::hexagonal(6, 0.1).unwrap();
    // a full hexagon around an off-centre pixel: isotropic second moments
    let centre = (0..camera.len())
        .min_by(|&a, &b| {
            let da = (camera.x()[a] - 0.3).hypot(camera.y()[a] - 0.17);
            let db = (camera.x()[b] - 0.3).hypot(camera.y()[b] - 0.17);
            da.total_cmp(&db)
        })
        .unwrap();
    let mut sample = PixelSample::new(camera.len());
    sample.set(centre, 50.0, 0.0, true, false);
    for &j in camera.neighbours(centre) {
        sample.set(j, 50.0, 0.0, true, false);
    }
    assert_eq!(sample.n_image_pixels(), 7);

    let m = MomentCalculator::new().calculate(&camera, &sample);
    assert_relative_eq!(m.width, m.length, epsilon = 1e-6);
    assert_relative_eq!(m.azwidth, m.length, epsilon = 1e-6);
    assert!(m.alpha.is_finite());
    assert_relative_eq!(m.cen_x, camera.x()[centre], epsilon = 1e-9);
}

#[test]
fn test_permutation_invariance() {
    let camera = CameraGeometry::hexagonal(8, 0.1).unwrap();
    let mut rng = Lcg(7);
    let sample = random_image(&camera, &mut rng);

    // reverse the pixel numbering of camera and sample together
    let n = camera.len();
    let rev = |v: &[f64]| v.iter().rev().copied().collect::<Vec<_>>();
    let permuted_camera = CameraGeometry::from_positions(rev(camera.x()), rev(camera.y()), 0.105)
        .unwrap();
    let mut permuted = PixelSample::new(n);
    for i in 0..n {
        let j = n - 1 - i;
        permuted.set(j, sample.charge[i], sample.time[i], sample.image[i], sample.border[i]);
        permuted.dead[j] = sample.dead[i];
    }

    let calc = MomentCalculator::new();
    let a = calc.calculate(&camera, &sample);
    let b = calc.calculate(&permuted_camera, &permuted);

    assert_eq!(a.ntubes, b.ntubes);
    assert_relative_eq!(a.size, b.size, max_relative = 1e-12);
    assert_relative_eq!(a.cen_x, b.cen_x, epsilon = 1e-12);
    assert_relative_eq!(a.cen_y, b.cen_y, epsilon = 1e-12);
    assert_relative_eq!(a.length, b.length, epsilon = 1e-9);
    assert_relative_eq!(a.width, b.width, epsilon = 1e-9);
    // same axis up to orientation sign
    assert_relative_eq!(
        (a.cosphi * b.cosphi + a.sinphi * b.sinphi).abs(),
        1.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(a.alpha, b.alpha, epsilon = 1e-6);
    assert_relative_eq!(a.loss, b.loss, epsilon = 1e-12);
    assert_relative_eq!(a.fui, b.fui, epsilon = 1e-12);
}

#[test]
fn test_repeated_calculation_is_bit_identical() {
    let camera = CameraGeometry::hexagonal(8, 0.1).unwrap();
    let mut rng = Lcg(99);
    let sample = random_image(&camera, &mut rng);
    let calc = MomentCalculator::new();

    let first = calc.calculate(&camera, &sample);
    let second = calc.calculate(&camera, &sample);
    assert_eq!(first, second);
    assert_eq!(first.length.to_bits(), second.length.to_bits());

    let timing = TimingFitter::new();
    assert_eq!(
        timing.fit(&camera, &sample, &first),
        timing.fit(&camera, &sample, &first)
    );
}

#[test]
fn test_full_chain_on_elongated_image() {
    let camera = CameraGeometry::hexagonal(10, 0.1).unwrap();
    let mut sample = PixelSample::new(camera.len());
    for i in 0..camera.len() {
        let (x, y) = camera.position(i);
        // axis along +x through (0.4, 0), arrival time rising along the axis
        let u = (x - 0.4) / 0.25;
        let v = y / 0.06;
        let q = 150.0 * (-0.5 * (u * u + v * v)).exp();
        if q > 8.0 {
            sample.set(i, q, 4.0 + 3.0 * (x - 0.4), true, false);
        }
    }

    let params = parameterize_image(&camera, &sample, &ImageConfig::default()).unwrap();
    let m = params.moments;
    assert_relative_eq!(m.cen_x, 0.4, epsilon = 0.02);
    assert_relative_eq!(m.cen_y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(m.cosphi.abs(), 1.0, epsilon = 1e-9);
    assert!(m.length > 2.0 * m.width);
    assert!(m.alpha < 1e-6);

    let t = params.timing;
    assert!(t.is_valid());
    assert_relative_eq!(t.gradient.abs(), 3.0, epsilon = 1e-6);
}
