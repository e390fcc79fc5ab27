#![allow(clippy::float_cmp, clippy::cast_precision_loss)]
use std::sync::Arc;

use approx::assert_relative_eq;
use showerpix_core::{
    CameraGeometry, ImageMoments, PixelSample, Point2, ShowerFrame, TelescopeContext,
    TelescopePosition, TelescopeType, TimingFit,
};
use showerpix_stereo::plane::project_telescope;
use showerpix_stereo::{
    ArrayEvent, DispAux, DispEstimate, DispEstimator, DispInput, DispTable, EnergyQuality,
    EventReconstructor, FnDisp, GeometricSolver, Pointing, StereoImage, TelescopeEvent,
};

const ARRAY: [(f64, f64, f64); 4] = [
    (155.0, -20.0, 0.0),
    (105.7, 64.3, 2.0),
    (12.4, 108.0, -1.5),
    (-46.9, 37.4, 4.0),
];

/// Centroid-to-source distance of the rendered images (degrees).
const OFFSET: f64 = 0.8;

fn synthetic_image(
    id: u32,
    position: TelescopePosition,
    centroid: Point2,
    axis: Point2,
) -> StereoImage {
    let norm = axis.norm();
    let (c, s) = (axis.x / norm, axis.y / norm);
    StereoImage {
        telescope_id: id,
        telescope_type: TelescopeType(1),
        position,
        moments: ImageMoments {
            cen_x: centroid.x,
            cen_y: centroid.y,
            cosphi: c,
            sinphi: s,
            phi: s.atan2(c).to_degrees(),
            size: 300.0 + 50.0 * f64::from(id),
            length: 0.25,
            width: 0.08,
            ntubes: 25,
            fui: 1.0,
            ..ImageMoments::default()
        },
        timing: TimingFit::invalid(),
        pedvar: 0.0,
        muon: None,
    }
}

#[test]
fn test_geometric_recovery_inclined_pointing() {
    let pointing = Pointing::new(30.0, 60.0);
    let frame = ShowerFrame::from_pointing(pointing.zenith, pointing.azimuth);
    let core = [35.0, -20.0, 0.0];
    let core_sp = frame.to_shower(core);

    let images: Vec<StereoImage> = ARRAY
        .iter()
        .enumerate()
        .map(|(i, &(x, y, z))| {
            let position = TelescopePosition::new(x, y, z);
            let t = frame.to_shower(position.as_array());
            let axis = Point2::new(core_sp[0] - t[0], core_sp[1] - t[1]);
            let r = axis.norm();
            let centroid = Point2::new(0.7 * axis.x / r, 0.7 * axis.y / r);
            synthetic_image(u32::try_from(i).unwrap(), position, centroid, axis)
        })
        .collect();

    let sol = GeometricSolver::new().solve(&images, &pointing);
    assert_eq!(sol.n_images, 4);
    assert_eq!(sol.n_pairs, 6);
    assert_relative_eq!(sol.direction.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(sol.direction.y, 0.0, epsilon = 1e-9);
    assert!(sol.direction_dispersion < 1e-15);
    assert_relative_eq!(sol.core.x, core[0], epsilon = 1e-6);
    assert_relative_eq!(sol.core.y, core[1], epsilon = 1e-6);
    assert!(sol.core_dispersion < 1e-9);
}

/// Elongated Gaussian image along `axis` starting `offset` degrees from
/// `source`.
fn render(camera: &CameraGeometry, source: Point2, axis: Point2, offset: f64) -> PixelSample {
    let norm = axis.norm();
    let (c, s) = (axis.x / norm, axis.y / norm);
    let cen = Point2::new(source.x + offset * c, source.y + offset * s);
    let mut sample = PixelSample::new(camera.len());
    for i in 0..camera.len() {
        let (x, y) = camera.position(i);
        let u = ((x - cen.x) * c + (y - cen.y) * s) / 0.3;
        let v = (-(x - cen.x) * s + (y - cen.y) * c) / 0.12;
        let q = 400.0 * (-0.5 * (u * u + v * v)).exp();
        if q > 15.0 {
            sample.set(i, q, 5.0 + 2.0 * u, true, false);
        } else if q > 7.0 {
            sample.set(i, q, 5.0 + 2.0 * u, false, true);
        }
    }
    sample
}

/// Backend that knows the true source and takes the core distance from
/// the geometric solution.
fn oracle(source: Point2) -> Arc<dyn DispEstimator> {
    Arc::new(FnDisp::new(
        "oracle",
        move |input: &DispInput, ctx: &TelescopeContext, aux: &DispAux| {
            let disp = (input.cen_x - source.x).hypot(input.cen_y - source.y);
            let energy = 1.0 + 0.01 * ctx.telescope_type.0 as f64;
            let mut estimate = DispEstimate::new(disp).with_energy(energy);
            if let Some(distance) = aux.impact_distance {
                estimate = estimate.with_core_distance(distance);
            }
            Ok(estimate)
        },
    ))
}

/// Array event with ground telescopes at `z = 0`. Each image axis points
/// from the telescope towards `core` in the shower plane.
fn simulated_event(
    camera: &CameraGeometry,
    event_id: u64,
    pointing: Pointing,
    source: Point2,
    core: Point2,
) -> ArrayEvent {
    let frame = ShowerFrame::from_pointing(pointing.zenith, pointing.azimuth);
    let core_sp = frame.to_shower([core.x, core.y, 0.0]);
    let telescopes = ARRAY
        .iter()
        .enumerate()
        .map(|(i, &(x, y, _))| {
            let position = TelescopePosition::new(x, y, 0.0);
            let t = project_telescope(&frame, &position, source);
            let axis = Point2::new(core_sp[0] - t.x, core_sp[1] - t.y);
            TelescopeEvent {
                telescope_id: u32::try_from(i).unwrap() + 1,
                telescope_type: TelescopeType(1),
                position,
                pedvar: 2.0,
                sample: render(camera, source, axis, OFFSET),
            }
        })
        .collect();
    ArrayEvent {
        event_id,
        pointing,
        telescopes,
        seed: None,
    }
}

#[test]
fn test_full_chain_recovers_source() {
    let camera = Arc::new(CameraGeometry::hexagonal(30, 0.1).unwrap());
    let source = Point2::new(0.3, -0.2);
    let core = Point2::new(0.0, 0.0);
    let event = simulated_event(&camera, 11, Pointing::default(), source, core);

    let reco = EventReconstructor::new(oracle(source)).with_camera(TelescopeType(1), camera);
    let result = reco.reconstruct(&event);

    assert_eq!(result.n_images, 4);
    assert_eq!(result.telescope_ids, vec![1, 2, 3, 4]);
    // sky convention flips y
    assert_relative_eq!(result.direction_x, source.x, epsilon = 0.05);
    assert_relative_eq!(result.direction_y, -source.y, epsilon = 0.05);
    assert_relative_eq!(result.geo_direction_x, source.x, epsilon = 0.05);
    assert_relative_eq!(result.geo_direction_y, -source.y, epsilon = 0.05);
    assert!(result.dispdiff < 0.01);

    assert_relative_eq!(result.geo_core_x, core.x, epsilon = 10.0);
    assert_relative_eq!(result.geo_core_y, core.y, epsilon = 10.0);
    assert_relative_eq!(result.core_x, core.x, epsilon = 10.0);
    assert_relative_eq!(result.core_y, core.y, epsilon = 10.0);

    assert_relative_eq!(result.energy, 1.01, epsilon = 1e-12);
    assert_eq!(result.energy_quality, EnergyQuality::ValidMulti);
    assert_eq!(result.n_energy, 4);
}

#[test]
fn test_full_chain_inclined_pointing() {
    let camera = Arc::new(CameraGeometry::hexagonal(30, 0.1).unwrap());
    let pointing = Pointing::new(20.0, 45.0);
    let source = Point2::new(0.3, -0.2);
    let core = Point2::new(20.0, -15.0);
    let event = simulated_event(&camera, 12, pointing, source, core);

    // telescopes sit off the shower plane once the array is tilted
    let frame = ShowerFrame::from_pointing(pointing.zenith, pointing.azimuth);
    let height = frame.to_shower(event.telescopes[0].position.as_array())[2];
    assert!(height.abs() > 10.0);

    let reco = EventReconstructor::new(oracle(source)).with_camera(TelescopeType(1), camera);
    let result = reco.reconstruct(&event);

    assert_eq!(result.n_images, 4);
    assert_relative_eq!(result.direction_x, source.x, epsilon = 0.05);
    assert_relative_eq!(result.direction_y, -source.y, epsilon = 0.05);
    assert_relative_eq!(result.geo_direction_x, source.x, epsilon = 0.05);
    assert_relative_eq!(result.geo_direction_y, -source.y, epsilon = 0.05);

    // both cores come back on the ground, not in the shower plane
    assert_relative_eq!(result.geo_core_x, core.x, epsilon = 10.0);
    assert_relative_eq!(result.geo_core_y, core.y, epsilon = 10.0);
    assert_relative_eq!(result.core_x, core.x, epsilon = 10.0);
    assert_relative_eq!(result.core_y, core.y, epsilon = 10.0);
    assert!(result.core_dispersion < 100.0);
}

#[test]
fn test_batch_matches_sequential() {
    let camera = Arc::new(CameraGeometry::hexagonal(30, 0.1).unwrap());
    let source = Point2::new(-0.4, 0.1);
    let core = Point2::new(0.0, 0.0);
    let events: Vec<ArrayEvent> = (0..6)
        .map(|id| simulated_event(&camera, id, Pointing::default(), source, core))
        .collect();

    let reco = EventReconstructor::new(oracle(source)).with_camera(TelescopeType(1), camera);
    let batch = reco.reconstruct_batch(&events);
    assert_eq!(batch.len(), events.len());
    for (event, result) in events.iter().zip(&batch) {
        assert_eq!(result.event_id, event.event_id);
        assert_eq!(*result, reco.reconstruct(event));
    }
}

#[test]
fn test_table_backend_in_event() {
    let table = DispTable::from_json_str(
        r#"{"tables": [{
            "telescope_type": 1,
            "log_size": {"min": 1.0, "max": 6.0, "bins": 1},
            "width_over_length": {"min": 0.0, "max": 1.0, "bins": 1},
            "disp": [[0.8]],
            "energy": [[0.8]]
        }]}"#,
    )
    .unwrap();

    let camera = Arc::new(CameraGeometry::hexagonal(30, 0.1).unwrap());
    let source = Point2::new(0.2, 0.3);
    let event = simulated_event(&camera, 1, Pointing::default(), source, Point2::default());
    let reco = EventReconstructor::new(Arc::new(table)).with_camera(TelescopeType(1), camera);
    let result = reco.reconstruct(&event);

    assert!(result.has_direction());
    assert_relative_eq!(result.direction_x, source.x, epsilon = 0.05);
    assert_relative_eq!(result.direction_y, -source.y, epsilon = 0.05);
    assert_relative_eq!(result.energy, 0.8);
}
