//! Per-event orchestration: single-image parameterization, disp estimation
//! and the stereo combination, producing one [`EventReconstruction`] per
//! array event.
#![allow(clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use showerpix_core::{
    CameraGeometry, Error, ImageMoments, MuonRing, PixelSample, Point2, Result, ShowerFrame,
    TelescopeContext, TelescopePosition, TelescopeType, TimingFit,
};
use showerpix_image::{parameterize_image, ImageConfig};

use crate::combiner::{
    disp_core, max_axis_angle, to_sky_convention, CombinerConfig, CoreEstimate, CoreImage,
    DirectionEstimate, DispCombiner, DispImage,
};
use crate::disp::{checked_estimate, DispAux, DispEstimate, DispEstimator, DispInput};
use crate::energy::{combine_energy, EnergyConfig, EnergyEstimate, EnergyInput, EnergyQuality};
use crate::geometric::{GeometricConfig, GeometricSolution, GeometricSolver};
use crate::plane::impact_distance;

/// Array pointing for one event (degrees).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pointing {
    pub zenith: f64,
    /// North through east.
    pub azimuth: f64,
}

impl Pointing {
    #[must_use]
    pub fn new(zenith: f64, azimuth: f64) -> Self {
        Self { zenith, azimuth }
    }
}

/// Raw data of one telescope in one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelescopeEvent {
    pub telescope_id: u32,
    pub telescope_type: TelescopeType,
    pub position: TelescopePosition,
    /// Mean pedestal variance of the camera.
    #[serde(default)]
    pub pedvar: f64,
    pub sample: PixelSample,
}

/// All telescopes of one array event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayEvent {
    pub event_id: u64,
    pub pointing: Pointing,
    pub telescopes: Vec<TelescopeEvent>,
    /// External direction seed (camera frame) for the disp combiner.
    #[serde(default)]
    pub seed: Option<Point2>,
}

/// A parameterized telescope image ready for the stereo stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoImage {
    pub telescope_id: u32,
    pub telescope_type: TelescopeType,
    pub position: TelescopePosition,
    pub moments: ImageMoments,
    pub timing: TimingFit,
    pub pedvar: f64,
    /// Ring fit, present when `fit_muon` is enabled in [`ImageConfig`].
    #[serde(default)]
    pub muon: Option<MuonRing>,
}

/// Reconstruction settings for the whole chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub image: ImageConfig,
    /// Images below this size are not used in the stereo stage.
    pub min_size: f64,
    pub min_ntubes: usize,
    pub max_loss: f64,
    pub combiner: CombinerConfig,
    pub energy: EnergyConfig,
    pub geometric: GeometricConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            min_size: 0.0,
            min_ntubes: 3,
            max_loss: 1.0,
            combiner: CombinerConfig::default(),
            energy: EnergyConfig::default(),
            geometric: GeometricConfig::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Set the stereo image-selection cuts.
    #[must_use]
    pub fn with_image_cuts(mut self, min_size: f64, min_ntubes: usize, max_loss: f64) -> Self {
        self.min_size = min_size;
        self.min_ntubes = min_ntubes;
        self.max_loss = max_loss;
        self
    }

    #[must_use]
    pub fn with_combiner(mut self, combiner: CombinerConfig) -> Self {
        self.combiner = combiner;
        self
    }

    #[must_use]
    pub fn with_energy(mut self, energy: EnergyConfig) -> Self {
        self.energy = energy;
        self
    }

    #[must_use]
    pub fn with_geometric(mut self, geometric: GeometricConfig) -> Self {
        self.geometric = geometric;
        self
    }

    /// Checks the stereo settings are usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a loss cut outside `[0, 1]`, a
    /// non-finite size cut, a pair angle outside `[0, 90)` degrees, or an
    /// invalid combiner setting.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_loss) {
            return Err(Error::ConfigError(format!(
                "max_loss must be within [0, 1], got {}",
                self.max_loss
            )));
        }
        if !self.min_size.is_finite() {
            return Err(Error::ConfigError(format!(
                "min_size must be finite, got {}",
                self.min_size
            )));
        }
        if !(0.0..90.0).contains(&self.geometric.min_pair_angle) {
            return Err(Error::ConfigError(format!(
                "geometric.min_pair_angle must be within [0, 90) degrees, got {}",
                self.geometric.min_pair_angle
            )));
        }
        self.combiner.validate()
    }
}

/// Result record of one event.
///
/// Directions are in the external sky convention (see
/// [`to_sky_convention`]); undefined quantities hold the sentinels
/// [`crate::DIRECTION_SENTINEL`], [`crate::CORE_SENTINEL`] and
/// [`crate::ENERGY_SENTINEL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReconstruction {
    pub event_id: u64,
    /// Telescopes used by the disp combination.
    pub telescope_ids: Vec<u32>,
    pub n_images: usize,
    pub direction_x: f64,
    pub direction_y: f64,
    pub dispdiff: f64,
    pub core_x: f64,
    pub core_y: f64,
    pub core_dispersion: f64,
    pub energy: f64,
    pub energy_spread: f64,
    pub energy_quality: EnergyQuality,
    pub n_energy: usize,
    /// Largest angle between two image axes (degrees).
    pub max_axis_angle: f64,
    pub geo_direction_x: f64,
    pub geo_direction_y: f64,
    pub geo_direction_dispersion: f64,
    pub geo_core_x: f64,
    pub geo_core_y: f64,
    pub geo_core_dispersion: f64,
}

impl EventReconstruction {
    fn assemble(
        event_id: u64,
        telescope_ids: Vec<u32>,
        direction: &DirectionEstimate,
        core: &CoreEstimate,
        energy: &EnergyEstimate,
        max_axis_angle: f64,
        geometric: &GeometricSolution,
    ) -> Self {
        let dir = to_sky_convention(direction.direction);
        let geo_dir = to_sky_convention(geometric.direction);
        Self {
            event_id,
            telescope_ids,
            n_images: direction.n_images,
            direction_x: dir.x,
            direction_y: dir.y,
            dispdiff: direction.dispdiff,
            core_x: core.core.x,
            core_y: core.core.y,
            core_dispersion: core.dispersion,
            energy: energy.energy,
            energy_spread: energy.spread,
            energy_quality: energy.quality,
            n_energy: energy.n_images,
            max_axis_angle,
            geo_direction_x: geo_dir.x,
            geo_direction_y: geo_dir.y,
            geo_direction_dispersion: geometric.direction_dispersion,
            geo_core_x: geometric.core.x,
            geo_core_y: geometric.core.y,
            geo_core_dispersion: geometric.core_dispersion,
        }
    }

    /// Whether the disp direction is defined.
    #[must_use]
    pub fn has_direction(&self) -> bool {
        !crate::is_direction_sentinel(Point2::new(self.direction_x, self.direction_y))
    }
}

/// Runs the full reconstruction chain for array events.
///
/// Camera geometries and the disp backend are set up once and shared
/// read-only by every event, so one reconstructor can serve all worker
/// threads.
#[derive(Clone)]
pub struct EventReconstructor {
    cameras: HashMap<TelescopeType, Arc<CameraGeometry>>,
    disp: Arc<dyn DispEstimator>,
    config: ReconstructionConfig,
}

impl std::fmt::Debug for EventReconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReconstructor")
            .field("cameras", &self.cameras.keys().collect::<Vec<_>>())
            .field("disp", &self.disp.name())
            .field("config", &self.config)
            .finish()
    }
}

impl EventReconstructor {
    /// Create with default configuration and no cameras.
    pub fn new(disp: Arc<dyn DispEstimator>) -> Self {
        Self {
            cameras: HashMap::new(),
            disp,
            config: ReconstructionConfig::default(),
        }
    }

    /// Register the camera of one telescope type.
    #[must_use]
    pub fn with_camera(
        mut self,
        telescope_type: TelescopeType,
        camera: Arc<CameraGeometry>,
    ) -> Self {
        self.cameras.insert(telescope_type, camera);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconstructionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    #[must_use]
    pub fn camera(&self, telescope_type: TelescopeType) -> Option<&Arc<CameraGeometry>> {
        self.cameras.get(&telescope_type)
    }

    /// Parameterizes every telescope image of the event. Telescopes without
    /// a registered camera or with malformed pixel data are skipped with a
    /// warning.
    #[must_use]
    pub fn parameterize(&self, event: &ArrayEvent) -> Vec<StereoImage> {
        event
            .telescopes
            .iter()
            .filter_map(|tel| {
                let Some(camera) = self.cameras.get(&tel.telescope_type) else {
                    log::warn!(
                        "event {}: telescope {} has no camera for type {:?}",
                        event.event_id,
                        tel.telescope_id,
                        tel.telescope_type
                    );
                    return None;
                };
                match parameterize_image(camera, &tel.sample, &self.config.image) {
                    Ok(params) => Some(StereoImage {
                        telescope_id: tel.telescope_id,
                        telescope_type: tel.telescope_type,
                        position: tel.position,
                        moments: params.moments,
                        timing: params.timing,
                        pedvar: tel.pedvar,
                        muon: params.muon,
                    }),
                    Err(e) => {
                        log::warn!(
                            "event {}: telescope {} skipped: {e}",
                            event.event_id,
                            tel.telescope_id
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Reconstructs one event from raw pixel data.
    #[must_use]
    pub fn reconstruct(&self, event: &ArrayEvent) -> EventReconstruction {
        let images = self.parameterize(event);
        self.reconstruct_images(event.event_id, &event.pointing, &images, event.seed)
    }

    /// Reconstructs many events in parallel. Output order matches input.
    #[must_use]
    pub fn reconstruct_batch(&self, events: &[ArrayEvent]) -> Vec<EventReconstruction> {
        events.par_iter().map(|event| self.reconstruct(event)).collect()
    }

    fn passes_cuts(&self, image: &StereoImage) -> bool {
        let m = &image.moments;
        m.has_image()
            && m.length > 0.0
            && m.size >= self.config.min_size
            && m.ntubes >= self.config.min_ntubes
            && m.loss <= self.config.max_loss
    }

    /// Stereo stage on already parameterized images.
    #[must_use]
    pub fn reconstruct_images(
        &self,
        event_id: u64,
        pointing: &Pointing,
        images: &[StereoImage],
        seed: Option<Point2>,
    ) -> EventReconstruction {
        let selected: Vec<StereoImage> = images
            .iter()
            .filter(|img| self.passes_cuts(img))
            .copied()
            .collect();
        log::debug!(
            "event {event_id}: {} of {} images pass selection",
            selected.len(),
            images.len()
        );

        let geometric =
            GeometricSolver::with_config(self.config.geometric.clone()).solve(&selected, pointing);
        let frame = ShowerFrame::from_pointing(pointing.zenith, pointing.azimuth);

        let mut used: Vec<(&StereoImage, DispEstimate)> = Vec::with_capacity(selected.len());
        for img in &selected {
            let input = DispInput::from_image(&img.moments, &img.timing, img.pedvar);
            let context =
                TelescopeContext::new(img.telescope_type, pointing.zenith, pointing.azimuth);
            let aux = DispAux {
                impact_distance: geometric
                    .has_core()
                    .then(|| impact_distance(&frame, &img.position, geometric.core)),
                emission_height: None,
            };
            match checked_estimate(self.disp.as_ref(), &input, &context, &aux) {
                Ok(estimate) => used.push((img, estimate)),
                Err(e) => log::warn!(
                    "event {event_id}: telescope {} excluded by disp backend '{}': {e}",
                    img.telescope_id,
                    self.disp.name()
                ),
            }
        }

        let disp_images: Vec<DispImage> = used
            .iter()
            .map(|(img, est)| DispImage::new(&img.moments, est))
            .collect();
        let direction =
            DispCombiner::with_config(self.config.combiner.clone()).combine(&disp_images, seed);

        let energy_inputs: Vec<EnergyInput> = used
            .iter()
            .filter_map(|(img, est)| {
                est.energy.map(|energy| EnergyInput {
                    energy,
                    size: img.moments.size,
                    loss: img.moments.loss,
                    fui: img.moments.fui,
                })
            })
            .collect();
        let energy = combine_energy(&energy_inputs, &self.config.energy);

        let core = if direction.is_valid() {
            let core_images: Vec<CoreImage> = used
                .iter()
                .filter_map(|(img, est)| {
                    est.core_distance.map(|core_distance| CoreImage {
                        position: img.position,
                        centroid: Point2::new(img.moments.cen_x, img.moments.cen_y),
                        core_distance,
                        weight: img.moments.size * img.moments.elongation(),
                    })
                })
                .collect();
            disp_core(&frame, direction.direction, &core_images)
        } else {
            CoreEstimate::invalid()
        };

        EventReconstruction::assemble(
            event_id,
            used.iter().map(|(img, _)| img.telescope_id).collect(),
            &direction,
            &core,
            &energy,
            max_axis_angle(&disp_images),
            &geometric,
        )
    }
}
