//! High-level helpers that run the full single-image chain.

use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use showerpix_core::error::Result;
use showerpix_core::{CameraGeometry, ImageMoments, MuonRing, PixelSample, TimingFit};

use crate::{MomentCalculator, MomentConfig, MuonConfig, MuonRingFitter, TimingConfig, TimingFitter};

/// Configuration of the whole single-image chain.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImageConfig {
    pub moments: MomentConfig,
    pub timing: TimingConfig,
    pub muon: MuonConfig,
    /// Run the muon-ring fit on every image.
    pub fit_muon: bool,
}

impl ImageConfig {
    #[must_use]
    pub fn with_moments(mut self, moments: MomentConfig) -> Self {
        self.moments = moments;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Enable the muon-ring fit with the given configuration.
    #[must_use]
    pub fn with_muon(mut self, muon: MuonConfig) -> Self {
        self.muon = muon;
        self.fit_muon = true;
        self
    }
}

/// Everything derived from one camera image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageParameters {
    pub moments: ImageMoments,
    pub timing: TimingFit,
    pub muon: Option<MuonRing>,
}

/// Computes moments, timing gradient and (optionally) the muon ring.
///
/// The sample is validated against the camera once here; the algorithms
/// below index the columns directly.
pub fn parameterize_image(
    camera: &CameraGeometry,
    sample: &PixelSample,
    config: &ImageConfig,
) -> Result<ImageParameters> {
    sample.validate(camera)?;

    let moments = MomentCalculator::with_config(config.moments.clone()).calculate(camera, sample);
    let timing = TimingFitter::with_config(config.timing.clone()).fit(camera, sample, &moments);
    let muon = config
        .fit_muon
        .then(|| MuonRingFitter::with_config(config.muon.clone()).fit(camera, sample));

    log::trace!(
        "image: size={:.1} ntubes={} length={:.4} width={:.4}",
        moments.size,
        moments.ntubes,
        moments.length,
        moments.width
    );

    Ok(ImageParameters {
        moments,
        timing,
        muon,
    })
}

/// Parameterizes many images of the same camera in parallel.
///
/// Output order matches input order. The first invalid sample aborts the
/// batch.
pub fn parameterize_batch(
    camera: &CameraGeometry,
    samples: &[PixelSample],
    config: &ImageConfig,
) -> Result<Vec<ImageParameters>> {
    samples
        .par_iter()
        .map(|sample| parameterize_image(camera, sample, config))
        .collect()
}
