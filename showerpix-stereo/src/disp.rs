//! Pluggable disp estimation.
//!
//! A disp backend turns one image's shape parameters into the angular
//! distance between the image centroid and the source along the major axis.
//! The reconstruction only talks to the [`DispEstimator`] trait; concrete
//! backends (lookup tables, neural networks, regression trees) are chosen
//! once at setup and shared as `Arc<dyn DispEstimator>`.
#![allow(clippy::missing_errors_doc)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use showerpix_core::{ImageMoments, TelescopeContext, TelescopeType, TimingFit};

/// Backend results at or below this value are failures.
pub const DISP_FAILURE_THRESHOLD: f64 = -98.0;

/// Errors reported by disp backends.
#[derive(Error, Debug)]
pub enum DispError {
    /// The backend has no model for this telescope type.
    #[error("no disp model for telescope type {0:?}")]
    NoModel(TelescopeType),

    /// Input outside the range covered by the model.
    #[error("{quantity} = {value} outside model range [{min}, {max}]")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The model has no entry for this input.
    #[error("empty model bin ({0}, {1})")]
    EmptyBin(usize, usize),

    /// The backend produced a non-finite or failure-flagged value.
    #[error("backend returned unusable disp {0}")]
    InvalidValue(f64),

    /// Malformed model description.
    #[error("invalid disp model: {0}")]
    InvalidModel(String),

    /// Model file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Model file parse error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Free-form failure from an external backend.
    #[error("{0}")]
    Backend(String),
}

/// Shape observables of one image handed to a disp backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DispInput {
    pub width: f64,
    pub length: f64,
    pub asymmetry: f64,
    pub distance: f64,
    pub size: f64,
    /// Pedestal variance of the image pixels.
    pub pedvar: f64,
    /// Timing gradient along the major axis.
    pub tgrad: f64,
    pub loss: f64,
    pub cen_x: f64,
    pub cen_y: f64,
}

impl DispInput {
    /// Collects the backend inputs from the single-image results.
    #[must_use]
    pub fn from_image(moments: &ImageMoments, timing: &TimingFit, pedvar: f64) -> Self {
        Self {
            width: moments.width,
            length: moments.length,
            asymmetry: moments.asymmetry,
            distance: moments.distance,
            size: moments.size,
            pedvar,
            tgrad: timing.gradient,
            loss: moments.loss,
            cen_x: moments.cen_x,
            cen_y: moments.cen_y,
        }
    }

    /// Width over length, zero for degenerate images.
    #[must_use]
    pub fn width_over_length(&self) -> f64 {
        if self.length > 0.0 {
            self.width / self.length
        } else {
            0.0
        }
    }
}

/// Optional auxiliary inputs some backends use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DispAux {
    /// Telescope distance from the shower core (metres).
    pub impact_distance: Option<f64>,
    /// Height of the shower maximum (metres).
    pub emission_height: Option<f64>,
}

/// Output of a disp backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DispEstimate {
    /// Disp magnitude (degrees).
    pub disp: f64,
    /// Energy estimate of this telescope (TeV).
    pub energy: Option<f64>,
    /// Distance of the telescope from the shower core (metres).
    pub core_distance: Option<f64>,
    /// One-sigma uncertainty of `disp` (degrees).
    pub uncertainty: Option<f64>,
}

impl DispEstimate {
    #[must_use]
    pub fn new(disp: f64) -> Self {
        Self {
            disp,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    #[must_use]
    pub fn with_core_distance(mut self, distance: f64) -> Self {
        self.core_distance = Some(distance);
        self
    }

    #[must_use]
    pub fn with_uncertainty(mut self, sigma: f64) -> Self {
        self.uncertainty = Some(sigma);
        self
    }
}

/// A disp backend.
///
/// Implementations are shared across worker threads and must tolerate
/// concurrent `estimate` calls.
pub trait DispEstimator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Estimates disp for one image.
    fn estimate(
        &self,
        input: &DispInput,
        telescope: &TelescopeContext,
        aux: &DispAux,
    ) -> Result<DispEstimate, DispError>;
}

/// Runs a backend and folds its failure conventions into `Err`: a
/// non-finite disp or one at or below [`DISP_FAILURE_THRESHOLD`] is
/// rejected.
pub fn checked_estimate(
    estimator: &dyn DispEstimator,
    input: &DispInput,
    telescope: &TelescopeContext,
    aux: &DispAux,
) -> Result<DispEstimate, DispError> {
    let estimate = estimator.estimate(input, telescope, aux)?;
    if !estimate.disp.is_finite() || estimate.disp <= DISP_FAILURE_THRESHOLD {
        return Err(DispError::InvalidValue(estimate.disp));
    }
    Ok(estimate)
}

/// Adapter turning a closure into a [`DispEstimator`].
///
/// This is the plug-in point for backends living outside this crate.
pub struct FnDisp<F> {
    name: String,
    func: F,
}

impl<F> FnDisp<F>
where
    F: Fn(&DispInput, &TelescopeContext, &DispAux) -> Result<DispEstimate, DispError>
        + Send
        + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> DispEstimator for FnDisp<F>
where
    F: Fn(&DispInput, &TelescopeContext, &DispAux) -> Result<DispEstimate, DispError>
        + Send
        + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn estimate(
        &self,
        input: &DispInput,
        telescope: &TelescopeContext,
        aux: &DispAux,
    ) -> Result<DispEstimate, DispError> {
        (self.func)(input, telescope, aux)
    }
}

impl<F> fmt::Debug for FnDisp<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDisp").field("name", &self.name).finish_non_exhaustive()
    }
}
