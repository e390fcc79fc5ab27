//! showerpix-stereo: Multi-telescope reconstruction.
//!
//! This crate combines parameterized images of several telescopes:
//! - **Disp** - pluggable estimator of the centroid-to-source distance
//! - **Combiner** - disp ambiguity resolution, mean direction and disp core
//! - **Energy** - median of per-telescope energies with MAD trimming
//! - **Geometric** - axis-intersection direction and perpendicular-fit core
//! - **Event** - per-event orchestration and parallel batch processing
//!

pub mod combiner;
pub mod disp;
mod disp_table;
pub mod energy;
pub mod event;
pub mod geometric;
pub mod plane;

use showerpix_core::Point2;

pub use combiner::{
    disp_core, to_sky_convention, CombinerConfig, CoreEstimate, CoreImage, DirectionEstimate,
    DispCombiner, DispImage, MAX_EXHAUSTIVE_IMAGES,
};
pub use disp::{
    checked_estimate, DispAux, DispError, DispEstimate, DispEstimator, DispInput, FnDisp,
    DISP_FAILURE_THRESHOLD,
};
pub use disp_table::{Axis, DispGrid, DispTable};
pub use energy::{combine_energy, EnergyConfig, EnergyEstimate, EnergyInput, EnergyQuality};
pub use event::{
    ArrayEvent, EventReconstruction, EventReconstructor, Pointing, ReconstructionConfig,
    StereoImage, TelescopeEvent,
};
pub use geometric::{GeometricConfig, GeometricSolution, GeometricSolver};

/// Direction coordinates of an event without a direction solution.
pub const DIRECTION_SENTINEL: f64 = -9999.0;

/// Core coordinates of an event without a core solution.
pub const CORE_SENTINEL: f64 = -99999.0;

/// Energy of an event without an energy estimate.
pub const ENERGY_SENTINEL: f64 = -99.0;

/// True when both coordinates hold [`DIRECTION_SENTINEL`].
#[must_use]
pub fn is_direction_sentinel(point: Point2) -> bool {
    (point.x - DIRECTION_SENTINEL).abs() < f64::EPSILON
        && (point.y - DIRECTION_SENTINEL).abs() < f64::EPSILON
}

/// True when both coordinates hold [`CORE_SENTINEL`].
#[must_use]
pub fn is_core_sentinel(point: Point2) -> bool {
    (point.x - CORE_SENTINEL).abs() < f64::EPSILON && (point.y - CORE_SENTINEL).abs() < f64::EPSILON
}
