//! showerpix-image: Single-image parameterization.
//!
//! This crate reduces one cleaned camera image to its shape parameters:
//! - **Moments** - centroid, length/width, orientation and derived Hillas quantities
//! - **Timing** - arrival-time gradient along the major axis
//! - **Muon** - iterative ring fit with azimuthal-coverage validation
//!

mod moments;
mod muon;
mod processing;
mod timing;

pub use moments::{MomentCalculator, MomentConfig};
pub use muon::{MuonConfig, MuonRingFitter};
pub use processing::{parameterize_batch, parameterize_image, ImageConfig, ImageParameters};
pub use timing::{TimingConfig, TimingFitter};
