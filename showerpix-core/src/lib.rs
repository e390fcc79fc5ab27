//! showerpix-core: Core types for Cherenkov telescope image reconstruction.
//!
//! This crate provides the shared camera geometry, the per-event pixel
//! sample, the per-image parameter records and the plane/space geometry
//! used by the stereo solvers.
//!

pub mod camera;
pub mod error;
pub mod geometry;
pub mod params;
pub mod sample;
pub mod telescope;

pub use camera::CameraGeometry;
pub use error::{Error, Result};
pub use geometry::{
    direction_cosines, intersect_lines, perpendicular_distance, rotate_to_shower_plane,
    weighted_perpendicular_fit, zenith_azimuth, Line2, LineIntersection, PerpendicularFit, Point2,
    ShowerFrame,
};
pub use params::{ImageMoments, MuonRing, TimingFit, TIMING_SENTINEL};
pub use sample::{PixelSample, TIME_SENTINEL};
pub use telescope::{TelescopeContext, TelescopePosition, TelescopeType};
