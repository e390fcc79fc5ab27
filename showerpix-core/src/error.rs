//! Error types for showerpix-core.

use thiserror::Error;

/// Result type alias for showerpix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for showerpix operations.
///
/// These cover malformed *inputs* (a camera description that does not hang
/// together, a pixel sample that does not match its camera). Events that
/// simply cannot be reconstructed are never errors; they are reported
/// through sentinel values in the result records.
#[derive(Error, Debug)]
pub enum Error {
    /// Camera description has columns of different lengths.
    #[error("camera geometry mismatch: {field} has {got} entries, expected {expected}")]
    GeometryMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    /// Neighbour list refers to a pixel that does not exist.
    #[error("pixel {pixel} lists neighbour {neighbour}, camera has {n_pixels} pixels")]
    InvalidNeighbour {
        pixel: usize,
        neighbour: usize,
        n_pixels: usize,
    },

    /// Pixel sample length differs from the camera pixel count.
    #[error("pixel sample has {got} pixels, camera has {expected}")]
    SampleMismatch { expected: usize, got: usize },

    /// Camera with no pixels.
    #[error("camera geometry is empty")]
    EmptyCamera,

    /// Configuration value outside its usable range.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
