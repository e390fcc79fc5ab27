//! Telescope identity, ground position and pointing.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque telescope type key. The core only uses it to look up the disp
/// backend's per-type model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TelescopeType(pub u64);

/// Telescope position on the ground (x east, y north, z up; metres).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TelescopePosition {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// What a disp backend knows about the telescope that took an image.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeContext {
    pub telescope_type: TelescopeType,
    /// Pointing zenith angle (degrees).
    pub zenith: f64,
    /// Pointing azimuth (degrees, north through east).
    pub azimuth: f64,
}

impl TelescopeContext {
    #[must_use]
    pub fn new(telescope_type: TelescopeType, zenith: f64, azimuth: f64) -> Self {
        Self {
            telescope_type,
            zenith,
            azimuth,
        }
    }

    /// Context from elevation rather than zenith angle.
    #[must_use]
    pub fn from_elevation(telescope_type: TelescopeType, elevation: f64, azimuth: f64) -> Self {
        Self::new(telescope_type, 90.0 - elevation, azimuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_elevation() {
        let ctx = TelescopeContext::from_elevation(TelescopeType(2), 70.0, 180.0);
        assert!((ctx.zenith - 20.0).abs() < 1e-12);
        assert_eq!(ctx.telescope_type, TelescopeType(2));
    }
}
