//! Per-telescope image parameter records.
//!
//! These are plain value types produced once per telescope and event and
//! discarded at the event boundary.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value written into every field of an invalid [`TimingFit`].
pub const TIMING_SENTINEL: f64 = -999.0;

/// Second/third moment ("Hillas") parameters of one camera image.
///
/// Angles are in degrees, lengths in camera units. The default value is the
/// documented "no image" state: every field zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageMoments {
    /// Charge-weighted centroid x.
    pub cen_x: f64,
    /// Charge-weighted centroid y.
    pub cen_y: f64,
    /// RMS along the major axis.
    pub length: f64,
    /// RMS along the minor axis.
    pub width: f64,
    /// Major-axis direction cosine.
    pub cosphi: f64,
    /// Major-axis direction sine.
    pub sinphi: f64,
    /// Major-axis angle, `atan2(sinphi, cosphi)` in degrees.
    pub phi: f64,
    /// Summed charge of image and border pixels.
    pub size: f64,
    /// Largest single-pixel charge in the image.
    pub max_charge: f64,
    /// Third moment along the major axis, normalised by length.
    pub asymmetry: f64,
    /// Fraction of size in camera-edge pixels.
    pub loss: f64,
    /// Fraction of size in edge pixels or pixels next to dead pixels.
    pub loss_and_dead: f64,
    /// Distance of the centroid from the camera centre.
    pub distance: f64,
    /// Perpendicular distance of the major axis from the camera centre.
    pub miss: f64,
    /// Angle between major axis and centroid direction.
    pub alpha: f64,
    /// RMS perpendicular to the centroid direction.
    pub azwidth: f64,
    /// Fraction of pixels under the scaled ellipse that are image pixels.
    pub fui: f64,
    /// Number of image plus border pixels.
    pub ntubes: usize,
}

impl ImageMoments {
    /// True when the record describes an actual image.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.ntubes > 0 && self.size > 0.0
    }

    /// Elongation weight `1 - width / length` used by the stereo solvers;
    /// zero for degenerate images.
    #[must_use]
    pub fn elongation(&self) -> f64 {
        if self.length > 0.0 {
            (1.0 - self.width / self.length).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Linear fit of pulse arrival time against position along the major axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimingFit {
    /// Time at the centroid.
    pub intercept: f64,
    pub intercept_error: f64,
    /// Time gradient per camera unit along the major axis.
    pub gradient: f64,
    pub gradient_error: f64,
    pub chi2: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub t_mean: f64,
    /// Points that survived outlier rejection.
    pub n_points: usize,
}

impl TimingFit {
    /// Sentinel record for images without enough timing points.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            intercept: TIMING_SENTINEL,
            intercept_error: TIMING_SENTINEL,
            gradient: TIMING_SENTINEL,
            gradient_error: TIMING_SENTINEL,
            chi2: TIMING_SENTINEL,
            t_min: TIMING_SENTINEL,
            t_max: TIMING_SENTINEL,
            t_mean: TIMING_SENTINEL,
            n_points: 0,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.n_points > 0
    }
}

impl Default for TimingFit {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Circle fitted to a muon-ring image.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MuonRing {
    pub x0: f64,
    pub y0: f64,
    pub radius: f64,
    /// Charge-weighted RMS of pixel radii about `radius`.
    pub radius_sigma: f64,
    /// Ring passed the band-fraction and azimuthal-coverage checks.
    pub valid: bool,
    /// Charge of pixels inside the radius band.
    pub size: f64,
    /// Estimated impact parameter over mirror radius.
    pub impact_fraction: f64,
    /// `size` corrected for the light yield at `impact_fraction`.
    pub corrected_size: f64,
    /// Pixels inside the radius band.
    pub n_band_pixels: usize,
}
