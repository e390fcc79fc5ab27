//! Per-event pixel data in Structure of Arrays (`SoA`) layout.
//!
//! `PixelSample` stores charge, arrival time and the cleaning flags of every
//! camera pixel in parallel vectors indexed by pixel id. Positions are not
//! stored here; they live in the shared [`CameraGeometry`](crate::CameraGeometry).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::camera::CameraGeometry;
use crate::error::{Error, Result};

/// Arrival time written for pixels without a usable pulse.
pub const TIME_SENTINEL: f64 = -999.0;

/// One telescope's pixel data for one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PixelSample {
    /// Integrated charge per pixel.
    pub charge: Vec<f64>,
    /// Pulse arrival time per pixel (`TIME_SENTINEL` when missing).
    pub time: Vec<f64>,
    /// Pixel selected as image core by the cleaning step.
    pub image: Vec<bool>,
    /// Pixel selected as image border by the cleaning step.
    pub border: Vec<bool>,
    /// Pixel unusable in this event.
    pub dead: Vec<bool>,
    /// Charge read out in the low-gain channel.
    pub low_gain: Vec<bool>,
}

impl PixelSample {
    /// Creates an all-empty sample for `n_pixels` pixels.
    #[must_use]
    pub fn new(n_pixels: usize) -> Self {
        Self {
            charge: vec![0.0; n_pixels],
            time: vec![TIME_SENTINEL; n_pixels],
            image: vec![false; n_pixels],
            border: vec![false; n_pixels],
            dead: vec![false; n_pixels],
            low_gain: vec![false; n_pixels],
        }
    }

    /// Returns the number of pixels in the sample.
    #[must_use]
    pub fn len(&self) -> usize {
        self.charge.len()
    }

    /// Returns true if the sample holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charge.is_empty()
    }

    /// Resets all columns for the next event, keeping the allocation.
    pub fn clear(&mut self) {
        self.charge.iter_mut().for_each(|q| *q = 0.0);
        self.time.iter_mut().for_each(|t| *t = TIME_SENTINEL);
        self.image.iter_mut().for_each(|f| *f = false);
        self.border.iter_mut().for_each(|f| *f = false);
        self.dead.iter_mut().for_each(|f| *f = false);
        self.low_gain.iter_mut().for_each(|f| *f = false);
    }

    /// Fills one pixel.
    pub fn set(&mut self, pixel: usize, charge: f64, time: f64, image: bool, border: bool) {
        self.charge[pixel] = charge;
        self.time[pixel] = time;
        self.image[pixel] = image;
        self.border[pixel] = border;
    }

    /// Whether the pixel belongs to the cleaned image (core or border).
    #[inline]
    #[must_use]
    pub fn in_image(&self, pixel: usize) -> bool {
        self.image[pixel] || self.border[pixel]
    }

    /// Number of image plus border pixels.
    #[must_use]
    pub fn n_image_pixels(&self) -> usize {
        (0..self.len()).filter(|&i| self.in_image(i)).count()
    }

    /// Checks that every column matches the camera pixel count.
    ///
    /// Called once at the interface boundary; the algorithms index the
    /// columns without further checks.
    pub fn validate(&self, camera: &CameraGeometry) -> Result<()> {
        let expected = camera.len();
        for got in [
            self.charge.len(),
            self.time.len(),
            self.image.len(),
            self.border.len(),
            self.dead.len(),
            self.low_gain.len(),
        ] {
            if got != expected {
                return Err(Error::SampleMismatch { expected, got });
            }
        }
        Ok(())
    }

    /// Fills columns left empty (typically omitted in a data file) to the
    /// length of `charge` with their defaults.
    pub fn fill_missing_columns(&mut self) {
        let n = self.charge.len();
        if self.time.is_empty() {
            self.time = vec![TIME_SENTINEL; n];
        }
        for column in [
            &mut self.image,
            &mut self.border,
            &mut self.dead,
            &mut self.low_gain,
        ] {
            if column.is_empty() {
                *column = vec![false; n];
            }
        }
    }
}
