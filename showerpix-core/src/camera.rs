//! Camera geometry: pixel positions and neighbour lists.
//!
//! The geometry is built once at setup and shared read-only (usually behind
//! an `Arc`) by every event that is processed with this camera.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]

use crate::error::{Error, Result};

/// Static description of one camera type.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraGeometry {
    x: Vec<f64>,
    y: Vec<f64>,
    neighbours: Vec<Vec<usize>>,
    edge: Vec<bool>,
}

impl CameraGeometry {
    /// Creates a camera from pixel positions and explicit neighbour lists.
    ///
    /// Edge pixels (those contributing to `loss`) are the pixels with fewer
    /// neighbours than the best-connected pixel of the camera.
    pub fn new(x: Vec<f64>, y: Vec<f64>, neighbours: Vec<Vec<usize>>) -> Result<Self> {
        let n = x.len();
        if n == 0 {
            return Err(Error::EmptyCamera);
        }
        if y.len() != n {
            return Err(Error::GeometryMismatch {
                field: "y",
                expected: n,
                got: y.len(),
            });
        }
        if neighbours.len() != n {
            return Err(Error::GeometryMismatch {
                field: "neighbours",
                expected: n,
                got: neighbours.len(),
            });
        }
        for (pixel, list) in neighbours.iter().enumerate() {
            if let Some(&neighbour) = list.iter().find(|&&j| j >= n) {
                return Err(Error::InvalidNeighbour {
                    pixel,
                    neighbour,
                    n_pixels: n,
                });
            }
        }

        let max_neighbours = neighbours.iter().map(Vec::len).max().unwrap_or(0);
        let edge = neighbours
            .iter()
            .map(|list| list.len() < max_neighbours)
            .collect();

        Ok(Self {
            x,
            y,
            neighbours,
            edge,
        })
    }

    /// Creates a camera from pixel positions, linking every pair of pixels
    /// closer than `neighbour_radius`.
    pub fn from_positions(x: Vec<f64>, y: Vec<f64>, neighbour_radius: f64) -> Result<Self> {
        if y.len() != x.len() {
            return Err(Error::GeometryMismatch {
                field: "y",
                expected: x.len(),
                got: y.len(),
            });
        }
        let r2 = neighbour_radius * neighbour_radius;
        let neighbours = (0..x.len())
            .map(|i| {
                (0..x.len())
                    .filter(|&j| {
                        let dx = x[i] - x[j];
                        let dy = y[i] - y[j];
                        j != i && dx * dx + dy * dy <= r2
                    })
                    .collect()
            })
            .collect();
        Self::new(x, y, neighbours)
    }

    /// Hexagonal camera with `rings` rings of pixels around a central pixel.
    ///
    /// `spacing` is the centre-to-centre distance (degrees on the sky for a
    /// real camera). Ring `r` holds `6 * r` pixels.
    pub fn hexagonal(rings: usize, spacing: f64) -> Result<Self> {
        let r = rings as i64;
        let mut x = Vec::new();
        let mut y = Vec::new();
        for q in -r..=r {
            for s in (-r).max(-q - r)..=r.min(-q + r) {
                let (q, s) = (q as f64, s as f64);
                x.push(spacing * (q + 0.5 * s));
                y.push(spacing * (0.75_f64.sqrt() * s));
            }
        }
        Self::from_positions(x, y, 1.05 * spacing)
    }

    /// Override the edge-pixel flags derived from the neighbour count.
    pub fn with_edge_pixels(mut self, edge: Vec<bool>) -> Result<Self> {
        if edge.len() != self.len() {
            return Err(Error::GeometryMismatch {
                field: "edge",
                expected: self.len(),
                got: edge.len(),
            });
        }
        self.edge = edge;
        Ok(self)
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Always false for a successfully constructed camera.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Pixel x positions.
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Pixel y positions.
    #[must_use]
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Position of one pixel.
    #[inline]
    #[must_use]
    pub fn position(&self, pixel: usize) -> (f64, f64) {
        (self.x[pixel], self.y[pixel])
    }

    /// Neighbour list of one pixel.
    #[inline]
    #[must_use]
    pub fn neighbours(&self, pixel: usize) -> &[usize] {
        &self.neighbours[pixel]
    }

    /// Whether the pixel sits on the camera edge.
    #[inline]
    #[must_use]
    pub fn is_edge(&self, pixel: usize) -> bool {
        self.edge[pixel]
    }

    /// Whether any neighbour of `pixel` is flagged dead.
    #[must_use]
    pub fn touches_dead(&self, pixel: usize, dead: &[bool]) -> bool {
        self.neighbours[pixel].iter().any(|&j| dead[j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexagonal_pixel_count() {
        let cam = CameraGeometry::hexagonal(3, 0.15).unwrap();
        // 1 + 6 + 12 + 18
        assert_eq!(cam.len(), 37);
        // central pixel is fully connected
        assert_eq!(cam.neighbours(18).len(), 6);
        assert!(!cam.is_edge(18));
    }

    #[test]
    fn test_outer_ring_is_edge() {
        let cam = CameraGeometry::hexagonal(2, 1.0).unwrap();
        let n_edge = (0..cam.len()).filter(|&i| cam.is_edge(i)).count();
        assert_eq!(n_edge, 12);
    }

    #[test]
    fn test_invalid_neighbour_rejected() {
        let result = CameraGeometry::new(vec![0.0, 1.0], vec![0.0, 0.0], vec![vec![1], vec![5]]);
        assert!(matches!(
            result,
            Err(Error::InvalidNeighbour { neighbour: 5, .. })
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = CameraGeometry::new(vec![0.0, 1.0], vec![0.0], vec![vec![], vec![]]);
        assert!(matches!(result, Err(Error::GeometryMismatch { .. })));
        assert!(matches!(
            CameraGeometry::new(vec![], vec![], vec![]),
            Err(Error::EmptyCamera)
        ));
    }

    #[test]
    fn test_touches_dead() {
        let cam = CameraGeometry::hexagonal(1, 1.0).unwrap();
        let mut dead = vec![false; cam.len()];
        dead[3] = true;
        // pixel 3 is the centre of a one-ring camera and touches everything
        assert!(cam.touches_dead(0, &dead));
        assert!(!cam.touches_dead(3, &dead));
    }
}
